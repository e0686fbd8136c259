use crate::{channel_label, AcquisitionParameters, DataChunk, Result, StreamError};
use hdf5::types::VarLenUnicode;
use hdf5::{File, Group};
use ndarray::ArrayView1;
use serde::Deserialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const TEXT_DELIMITER: char = ';';

/// On-disk format of the output files.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    #[serde(rename = "csv")]
    Text,
    #[serde(rename = "hdf5")]
    Hdf5,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => ".csv",
            Self::Hdf5 => ".hdf5",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.') {
            "csv" => Some(Self::Text),
            "hdf5" | "h5" => Some(Self::Hdf5),
            _ => None,
        }
    }

    /// Create the file at `path` and write its metadata header.
    pub fn init_file(&self, path: &Path, header: &FileHeader) -> Result<Box<dyn OutputSink>> {
        Ok(match self {
            Self::Text => Box::new(TextSink::init_file(path, header)?),
            Self::Hdf5 => Box::new(Hdf5Sink::init_file(path, header)?),
        })
    }
}

/// Metadata written at the top of every output file.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub created_at: OffsetDateTime,
    pub params: AcquisitionParameters,
    /// Enabled channels as `(index, name)`, ascending by index.
    pub channels: Vec<(usize, String)>,
}

impl FileHeader {
    fn date(&self) -> Result<String> {
        format_date(self.created_at)
    }

    fn indices(&self) -> Vec<usize> {
        self.channels.iter().map(|(i, _)| *i).collect()
    }
}

fn format_date(at: OffsetDateTime) -> Result<String> {
    at.format(&Rfc3339)
        .map_err(|e| StreamError::InvalidParameter(format!("unformattable date: {e}")))
}

/// Durable storage for one file's worth of chunks.
pub trait OutputSink: Send {
    fn path(&self) -> &Path;

    /// Append the enabled channels of `chunk`.
    fn write_chunk(&mut self, chunk: &DataChunk) -> Result<()>;

    /// Flush and close. No writes are accepted afterwards; sealing twice is a no-op.
    fn seal(&mut self) -> Result<()>;

    fn is_sealed(&self) -> bool;
}

fn select_rows<'a>(chunk: &'a DataChunk, channels: &[usize]) -> Result<Vec<ArrayView1<'a, f64>>> {
    channels
        .iter()
        .map(|&c| {
            chunk.channel(c).ok_or_else(|| {
                StreamError::Device(format!(
                    "chunk {} carries no data for channel {}",
                    chunk.sequence_number,
                    c + 1
                ))
            })
        })
        .collect()
}

fn sealed_error(path: &Path) -> StreamError {
    StreamError::file_io(path, "file is sealed")
}

/// Semicolon-delimited text. Chunk boundaries are not marked: the rows of
/// consecutive chunks simply follow each other.
pub struct TextSink {
    path: PathBuf,
    channels: Vec<usize>,
    out: Option<BufWriter<fs::File>>,
}

impl TextSink {
    pub fn init_file(path: &Path, header: &FileHeader) -> Result<Self> {
        let io_err = |e: std::io::Error| StreamError::file_io(path, e);
        let mut out = BufWriter::new(fs::File::create(path).map_err(io_err)?);

        writeln!(out, "Date:{}", header.date()?).map_err(io_err)?;
        writeln!(out, "Sampling freq:{:?}", header.params.sample_rate).map_err(io_err)?;
        writeln!(out, "Resolution:{}", header.params.resolution_bits).map_err(io_err)?;
        writeln!(out, "Record length:{}", header.params.record_length).map_err(io_err)?;
        writeln!(out).map_err(io_err)?;
        for (_, name) in &header.channels {
            write!(out, "{TEXT_DELIMITER}{name}").map_err(io_err)?;
        }
        writeln!(out).map_err(io_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            channels: header.indices(),
            out: Some(out),
        })
    }
}

impl OutputSink for TextSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_chunk(&mut self, chunk: &DataChunk) -> Result<()> {
        let rows = select_rows(chunk, &self.channels)?;
        let path = &self.path;
        let out = self.out.as_mut().ok_or_else(|| sealed_error(path))?;
        let io_err = |e: std::io::Error| StreamError::file_io(path, e);

        for i in 0..chunk.n_samples() {
            for row in &rows {
                // Debug formatting is the shortest round-trip form and always
                // keeps a decimal point, e.g. `1.0`.
                write!(out, "{TEXT_DELIMITER}{:?}", row[i]).map_err(io_err)?;
            }
            writeln!(out).map_err(io_err)?;
        }
        Ok(())
    }

    fn seal(&mut self) -> Result<()> {
        if let Some(out) = self.out.take() {
            let file = out
                .into_inner()
                .map_err(|e| StreamError::file_io(&self.path, e.error()))?;
            file.sync_all()
                .map_err(|e| StreamError::file_io(&self.path, e))?;
        }
        Ok(())
    }

    fn is_sealed(&self) -> bool {
        self.out.is_none()
    }
}

/// HDF5 container: an `Info` group with the metadata attributes and one
/// `chunk_NNNNNNNN` group per chunk holding one dataset per channel.
pub struct Hdf5Sink {
    path: PathBuf,
    channels: Vec<usize>,
    file: Option<File>,
}

impl Hdf5Sink {
    pub fn init_file(path: &Path, header: &FileHeader) -> Result<Self> {
        let h5_err = |e: hdf5::Error| StreamError::file_io(path, e);
        let file = File::create(path).map_err(h5_err)?;

        let info = file.create_group("Info").map_err(h5_err)?;
        write_str_attr(&info, "Date", &header.date()?).map_err(h5_err)?;
        info.new_attr::<f64>()
            .create("Sampling_freq")
            .and_then(|attr| attr.write_scalar(&header.params.sample_rate))
            .map_err(h5_err)?;
        info.new_attr::<u8>()
            .create("Resolution")
            .and_then(|attr| attr.write_scalar(&header.params.resolution_bits))
            .map_err(h5_err)?;
        info.new_attr::<u64>()
            .create("Record_length")
            .and_then(|attr| attr.write_scalar(&(header.params.record_length as u64)))
            .map_err(h5_err)?;
        for (index, name) in &header.channels {
            write_str_attr(&info, &channel_label(*index), name).map_err(h5_err)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            channels: header.indices(),
            file: Some(file),
        })
    }
}

fn write_str_attr(group: &Group, name: &str, value: &str) -> hdf5::Result<()> {
    let value = VarLenUnicode::from_str(value).map_err(|e| hdf5::Error::from(e.to_string()))?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)
}

pub fn chunk_group_name(sequence_number: u64) -> String {
    format!("chunk_{:08}", sequence_number)
}

impl OutputSink for Hdf5Sink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_chunk(&mut self, chunk: &DataChunk) -> Result<()> {
        let rows = select_rows(chunk, &self.channels)?;
        let path = &self.path;
        let file = self.file.as_ref().ok_or_else(|| sealed_error(path))?;
        let h5_err = |e: hdf5::Error| StreamError::file_io(path, e);

        let group = file
            .create_group(&chunk_group_name(chunk.sequence_number))
            .map_err(h5_err)?;
        write_str_attr(&group, "Date", &format_date(chunk.captured_at)?).map_err(h5_err)?;
        for (&index, row) in self.channels.iter().zip(rows) {
            let dataset = group
                .new_dataset::<f64>()
                .shape(row.len())
                .create(channel_label(index).as_str())
                .map_err(h5_err)?;
            if !row.is_empty() {
                dataset.write(row).map_err(h5_err)?;
            }
        }
        Ok(())
    }

    fn seal(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.flush()
                .map_err(|e| StreamError::file_io(&self.path, e))?;
        }
        Ok(())
    }

    fn is_sealed(&self) -> bool {
        self.file.is_none()
    }
}
