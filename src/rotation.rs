use crate::{
    AcquisitionParameters, ChannelBank, Clock, DataChunk, FileHeader, OutputFormat, OutputSink,
    Result, StreamError,
};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationUnit {
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "min")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "d")]
    Days,
    #[serde(rename = "infty")]
    Never,
}

impl RotationUnit {
    /// Seconds per unit, `None` for `Never`.
    pub fn seconds(&self) -> Option<f64> {
        match self {
            Self::Seconds => Some(1.0),
            Self::Minutes => Some(60.0),
            Self::Hours => Some(3600.0),
            Self::Days => Some(86400.0),
            Self::Never => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Minutes => "min",
            Self::Hours => "h",
            Self::Days => "d",
            Self::Never => "infty",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "s" => Some(Self::Seconds),
            "min" => Some(Self::Minutes),
            "h" => Some(Self::Hours),
            "d" => Some(Self::Days),
            "infty" => Some(Self::Never),
            _ => None,
        }
    }
}

impl fmt::Display for RotationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When to start a new output file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationPolicy {
    pub unit: RotationUnit,
    pub period: f64,
}

impl RotationPolicy {
    pub fn new(unit: RotationUnit, period: f64) -> Result<Self> {
        if !(period.is_finite() && period > 0.0) {
            return Err(StreamError::InvalidParameter(format!(
                "rotation period must be positive, got {period}"
            )));
        }
        Ok(Self { unit, period })
    }

    pub fn never() -> Self {
        Self {
            unit: RotationUnit::Never,
            period: 1.0,
        }
    }

    /// Rotation period, `None` when files never rotate.
    pub fn interval(&self) -> Option<Duration> {
        let secs = self.unit.seconds()? * self.period;
        Duration::try_from_secs_f64(secs).ok()
    }
}

/// What went into one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub chunk_count: u64,
}

impl FileRecord {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            first_sequence: None,
            last_sequence: None,
            chunk_count: 0,
        }
    }
}

/// Owns the file being written and rolls over to a new one on schedule.
pub struct FileRotationManager {
    base: PathBuf,
    format: OutputFormat,
    policy: RotationPolicy,
    params: AcquisitionParameters,
    channels: Vec<(usize, String)>,
    clock: Arc<dyn Clock>,
    counter: u32,
    opened_at: Instant,
    last_sequence: Option<u64>,
    sink: Option<Box<dyn OutputSink>>,
    files: Vec<FileRecord>,
}

impl FileRotationManager {
    /// Create the first file of a session.
    pub fn open_first(
        base: &Path,
        format: OutputFormat,
        policy: RotationPolicy,
        params: AcquisitionParameters,
        channels: &ChannelBank,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let channels = channels
            .enabled()
            .map(|c| (c.index, c.name.clone()))
            .collect::<Vec<_>>();
        if channels.is_empty() {
            return Err(StreamError::InvalidParameter(
                "no channel is enabled".to_string(),
            ));
        }
        let opened_at = clock.now();
        let mut manager = Self {
            base: base.to_path_buf(),
            format,
            policy,
            params,
            channels,
            clock,
            counter: 0,
            opened_at,
            last_sequence: None,
            sink: None,
            files: Vec::new(),
        };
        manager.open_current()?;
        Ok(manager)
    }

    /// File name for the current rotation counter.
    pub fn file_name(&self) -> PathBuf {
        let mut name = self.base.clone().into_os_string();
        if self.policy.unit != RotationUnit::Never {
            name.push(format!("{:06}", self.counter));
        }
        name.push(self.format.extension());
        PathBuf::from(name)
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|s| s.path())
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Append a chunk and return the file it went to.
    ///
    /// The rotation window is checked on both sides of the write, so a file
    /// boundary always falls between two chunks.
    pub fn write(&mut self, chunk: &DataChunk) -> Result<PathBuf> {
        let expected = self.last_sequence.map_or(0, |s| s + 1);
        if self.last_sequence.is_some() && chunk.sequence_number != expected {
            return Err(StreamError::Device(format!(
                "chunk {} out of sequence, expected {expected}",
                chunk.sequence_number
            )));
        }

        self.rotate_if_due()?;

        let sink = self.sink.as_mut().ok_or_else(|| {
            StreamError::file_io(&self.base, "no output file is open")
        })?;
        sink.write_chunk(chunk)?;
        let path = sink.path().to_path_buf();

        self.last_sequence = Some(chunk.sequence_number);
        if let Some(record) = self.files.last_mut() {
            record.first_sequence.get_or_insert(chunk.sequence_number);
            record.last_sequence = Some(chunk.sequence_number);
            record.chunk_count += 1;
        }
        debug!("chunk {} -> {:?}", chunk.sequence_number, path);

        self.rotate_if_due()?;
        Ok(path)
    }

    /// Seal the current file. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.seal()?;
            info!("Sealed {:?}", sink.path());
        }
        Ok(())
    }

    fn rotate_if_due(&mut self) -> Result<bool> {
        let Some(interval) = self.policy.interval() else {
            return Ok(false);
        };
        let elapsed = self.clock.now().saturating_duration_since(self.opened_at);
        if elapsed < interval {
            return Ok(false);
        }
        self.close()?;
        self.counter += 1;
        self.opened_at = self.clock.now();
        self.open_current()?;
        Ok(true)
    }

    fn open_current(&mut self) -> Result<()> {
        let path = self.file_name();
        if path.exists() {
            warn!("Overwriting existing file {:?}", path);
        }
        let header = FileHeader {
            created_at: self.clock.timestamp(),
            params: self.params,
            channels: self.channels.clone(),
        };
        let sink = self.format.init_file(&path, &header)?;
        info!("Make new file: {:?}", path);
        self.files.push(FileRecord::new(path));
        self.sink = Some(sink);
        Ok(())
    }
}

impl Drop for FileRotationManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to seal output file on drop: {e}");
        }
    }
}
