use crate::{Result, StreamError};
use ndarray::{Array2, ArrayView1};
use time::OffsetDateTime;

/// One poll's worth of samples for the enabled channels.
///
/// The sample matrix has one row per entry in `channels`, in the same
/// (ascending) order. A chunk is never mutated after it leaves the device;
/// consumers that need it concurrently take a clone.
#[derive(Debug, Clone)]
pub struct DataChunk {
    pub sequence_number: u64,
    pub captured_at: OffsetDateTime,
    channels: Vec<usize>,
    samples: Array2<f64>,
}

impl DataChunk {
    pub fn new(
        sequence_number: u64,
        captured_at: OffsetDateTime,
        channels: Vec<usize>,
        samples: Array2<f64>,
    ) -> Result<Self> {
        if samples.nrows() != channels.len() {
            return Err(StreamError::Device(format!(
                "chunk {sequence_number} has {} rows for {} channels",
                samples.nrows(),
                channels.len()
            )));
        }
        if channels.windows(2).any(|w| w[0] >= w[1]) {
            return Err(StreamError::Device(format!(
                "chunk {sequence_number} channel list is not strictly ascending"
            )));
        }
        Ok(Self {
            sequence_number,
            captured_at,
            channels,
            samples,
        })
    }

    /// Build a chunk from per-channel sample vectors, which must all have the same length.
    pub fn from_rows(
        sequence_number: u64,
        captured_at: OffsetDateTime,
        rows: Vec<(usize, Vec<f64>)>,
    ) -> Result<Self> {
        let n_samples = rows.first().map(|(_, r)| r.len()).unwrap_or(0);
        if rows.iter().any(|(_, r)| r.len() != n_samples) {
            return Err(StreamError::Device(format!(
                "chunk {sequence_number} has channels of different lengths"
            )));
        }
        let channels = rows.iter().map(|(c, _)| *c).collect::<Vec<_>>();
        let flat = rows.into_iter().flat_map(|(_, r)| r).collect::<Vec<_>>();
        let samples = Array2::from_shape_vec((channels.len(), n_samples), flat)
            .map_err(|e| StreamError::Device(e.to_string()))?;
        Self::new(sequence_number, captured_at, channels, samples)
    }

    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    pub fn n_samples(&self) -> usize {
        self.samples.ncols()
    }

    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    /// Samples of one channel, if the chunk carries it.
    pub fn channel(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        let row = self.channels.iter().position(|&c| c == index)?;
        Some(self.samples.row(row))
    }

    /// Size of the sample payload in bytes.
    pub fn size_bytes(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rows_map_to_channels() {
        let chunk = DataChunk::from_rows(
            7,
            OffsetDateTime::UNIX_EPOCH,
            vec![(1, vec![1.0, 2.0]), (4, vec![3.0, 4.0])],
        )
        .unwrap();
        assert_eq!(chunk.channels(), &[1, 4]);
        assert_eq!(chunk.n_samples(), 2);
        assert_eq!(chunk.channel(4).unwrap().to_vec(), vec![3.0, 4.0]);
        assert!(chunk.channel(0).is_none());
        assert_eq!(chunk.size_bytes(), 32);
    }

    #[test]
    fn rejects_ragged_rows() {
        let res = DataChunk::from_rows(
            0,
            OffsetDateTime::UNIX_EPOCH,
            vec![(0, vec![1.0]), (1, vec![1.0, 2.0])],
        );
        assert!(matches!(res, Err(StreamError::Device(_))));
    }

    #[test]
    fn rejects_row_count_mismatch_and_unsorted_channels() {
        let samples = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(DataChunk::new(0, OffsetDateTime::UNIX_EPOCH, vec![0], samples.clone()).is_err());
        assert!(DataChunk::new(0, OffsetDateTime::UNIX_EPOCH, vec![3, 1], samples).is_err());
    }
}
