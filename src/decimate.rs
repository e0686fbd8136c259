//! Preview decimation.
//!
//! The plotted trace is a plain stride subsample, while the reported range is
//! taken over every input sample, so the range label stays exact even when the
//! trace skips peaks.

use crate::{channel_label, ChannelBank, DataChunk};

pub const DEFAULT_PREVIEW_POINTS: usize = 400;

#[derive(Debug, Clone, PartialEq)]
pub struct Decimated {
    pub min: f64,
    pub max: f64,
    pub points: Vec<f64>,
}

/// Reduce `samples` to at most about `max_points` values.
///
/// Returns `None` for an empty input or a zero point budget.
pub fn decimate(samples: &[f64], max_points: usize) -> Option<Decimated> {
    if samples.is_empty() || max_points == 0 {
        return None;
    }
    let step = (samples.len() / max_points).max(1);
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let points = samples.iter().step_by(step).copied().collect();
    Some(Decimated { min, max, points })
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewTrace {
    pub channel: usize,
    pub name: String,
    pub trace: Decimated,
}

impl PreviewTrace {
    /// Text shown next to the trace, e.g. `Chan_1  range:-0.5 0.5`.
    pub fn range_label(&self) -> String {
        format!(
            "{}  range:{} {}",
            self.name,
            round4(self.trace.min),
            round4(self.trace.max)
        )
    }
}

/// Decimated view of one chunk, one trace per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    pub sequence_number: u64,
    pub traces: Vec<PreviewTrace>,
}

impl PreviewFrame {
    pub fn from_chunk(chunk: &DataChunk, channels: &ChannelBank, max_points: usize) -> Self {
        let traces = chunk
            .channels()
            .iter()
            .zip(chunk.samples().rows())
            .filter_map(|(&index, row)| {
                let samples = row.to_vec();
                let trace = decimate(&samples, max_points)?;
                let name = channels
                    .channel(index)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| channel_label(index));
                Some(PreviewTrace {
                    channel: index,
                    name,
                    trace,
                })
            })
            .collect();
        Self {
            sequence_number: chunk.sequence_number,
            traces,
        }
    }
}

fn round4(v: f64) -> f64 {
    (v * 1e4).round() / 1e4
}
