use crate::{
    AcquisitionParameters, ChannelInfo, Coupling, DataChunk, Device, DeviceKind, PollStatus,
    Result, StreamError, CHANNELS_PER_GROUP,
};
use log::{debug, info};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

pub const SIM_RANGES: &[f64] = &[0.2, 0.4, 0.8, 2.0, 4.0, 8.0, 20.0, 40.0, 80.0];
pub const SIM_RESOLUTIONS: &[u8] = &[8, 12, 14, 16];
const MAX_SAMPLE_RATE: f64 = 1e8;
const MAX_RECORD_LENGTH: usize = 1_000_000;
const FIRST_SERIAL: u32 = 27_000;

/// Software stand-in for a streaming oscilloscope.
///
/// Produces one sine wave plus noise per enabled channel, paced by
/// `record_length / sample_rate` (scaled by `pace`). Can be told to report an
/// overflow after a given number of chunks.
pub struct SimulatedScope {
    units: usize,
    pace: f64,
    overflow_after: Option<u64>,
    rng: StdRng,
    opened: bool,
    streaming: bool,
    params: AcquisitionParameters,
    channels: Vec<ChannelInfo>,
    last_chunk: Instant,
    chunks_read: u64,
    sample_clock: u64,
}

impl SimulatedScope {
    pub fn new(units: usize) -> Self {
        let units = units.clamp(1, 4);
        let channels = (0..units * CHANNELS_PER_GROUP)
            .map(|index| ChannelInfo {
                index,
                enabled: index == 0,
                range: 8.0,
                ranges: SIM_RANGES.to_vec(),
            })
            .collect();
        Self {
            units,
            pace: 1.0,
            overflow_after: None,
            rng: StdRng::seed_from_u64(0x5c0_9e),
            opened: false,
            streaming: false,
            params: AcquisitionParameters::default(),
            channels,
            last_chunk: Instant::now(),
            chunks_read: 0,
            sample_clock: 0,
        }
    }

    /// Multiply the natural chunk period by `pace`; `0.0` makes every poll ready.
    pub fn with_pace(mut self, pace: f64) -> Self {
        self.pace = pace.max(0.0);
        self
    }

    pub fn with_overflow_after(mut self, chunks: Option<u64>) -> Self {
        self.overflow_after = chunks;
        self
    }

    fn chunk_period(&self) -> Duration {
        let secs = self.params.record_length as f64 / self.params.sample_rate * self.pace;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.opened {
            Ok(())
        } else {
            Err(StreamError::Device("simulated scope is not open".to_string()))
        }
    }
}

impl Device for SimulatedScope {
    fn open(&mut self) -> Result<DeviceKind> {
        self.opened = true;
        let serials = (0..self.units as u32).map(|i| FIRST_SERIAL + i).collect::<Vec<_>>();
        info!("Opened simulated scope with {} unit(s)", self.units);
        Ok(if self.units == 1 {
            DeviceKind::Single { serial: serials[0] }
        } else {
            DeviceKind::Combined {
                contained_serials: serials,
            }
        })
    }

    fn can_stream(&self) -> bool {
        true
    }

    fn configure(&mut self, params: &AcquisitionParameters) -> Result<AcquisitionParameters> {
        self.ensure_open()?;
        let resolution_bits = SIM_RESOLUTIONS
            .iter()
            .copied()
            .min_by_key(|r| (i16::from(*r) - i16::from(params.resolution_bits)).abs())
            .unwrap_or(8);
        self.params = AcquisitionParameters {
            sample_rate: params.sample_rate.clamp(1.0, MAX_SAMPLE_RATE).round(),
            resolution_bits,
            record_length: params.record_length.clamp(1, MAX_RECORD_LENGTH),
        };
        debug!("Simulated scope configured: {:?}", self.params);
        Ok(self.params)
    }

    fn set_channel(
        &mut self,
        index: usize,
        enabled: bool,
        range: f64,
        _coupling: Coupling,
    ) -> Result<()> {
        self.ensure_open()?;
        let channel = self
            .channels
            .get_mut(index)
            .ok_or_else(|| StreamError::Device(format!("no channel {index}")))?;
        channel.enabled = enabled;
        // Snap to the closest supported range, like real hardware does.
        channel.range = SIM_RANGES
            .iter()
            .copied()
            .min_by(|a, b| (a - range).abs().total_cmp(&(b - range).abs()))
            .unwrap_or(range);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.streaming = true;
        self.last_chunk = Instant::now();
        self.chunks_read = 0;
        self.sample_clock = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.streaming = false;
        Ok(())
    }

    fn poll_status(&mut self) -> Result<PollStatus> {
        if !self.streaming {
            return Err(StreamError::Device("simulated scope is not streaming".to_string()));
        }
        let overflow = self
            .overflow_after
            .is_some_and(|limit| self.chunks_read >= limit);
        let ready = !overflow && self.last_chunk.elapsed() >= self.chunk_period();
        Ok(PollStatus { ready, overflow })
    }

    fn read_chunk(&mut self, sequence_number: u64) -> Result<DataChunk> {
        if !self.streaming {
            return Err(StreamError::Device("simulated scope is not streaming".to_string()));
        }
        let enabled = self
            .channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| (c.index, c.range))
            .collect::<Vec<_>>();
        let n = self.params.record_length;
        let rate = self.params.sample_rate;
        let start = self.sample_clock;

        let mut samples = Array2::<f64>::zeros((enabled.len(), n));
        for (mut row, &(index, range)) in samples.rows_mut().into_iter().zip(&enabled) {
            let freq = rate / (50.0 * (index + 1) as f64);
            let amplitude = range * 0.5;
            for (i, v) in row.iter_mut().enumerate() {
                let t = (start + i as u64) as f64 / rate;
                let noise = self.rng.random_range(-0.01..0.01);
                *v = amplitude * ((TAU * freq * t).sin() + noise);
            }
        }

        self.sample_clock += n as u64;
        self.chunks_read += 1;
        self.last_chunk = Instant::now();
        DataChunk::new(
            sequence_number,
            OffsetDateTime::now_utc(),
            enabled.into_iter().map(|(i, _)| i).collect(),
            samples,
        )
    }

    fn list_channels(&self) -> Vec<ChannelInfo> {
        self.channels.clone()
    }

    fn list_resolutions(&self) -> Vec<u8> {
        SIM_RESOLUTIONS.to_vec()
    }

    fn close(&mut self) -> Result<()> {
        self.streaming = false;
        self.opened = false;
        Ok(())
    }
}
