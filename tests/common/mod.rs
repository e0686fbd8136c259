#![allow(dead_code)]

use crossbeam_channel::{Receiver, Sender};
use scope_stream::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;

pub const RANGES: &[f64] = &[1.0, 2.0, 5.0];

/// How often each device entry point was called.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Calls {
    pub open: usize,
    pub configure: usize,
    pub set_channel: usize,
    pub start: usize,
    pub stop: usize,
    pub poll: usize,
    pub read: usize,
    pub close: usize,
}

impl Calls {
    /// Calls that touch the running acquisition.
    pub fn streaming_io(&self) -> usize {
        self.start + self.stop + self.poll + self.read
    }
}

/// Scripted single-unit scope with four channels.
///
/// Chunk `n` becomes ready once `n < available`. Before handing it out the
/// shared clock is moved to `arrivals[n]` when one is scripted. Sample `i` of
/// chunk `n` on channel `c` is `c * 1e6 + n * record_length + i`.
///
/// Failures can be scripted: refused starts, a read error at a given chunk,
/// and a poll that blocks until released.
pub struct FakeScope {
    pub calls: Arc<Mutex<Calls>>,
    clock: Option<ManualClock>,
    arrivals: Vec<Duration>,
    available: u64,
    overflow_after: Option<u64>,
    failed_starts: usize,
    read_error_at: Option<u64>,
    poll_gate: Option<(Sender<()>, Receiver<()>)>,
    params: AcquisitionParameters,
    channels: Vec<ChannelInfo>,
    streaming: bool,
    produced: u64,
}

impl FakeScope {
    pub fn new(available: u64) -> Self {
        Self {
            calls: Arc::default(),
            clock: None,
            arrivals: Vec::new(),
            available,
            overflow_after: None,
            failed_starts: 0,
            read_error_at: None,
            poll_gate: None,
            params: AcquisitionParameters::default(),
            channels: (0..CHANNELS_PER_GROUP)
                .map(|index| ChannelInfo {
                    index,
                    enabled: false,
                    range: RANGES[0],
                    ranges: RANGES.to_vec(),
                })
                .collect(),
            streaming: false,
            produced: 0,
        }
    }

    pub fn with_arrivals(mut self, clock: &ManualClock, arrivals: Vec<Duration>) -> Self {
        self.clock = Some(clock.clone());
        self.arrivals = arrivals;
        self
    }

    pub fn with_overflow_after(mut self, chunks: u64) -> Self {
        self.overflow_after = Some(chunks);
        self
    }

    /// Refuse the first `n` starts.
    pub fn with_failed_starts(mut self, n: usize) -> Self {
        self.failed_starts = n;
        self
    }

    /// Fail the read of chunk `sequence_number`.
    pub fn with_read_error_at(mut self, sequence_number: u64) -> Self {
        self.read_error_at = Some(sequence_number);
        self
    }

    /// Every poll signals `entered`, then blocks until `release` is dropped.
    pub fn with_poll_gate(mut self, entered: Sender<()>, release: Receiver<()>) -> Self {
        self.poll_gate = Some((entered, release));
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Calls>> {
        Arc::clone(&self.calls)
    }

    fn count(&self, f: impl FnOnce(&mut Calls)) {
        f(&mut self.calls.lock().unwrap());
    }
}

impl Device for FakeScope {
    fn open(&mut self) -> Result<DeviceKind> {
        self.count(|c| c.open += 1);
        Ok(DeviceKind::Single { serial: 31_337 })
    }

    fn can_stream(&self) -> bool {
        true
    }

    fn configure(&mut self, params: &AcquisitionParameters) -> Result<AcquisitionParameters> {
        self.count(|c| c.configure += 1);
        // Only whole hertz rates exist on this device.
        self.params = AcquisitionParameters {
            sample_rate: params.sample_rate.round(),
            ..*params
        };
        Ok(self.params)
    }

    fn set_channel(&mut self, index: usize, enabled: bool, range: f64, _: Coupling) -> Result<()> {
        self.count(|c| c.set_channel += 1);
        let ch = self
            .channels
            .get_mut(index)
            .ok_or_else(|| StreamError::Device(format!("no channel {index}")))?;
        ch.enabled = enabled;
        ch.range = range;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.count(|c| c.start += 1);
        if self.failed_starts > 0 {
            self.failed_starts -= 1;
            return Err(StreamError::Device("trigger not ready".to_string()));
        }
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.count(|c| c.stop += 1);
        self.streaming = false;
        Ok(())
    }

    fn poll_status(&mut self) -> Result<PollStatus> {
        self.count(|c| c.poll += 1);
        if let Some((entered, release)) = &self.poll_gate {
            let _ = entered.try_send(());
            let _ = release.recv();
        }
        let overflow = self.overflow_after.is_some_and(|n| self.produced >= n);
        Ok(PollStatus {
            ready: !overflow && self.produced < self.available,
            overflow,
        })
    }

    fn read_chunk(&mut self, sequence_number: u64) -> Result<DataChunk> {
        self.count(|c| c.read += 1);
        if self.read_error_at == Some(sequence_number) {
            return Err(StreamError::Device(format!("read of chunk {sequence_number} failed")));
        }
        if let (Some(clock), Some(at)) = (&self.clock, self.arrivals.get(sequence_number as usize)) {
            clock.set(*at);
        }
        let n = self.params.record_length;
        let rows = self
            .channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| {
                let base = c.index as f64 * 1e6 + (sequence_number as usize * n) as f64;
                (c.index, (0..n).map(|i| base + i as f64).collect())
            })
            .collect();
        self.produced += 1;
        DataChunk::from_rows(sequence_number, OffsetDateTime::UNIX_EPOCH, rows)
    }

    fn list_channels(&self) -> Vec<ChannelInfo> {
        self.channels.clone()
    }

    fn list_resolutions(&self) -> Vec<u8> {
        vec![8, 12]
    }

    fn close(&mut self) -> Result<()> {
        self.count(|c| c.close += 1);
        Ok(())
    }
}

pub fn options() -> SessionOptions {
    SessionOptions {
        poll_interval: Duration::from_millis(1),
        stop_timeout: Duration::from_secs(5),
        preview_points: 4,
    }
}

pub fn params(record_length: usize) -> AcquisitionParameters {
    AcquisitionParameters {
        sample_rate: 1000.4,
        resolution_bits: 12,
        record_length,
    }
}

/// Receive events until `pred` matches, failing after a few seconds.
pub fn wait_for<T>(
    rx: &Receiver<SessionEvent>,
    mut pred: impl FnMut(&SessionEvent) -> Option<T>,
) -> T {
    loop {
        let ev = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("timed out waiting for session event");
        if let Some(v) = pred(&ev) {
            return v;
        }
    }
}

/// Wait until `count` chunks have been written.
pub fn wait_for_chunks(rx: &Receiver<SessionEvent>, count: u64) {
    wait_for(rx, |ev| match ev {
        SessionEvent::ChunkWritten {
            sequence_number, ..
        } if *sequence_number + 1 >= count => Some(()),
        _ => None,
    })
}
