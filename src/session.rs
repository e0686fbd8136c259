//! Acquisition session: arming, the background poll loop and its shutdown.
//!
//! While streaming, the device and the rotation manager live on the poll loop
//! thread. The caller keeps a stop channel and a completion channel; stopping
//! is a signal followed by a bounded wait for the loop to hand the device back.

use crate::{
    AcquisitionParameters, ChannelBank, Clock, Coupling, DataChunk, Device, FileRecord,
    FileRotationManager, OutputFormat, PreviewFrame, Result, RotationPolicy, StreamError,
    DEFAULT_PREVIEW_POINTS,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::{debug, error, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Armed,
    Streaming,
    Stopping,
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Faulted => "faulted",
        })
    }
}

/// Notifications pushed to the front end.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    FileOpened(PathBuf),
    FileSealed(PathBuf),
    ChunkWritten {
        sequence_number: u64,
        bytes: usize,
        path: PathBuf,
    },
    Preview(PreviewFrame),
    Fault(String),
}

/// Non-blocking handle for pushing [`SessionEvent`]s.
///
/// Events that do not fit in the queue are dropped: a slow front end must
/// never hold up acquisition.
#[derive(Debug, Clone, Default)]
pub struct EventSender(Option<Sender<SessionEvent>>);

impl EventSender {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: SessionEvent) {
        let Some(tx) = &self.0 else { return };
        match tx.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(event)) => debug!("Event queue full, dropped {:?}", event),
        }
    }
}

pub fn event_channel(capacity: usize) -> (EventSender, Receiver<SessionEvent>) {
    let (tx, rx) = bounded(capacity.max(1));
    (EventSender(Some(tx)), rx)
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// How long the loop waits between polls when no data is ready.
    pub poll_interval: Duration,
    /// Upper bound on how long `stop` waits for the loop to wind down.
    pub stop_timeout: Duration,
    pub preview_points: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(2),
            preview_points: DEFAULT_PREVIEW_POINTS,
        }
    }
}

/// What the poll loop hands back when it exits.
struct LoopExit {
    device: Box<dyn Device>,
    files: Vec<FileRecord>,
    chunks: u64,
    result: Result<()>,
}

struct RunningLoop {
    stop_tx: Sender<()>,
    done_rx: Receiver<LoopExit>,
    handle: JoinHandle<()>,
    preview: JoinHandle<()>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub chunks: u64,
    pub files: Vec<FileRecord>,
}

pub struct AcquisitionSession {
    state: SessionState,
    device: Option<Box<dyn Device>>,
    params: Option<AcquisitionParameters>,
    channels: ChannelBank,
    options: SessionOptions,
    clock: Arc<dyn Clock>,
    events: EventSender,
    preview_enabled: Arc<AtomicBool>,
    running: Option<RunningLoop>,
    last_run: RunReport,
    last_fault: Option<String>,
}

impl AcquisitionSession {
    /// Wrap an opened device.
    pub fn new(
        device: Box<dyn Device>,
        options: SessionOptions,
        clock: Arc<dyn Clock>,
        events: EventSender,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            device: Some(device),
            params: None,
            channels: ChannelBank::new(),
            options,
            clock,
            events,
            preview_enabled: Arc::new(AtomicBool::new(false)),
            running: None,
            last_run: RunReport::default(),
            last_fault: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Parameters read back from the device at the last successful arm.
    pub fn params(&self) -> Option<AcquisitionParameters> {
        self.params
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn device(&self) -> Option<&dyn Device> {
        self.device.as_deref()
    }

    pub fn last_run(&self) -> &RunReport {
        &self.last_run
    }

    pub fn last_fault(&self) -> Option<&str> {
        self.last_fault.as_deref()
    }

    pub fn set_preview(&self, enabled: bool) {
        self.preview_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn preview_enabled(&self) -> bool {
        self.preview_enabled.load(Ordering::SeqCst)
    }

    /// Configure the device for streaming.
    ///
    /// On success `params` is overwritten with the values the device actually
    /// applied.
    pub fn arm(&mut self, params: &mut AcquisitionParameters, channels: &ChannelBank) -> Result<()> {
        if !matches!(self.state, SessionState::Idle | SessionState::Armed) {
            return Err(self.invalid_state("arm"));
        }
        if !(params.sample_rate.is_finite() && params.sample_rate > 0.0) {
            return Err(StreamError::InvalidParameter(format!(
                "sample rate must be positive, got {}",
                params.sample_rate
            )));
        }
        if params.record_length == 0 {
            return Err(StreamError::InvalidParameter(
                "record length must be positive".to_string(),
            ));
        }
        channels.validate()?;

        let device = self
            .device
            .as_mut()
            .ok_or_else(|| StreamError::Device("no device attached".to_string()))?;
        if !device.can_stream() {
            return Err(StreamError::Device(
                "device does not support streaming mode".to_string(),
            ));
        }

        info!("Arm device...");
        let actual = device.configure(params)?;
        let present = device.list_channels();
        for c in channels.channels() {
            if present.iter().any(|p| p.index == c.index) {
                device.set_channel(c.index, c.enabled, c.range, Coupling::DcVolt)?;
            } else if c.enabled {
                return Err(StreamError::InvalidParameter(format!(
                    "channel {} is not present on the device",
                    c.index + 1
                )));
            }
        }

        let mut armed = channels.clone();
        for info in device.list_channels() {
            if armed.channel(info.index).is_some_and(|c| c.enabled) {
                armed.set_range(info.index, info.range)?;
            }
        }

        if actual != *params {
            info!("Device coerced {:?} to {:?}", params, actual);
        }
        *params = actual;
        self.params = Some(actual);
        self.channels = armed;
        self.set_state(SessionState::Armed);
        Ok(())
    }

    /// Open the first output file, start the device and launch the poll loop.
    pub fn start(&mut self, policy: RotationPolicy, base: &Path, format: OutputFormat) -> Result<()> {
        if self.state != SessionState::Armed {
            return Err(self.invalid_state("start"));
        }
        let params = self
            .params
            .ok_or_else(|| self.invalid_state("start"))?;
        let mut device = self
            .device
            .take()
            .ok_or_else(|| StreamError::Device("no device attached".to_string()))?;

        let mut rotation = match FileRotationManager::open_first(
            base,
            format,
            policy,
            params,
            &self.channels,
            Arc::clone(&self.clock),
        ) {
            Ok(rotation) => rotation,
            Err(e) => {
                self.device = Some(device);
                return Err(e);
            }
        };
        if let Some(path) = rotation.current_path() {
            self.events.emit(SessionEvent::FileOpened(path.to_path_buf()));
        }

        if let Err(e) = device.start() {
            if let Err(close_err) = rotation.close() {
                warn!("Failed to seal first file after start failure: {close_err}");
            }
            self.device = Some(device);
            return Err(e);
        }
        info!(
            "Acquiring on channels: {:?}",
            self.channels.enabled_indices()
        );

        let (stop_tx, stop_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let (preview_tx, preview_rx) = bounded::<DataChunk>(1);

        let preview = {
            let channels = self.channels.clone();
            let events = self.events.clone();
            let points = self.options.preview_points;
            thread::spawn(move || preview_worker(preview_rx, channels, points, events))
        };

        let ctx = LoopContext {
            device,
            rotation,
            stop_rx,
            preview_tx,
            preview_enabled: Arc::clone(&self.preview_enabled),
            events: self.events.clone(),
            poll_interval: self.options.poll_interval,
        };
        let handle = thread::spawn(move || {
            let exit = poll_loop(ctx);
            // Receiver only goes away if the session was dropped mid-wait.
            let _ = done_tx.send(exit);
        });

        self.running = Some(RunningLoop {
            stop_tx,
            done_rx,
            handle,
            preview,
        });
        self.last_fault = None;
        self.set_state(SessionState::Streaming);
        Ok(())
    }

    /// Drop the armed configuration without touching the device.
    pub fn disarm(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::Idle | SessionState::Armed) {
            return Err(self.invalid_state("disarm"));
        }
        self.params = None;
        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Ask the loop to finish and wait for it.
    ///
    /// A loop that already ended on a fault is collected and its error
    /// returned. Otherwise, outside `Streaming` this reports `InvalidState` and
    /// touches neither the device nor any file.
    pub fn stop(&mut self) -> Result<RunReport> {
        if let Some(err) = self.reap() {
            return Err(err);
        }
        if self.state != SessionState::Streaming {
            return Err(self.invalid_state("stop"));
        }
        let Some(running) = self.running.take() else {
            return Err(self.invalid_state("stop"));
        };

        self.set_state(SessionState::Stopping);
        // A full or closed channel both mean the loop is already on its way out.
        let _ = running.stop_tx.try_send(());

        let waited = self.options.stop_timeout;
        match running.done_rx.recv_timeout(waited) {
            Ok(exit) => {
                join_quietly(running.handle, "acquisition");
                join_quietly(running.preview, "preview");
                let result = exit.result.map(|_| RunReport {
                    chunks: exit.chunks,
                    files: exit.files.clone(),
                });
                self.finish(exit.device, exit.files, exit.chunks);
                if let Err(e) = &result {
                    self.last_fault = Some(e.to_string());
                }
                self.set_state(SessionState::Idle);
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                error!("Acquisition loop did not stop within {:?}", waited);
                let err = StreamError::LoopUnresponsive { waited };
                self.last_fault = Some(err.to_string());
                self.set_state(SessionState::Faulted);
                self.events.emit(SessionEvent::Fault(err.to_string()));
                self.set_state(SessionState::Idle);
                Err(err)
            }
            Err(RecvTimeoutError::Disconnected) => {
                join_quietly(running.handle, "acquisition");
                let err = StreamError::Device("acquisition loop terminated abnormally".to_string());
                self.last_fault = Some(err.to_string());
                self.set_state(SessionState::Idle);
                Err(err)
            }
        }
    }

    /// Collect a loop that ended on its own (overflow or another fatal error).
    ///
    /// Returns the error once; later calls return `None`.
    pub fn reap(&mut self) -> Option<StreamError> {
        if self.state != SessionState::Streaming {
            return None;
        }
        let exit = match self.running.as_ref()?.done_rx.try_recv() {
            Ok(exit) => exit,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                let running = self.running.take()?;
                join_quietly(running.handle, "acquisition");
                self.set_state(SessionState::Idle);
                return Some(StreamError::Device(
                    "acquisition loop terminated abnormally".to_string(),
                ));
            }
        };
        if let Some(running) = self.running.take() {
            join_quietly(running.handle, "acquisition");
            join_quietly(running.preview, "preview");
        }
        let LoopExit {
            device,
            files,
            chunks,
            result,
        } = exit;
        self.finish(device, files, chunks);
        match result {
            Ok(()) => {
                self.set_state(SessionState::Idle);
                None
            }
            Err(e) => {
                self.last_fault = Some(e.to_string());
                self.state = SessionState::Faulted;
                self.set_state(SessionState::Idle);
                Some(e)
            }
        }
    }

    /// Give the device back, e.g. to close it. Refused while a loop is running.
    pub fn into_device(mut self) -> Result<Box<dyn Device>> {
        self.reap();
        if self.running.is_some() {
            return Err(self.invalid_state("release the device"));
        }
        self.device
            .take()
            .ok_or_else(|| StreamError::Device("device was lost".to_string()))
    }

    fn finish(&mut self, device: Box<dyn Device>, files: Vec<FileRecord>, chunks: u64) {
        self.device = Some(device);
        self.params = None;
        self.last_run = RunReport { chunks, files };
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!("Session {} -> {}", self.state, state);
        }
        self.state = state;
        self.events.emit(SessionEvent::StateChanged(state));
    }

    fn invalid_state(&self, operation: &'static str) -> StreamError {
        StreamError::InvalidState {
            operation,
            state: self.state,
        }
    }
}

impl Drop for AcquisitionSession {
    fn drop(&mut self) {
        if self.running.is_some() {
            if let Err(e) = self.stop() {
                warn!("Session dropped while streaming: {e}");
            }
        }
    }
}

fn join_quietly(handle: JoinHandle<()>, name: &str) {
    if handle.join().is_err() {
        error!("{name} thread panicked");
    }
}

struct LoopContext {
    device: Box<dyn Device>,
    rotation: FileRotationManager,
    stop_rx: Receiver<()>,
    preview_tx: Sender<DataChunk>,
    preview_enabled: Arc<AtomicBool>,
    events: EventSender,
    poll_interval: Duration,
}

fn poll_loop(ctx: LoopContext) -> LoopExit {
    let LoopContext {
        mut device,
        mut rotation,
        stop_rx,
        preview_tx,
        preview_enabled,
        events,
        poll_interval,
    } = ctx;
    let mut sequence = 0u64;

    let mut result = loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break Ok(()),
            Err(TryRecvError::Empty) => {}
        }

        let status = match device.poll_status() {
            Ok(status) => status,
            Err(e) => break Err(e),
        };
        if status.overflow {
            break Err(StreamError::Overflow {
                last_sequence: rotation.last_sequence(),
            });
        }
        if !status.ready {
            match stop_rx.recv_timeout(poll_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break Ok(()),
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }

        let chunk = match device.read_chunk(sequence) {
            Ok(chunk) if chunk.sequence_number == sequence => chunk,
            Ok(chunk) => {
                break Err(StreamError::Device(format!(
                    "device returned chunk {} for request {sequence}",
                    chunk.sequence_number
                )))
            }
            Err(e) => break Err(e),
        };

        let open_before = rotation.files().len();
        let path = match rotation.write(&chunk) {
            Ok(path) => path,
            Err(e) => break Err(e),
        };
        announce_rotation(&rotation, open_before, &events);
        events.emit(SessionEvent::ChunkWritten {
            sequence_number: sequence,
            bytes: chunk.size_bytes(),
            path,
        });
        sequence += 1;

        if preview_enabled.load(Ordering::Relaxed) {
            // The file write is done, so the chunk itself can move on.
            if let Err(TrySendError::Full(chunk)) = preview_tx.try_send(chunk) {
                debug!("Preview busy, skipped chunk {}", chunk.sequence_number);
            }
        }
    };

    if let Err(e) = &result {
        error!(
            "{e}; samples after chunk {:?} are lost",
            rotation.last_sequence()
        );
        events.emit(SessionEvent::StateChanged(SessionState::Faulted));
        events.emit(SessionEvent::Fault(e.to_string()));
    }

    let open = rotation.current_path().map(Path::to_path_buf);
    match rotation.close() {
        Ok(()) => {
            if let Some(path) = open {
                events.emit(SessionEvent::FileSealed(path));
            }
        }
        Err(e) => {
            error!("Failed to seal output file: {e}");
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    if let Err(e) = device.stop() {
        error!("Failed to stop device: {e}");
        if result.is_ok() {
            result = Err(e);
        }
    }
    info!("Acquisition loop finished after {sequence} chunk(s)");

    LoopExit {
        device,
        files: rotation.files().to_vec(),
        chunks: sequence,
        result,
    }
}

fn announce_rotation(rotation: &FileRotationManager, open_before: usize, events: &EventSender) {
    let files = rotation.files();
    if files.len() <= open_before {
        return;
    }
    for pair in files[open_before - 1..].windows(2) {
        events.emit(SessionEvent::FileSealed(pair[0].path.clone()));
        events.emit(SessionEvent::FileOpened(pair[1].path.clone()));
    }
}

fn preview_worker(
    rx: Receiver<DataChunk>,
    channels: ChannelBank,
    max_points: usize,
    events: EventSender,
) {
    for chunk in rx {
        events.emit(SessionEvent::Preview(PreviewFrame::from_chunk(
            &chunk, &channels, max_points,
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, SimulatedScope};
    use tempfile::TempDir;
    use time::OffsetDateTime;

    fn session(scope: SimulatedScope) -> (AcquisitionSession, Receiver<SessionEvent>) {
        let mut scope = scope;
        scope.open().unwrap();
        let (events, rx) = event_channel(1024);
        let session = AcquisitionSession::new(
            Box::new(scope),
            SessionOptions {
                poll_interval: Duration::from_millis(1),
                ..Default::default()
            },
            Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH)),
            events,
        );
        (session, rx)
    }

    fn one_channel() -> ChannelBank {
        let mut bank = ChannelBank::new();
        bank.set_enabled(0, true).unwrap();
        bank.set_range(0, 2.0).unwrap();
        bank
    }

    #[test]
    fn arm_rejects_bad_parameters() {
        let (mut s, _rx) = session(SimulatedScope::new(1));
        let bank = one_channel();
        let mut bad_rate = AcquisitionParameters {
            sample_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            s.arm(&mut bad_rate, &bank),
            Err(StreamError::InvalidParameter(_))
        ));
        let mut bad_len = AcquisitionParameters {
            record_length: 0,
            ..Default::default()
        };
        assert!(s.arm(&mut bad_len, &bank).is_err());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn arm_reads_back_device_values() {
        let (mut s, _rx) = session(SimulatedScope::new(1));
        let mut params = AcquisitionParameters {
            sample_rate: 1000.4,
            resolution_bits: 13,
            record_length: 10,
        };
        s.arm(&mut params, &one_channel()).unwrap();
        assert_eq!(params.sample_rate, 1000.0);
        assert_eq!(params.resolution_bits, 12);
        assert_eq!(s.params(), Some(params));
        assert_eq!(s.state(), SessionState::Armed);
    }

    #[test]
    fn start_requires_armed() {
        let dir = TempDir::new().unwrap();
        let (mut s, _rx) = session(SimulatedScope::new(1));
        let err = s
            .start(RotationPolicy::never(), &dir.path().join("x"), OutputFormat::Text)
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::InvalidState {
                state: SessionState::Idle,
                ..
            }
        ));
        assert!(!dir.path().join("x.csv").exists());
    }

    #[test]
    fn stream_then_stop() {
        let dir = TempDir::new().unwrap();
        let (mut s, rx) = session(SimulatedScope::new(1).with_pace(0.0));
        let mut params = AcquisitionParameters {
            sample_rate: 1000.0,
            resolution_bits: 8,
            record_length: 8,
        };
        s.arm(&mut params, &one_channel()).unwrap();
        s.set_preview(true);
        s.start(RotationPolicy::never(), &dir.path().join("run"), OutputFormat::Text)
            .unwrap();

        let mut written = 0;
        while written < 3 {
            if let SessionEvent::ChunkWritten { .. } = rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                written += 1;
            }
        }
        let report = s.stop().unwrap();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(report.chunks >= 3);
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].chunk_count, report.chunks);

        let text = std::fs::read_to_string(dir.path().join("run.csv")).unwrap();
        assert_eq!(text.lines().skip(6).count() as u64, report.chunks * 8);

        // Stopping twice is reported, not ignored.
        assert!(matches!(
            s.stop(),
            Err(StreamError::InvalidState { .. })
        ));
    }

    #[test]
    fn overflow_faults_and_returns_to_idle() {
        let dir = TempDir::new().unwrap();
        let (mut s, rx) = session(
            SimulatedScope::new(1)
                .with_pace(0.0)
                .with_overflow_after(Some(2)),
        );
        let mut params = AcquisitionParameters {
            sample_rate: 1000.0,
            resolution_bits: 8,
            record_length: 4,
        };
        s.arm(&mut params, &one_channel()).unwrap();
        s.start(RotationPolicy::never(), &dir.path().join("ovf"), OutputFormat::Text)
            .unwrap();

        loop {
            if let SessionEvent::Fault(_) = rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                break;
            }
        }
        let err = loop {
            if let Some(err) = s.reap() {
                break err;
            }
            thread::sleep(Duration::from_millis(1));
        };
        assert!(matches!(
            err,
            StreamError::Overflow {
                last_sequence: Some(1)
            }
        ));
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.has_device());
        assert_eq!(s.last_run().chunks, 2);
        assert!(s.last_fault().is_some());
        assert!(s.reap().is_none());
    }

    #[test]
    fn stop_after_fault_returns_the_fault() {
        let dir = TempDir::new().unwrap();
        let (mut s, rx) = session(
            SimulatedScope::new(1)
                .with_pace(0.0)
                .with_overflow_after(Some(2)),
        );
        let mut params = AcquisitionParameters {
            sample_rate: 1000.0,
            resolution_bits: 8,
            record_length: 4,
        };
        s.arm(&mut params, &one_channel()).unwrap();
        s.start(RotationPolicy::never(), &dir.path().join("late"), OutputFormat::Text)
            .unwrap();
        loop {
            if let SessionEvent::Fault(_) = rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                break;
            }
        }

        assert!(matches!(
            s.stop(),
            Err(StreamError::Overflow {
                last_sequence: Some(1)
            })
        ));
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.has_device());
        assert!(matches!(
            s.stop(),
            Err(StreamError::InvalidState {
                state: SessionState::Idle,
                ..
            })
        ));
    }

    #[test]
    fn disarm_returns_to_idle() {
        let (mut s, _rx) = session(SimulatedScope::new(1));
        let mut params = AcquisitionParameters::default();
        s.arm(&mut params, &one_channel()).unwrap();
        s.disarm().unwrap();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.params(), None);
        s.disarm().unwrap();
    }

    #[test]
    fn rotation_events_follow_file_order() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);
        let mut rotation = FileRotationManager::open_first(
            &dir.path().join("r"),
            OutputFormat::Text,
            RotationPolicy::new(crate::RotationUnit::Seconds, 1.0).unwrap(),
            AcquisitionParameters::default(),
            &one_channel(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        for seq in 0..3 {
            let chunk =
                DataChunk::from_rows(seq, OffsetDateTime::UNIX_EPOCH, vec![(0, vec![1.0])]).unwrap();
            rotation.write(&chunk).unwrap();
            clock.advance(Duration::from_millis(1500));
        }
        assert_eq!(rotation.files().len(), 3);

        let (events, rx) = event_channel(16);
        announce_rotation(&rotation, 1, &events);
        let names = rx
            .try_iter()
            .map(|ev| match ev {
                SessionEvent::FileSealed(p) => format!("sealed {}", p.file_name().unwrap().to_string_lossy()),
                SessionEvent::FileOpened(p) => format!("opened {}", p.file_name().unwrap().to_string_lossy()),
                other => panic!("unexpected {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "sealed r000000.csv",
                "opened r000001.csv",
                "sealed r000001.csv",
                "opened r000002.csv",
            ]
        );
    }
}
