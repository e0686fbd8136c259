use crate::{
    event_channel, AcquisitionParameters, AcquisitionSession, ChannelBank, Clock, Device,
    DeviceKind, EventSender, OutputFormat, Result, RotationPolicy, RunReport, SessionEvent,
    SessionOptions, SessionSettings, SessionState, StreamError,
};
use crossbeam_channel::Receiver;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where and how output files are written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    pub base: PathBuf,
    pub format: OutputFormat,
    pub policy: RotationPolicy,
}

impl Default for OutputTarget {
    fn default() -> Self {
        Self {
            base: PathBuf::from("datastream"),
            format: OutputFormat::Hdf5,
            policy: RotationPolicy::never(),
        }
    }
}

/// Snapshot for the front end.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub state: SessionState,
    pub device: Option<DeviceKind>,
    pub params: AcquisitionParameters,
    pub preview: bool,
    pub last_run: RunReport,
    pub last_fault: Option<String>,
}

/// Owns the channel settings and at most one acquisition session.
pub struct AcquisitionController {
    channels: ChannelBank,
    params: AcquisitionParameters,
    output: OutputTarget,
    options: SessionOptions,
    clock: Arc<dyn Clock>,
    events: EventSender,
    session: Option<AcquisitionSession>,
    device_kind: Option<DeviceKind>,
    resolutions: Vec<u8>,
    preview: bool,
}

impl AcquisitionController {
    pub fn new(options: SessionOptions, clock: Arc<dyn Clock>, events: EventSender) -> Self {
        Self {
            channels: ChannelBank::new(),
            params: AcquisitionParameters::default(),
            output: OutputTarget::default(),
            options,
            clock,
            events,
            session: None,
            device_kind: None,
            resolutions: Vec::new(),
            preview: false,
        }
    }

    /// Build a controller together with the receiving end of its event queue.
    pub fn with_event_queue(
        options: SessionOptions,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> (Self, Receiver<SessionEvent>) {
        let (events, rx) = event_channel(capacity);
        (Self::new(options, clock, events), rx)
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, AcquisitionSession::state)
    }

    pub fn device_kind(&self) -> Option<&DeviceKind> {
        self.device_kind.as_ref()
    }

    pub fn channels(&self) -> &ChannelBank {
        &self.channels
    }

    pub fn params(&self) -> AcquisitionParameters {
        self.params
    }

    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    pub fn resolutions(&self) -> &[u8] {
        &self.resolutions
    }

    pub fn ranges(&self, channel: usize) -> &[f64] {
        self.channels.available_ranges(channel)
    }

    pub fn open_device(&mut self, mut device: Box<dyn Device>) -> Result<DeviceKind> {
        if self.session.is_some() {
            return Err(StreamError::Device(
                "a device is already open, close it first".to_string(),
            ));
        }
        let kind = device.open()?;
        match &kind {
            DeviceKind::Single { serial } => info!("Opened device #{serial}"),
            DeviceKind::Combined { contained_serials } => {
                info!("Opened combined device, contained serials {:?}", contained_serials)
            }
        }
        if !device.can_stream() {
            if let Err(e) = device.close() {
                warn!("Failed to close device: {e}");
            }
            return Err(StreamError::Device(
                "device does not support streaming mode".to_string(),
            ));
        }

        self.channels.apply_device(&kind, &device.list_channels());
        self.resolutions = device.list_resolutions();
        if !self.resolutions.is_empty() && !self.resolutions.contains(&self.params.resolution_bits)
        {
            self.params.resolution_bits = self.resolutions[0];
        }

        let session = AcquisitionSession::new(
            device,
            self.options,
            Arc::clone(&self.clock),
            self.events.clone(),
        );
        session.set_preview(self.preview);
        self.session = Some(session);
        self.device_kind = Some(kind.clone());
        Ok(kind)
    }

    pub fn close_device(&mut self) -> Result<()> {
        self.reap();
        let state = self.state();
        if matches!(state, SessionState::Streaming | SessionState::Stopping) {
            return Err(StreamError::InvalidState {
                operation: "close the device",
                state,
            });
        }
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.device_kind = None;
        self.channels.detach_device();
        self.resolutions.clear();
        session.into_device()?.close()?;
        info!("Device closed");
        Ok(())
    }

    pub fn arm(&mut self) -> Result<AcquisitionParameters> {
        self.reap();
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| StreamError::Device("no device is open".to_string()))?;
        session.arm(&mut self.params, &self.channels)?;
        if let Some(device) = session.device() {
            for info in device.list_channels() {
                if self.channels.channel(info.index).is_some_and(|c| c.enabled) {
                    self.channels.set_range(info.index, info.range)?;
                }
            }
        }
        Ok(self.params)
    }

    /// Leave `Armed` without starting, so settings can be edited again.
    pub fn disarm(&mut self) -> Result<()> {
        self.reap();
        match self.session.as_mut() {
            Some(session) => session.disarm(),
            None => Ok(()),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.reap();
        let output = self.output.clone();
        let session = self.session.as_mut().ok_or(StreamError::InvalidState {
            operation: "start",
            state: SessionState::Idle,
        })?;
        session.start(output.policy, &output.base, output.format)?;
        info!("Streaming to {:?}", output.base);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<RunReport> {
        let Some(session) = self.session.as_mut() else {
            return Err(StreamError::InvalidState {
                operation: "stop",
                state: SessionState::Idle,
            });
        };
        let result = session.stop();
        if !session.has_device() {
            // The loop never handed the device back.
            error!("Device lost after stop failure, dropping session");
            self.session = None;
            self.device_kind = None;
            self.channels.detach_device();
        }
        result
    }

    /// Collect a session that faulted on its own and report current state.
    pub fn status(&mut self) -> ControllerStatus {
        self.reap();
        let (last_run, last_fault) = self.session.as_ref().map_or_else(
            || (RunReport::default(), None),
            |s| (s.last_run().clone(), s.last_fault().map(str::to_string)),
        );
        ControllerStatus {
            state: self.state(),
            device: self.device_kind.clone(),
            params: self.params,
            preview: self.preview,
            last_run,
            last_fault,
        }
    }

    /// Turn the live preview on or off. Repeating the same request is harmless.
    pub fn set_preview(&mut self, enabled: bool) {
        if self.preview != enabled {
            info!("Preview {}", if enabled { "on" } else { "off" });
        }
        self.preview = enabled;
        if let Some(session) = &self.session {
            session.set_preview(enabled);
        }
    }

    pub fn preview(&self) -> bool {
        self.preview
    }

    pub fn set_channel_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.ensure_mutable("change a channel")?;
        self.channels.set_enabled(index, enabled)
    }

    pub fn set_channel_name(&mut self, index: usize, name: &str) -> Result<()> {
        self.ensure_mutable("rename a channel")?;
        self.channels.set_name(index, name)
    }

    pub fn set_channel_range(&mut self, index: usize, range: f64) -> Result<()> {
        self.ensure_mutable("change a channel range")?;
        self.channels.set_range(index, range)
    }

    pub fn set_params(&mut self, params: AcquisitionParameters) -> Result<()> {
        self.ensure_mutable("change acquisition parameters")?;
        self.params = params;
        Ok(())
    }

    pub fn set_output(&mut self, output: OutputTarget) -> Result<()> {
        self.ensure_mutable("change the output")?;
        self.output = output;
        Ok(())
    }

    /// Replace output format, rotation, parameters and channels from a file.
    ///
    /// The output directory and base name are kept.
    pub fn load_settings(&mut self, path: &Path) -> Result<()> {
        self.ensure_mutable("load settings")?;
        let settings = SessionSettings::load(path)?;
        self.channels.replace(settings.channels)?;
        self.params = settings.params;
        self.output.format = settings.format;
        self.output.policy = settings.policy;
        info!("Loaded settings from {:?}", path);
        Ok(())
    }

    pub fn save_settings(&self, path: &Path) -> Result<()> {
        SessionSettings {
            format: self.output.format,
            policy: self.output.policy,
            params: self.params,
            channels: self.channels.channels().to_vec(),
        }
        .save(path, self.clock.timestamp())
    }

    fn reap(&mut self) {
        if let Some(err) = self.session.as_mut().and_then(AcquisitionSession::reap) {
            error!("Session ended: {err}");
        }
    }

    fn ensure_mutable(&mut self, operation: &'static str) -> Result<()> {
        self.reap();
        let state = self.state();
        if state != SessionState::Idle {
            return Err(StreamError::InvalidState { operation, state });
        }
        Ok(())
    }
}

impl Drop for AcquisitionController {
    fn drop(&mut self) {
        if self.state() == SessionState::Streaming {
            if let Err(e) = self.stop() {
                warn!("Stop on shutdown failed: {e}");
            }
        }
        if let Err(e) = self.close_device() {
            warn!("Close on shutdown failed: {e}");
        }
    }
}
