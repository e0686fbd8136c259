use crate::{DataChunk, Result};

/// Acquisition settings pushed to the device on arm.
///
/// After arming, the values read back from the device replace the requested
/// ones; those are what ends up in file metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionParameters {
    pub sample_rate: f64,
    pub resolution_bits: u8,
    pub record_length: usize,
}

impl Default for AcquisitionParameters {
    fn default() -> Self {
        Self {
            sample_rate: 1000.0,
            resolution_bits: 8,
            record_length: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupling {
    DcVolt,
    AcVolt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStatus {
    pub ready: bool,
    pub overflow: bool,
}

/// What sits behind an opened device handle, resolved once at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Single { serial: u32 },
    /// Several synchronised units driven as one instrument.
    Combined { contained_serials: Vec<u32> },
}

impl DeviceKind {
    pub fn serials(&self) -> Vec<u32> {
        match self {
            Self::Single { serial } => vec![*serial],
            Self::Combined { contained_serials } => contained_serials.clone(),
        }
    }

    pub fn units(&self) -> usize {
        match self {
            Self::Single { .. } => 1,
            Self::Combined { contained_serials } => contained_serials.len(),
        }
    }
}

/// Per-channel state as reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub index: usize,
    pub enabled: bool,
    pub range: f64,
    pub ranges: Vec<f64>,
}

/// Streaming oscilloscope as seen by the acquisition pipeline.
///
/// While a session is streaming the device is owned by the poll loop thread,
/// so implementations only need to be `Send`.
pub trait Device: Send {
    fn open(&mut self) -> Result<DeviceKind>;

    fn can_stream(&self) -> bool;

    /// Apply the requested parameters and return what the device actually uses.
    fn configure(&mut self, params: &AcquisitionParameters) -> Result<AcquisitionParameters>;

    fn set_channel(
        &mut self,
        index: usize,
        enabled: bool,
        range: f64,
        coupling: Coupling,
    ) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn poll_status(&mut self) -> Result<PollStatus>;

    /// Read the pending chunk. The returned chunk owns its samples.
    fn read_chunk(&mut self, sequence_number: u64) -> Result<DataChunk>;

    fn list_channels(&self) -> Vec<ChannelInfo>;

    fn list_resolutions(&self) -> Vec<u8>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
