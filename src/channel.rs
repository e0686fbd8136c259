use crate::{ChannelInfo, DeviceKind, Result, StreamError};

pub const MAX_CHANNELS: usize = 16;
pub const CHANNELS_PER_GROUP: usize = 4;
pub const NUM_GROUPS: usize = MAX_CHANNELS / CHANNELS_PER_GROUP;

/// Settings of one input channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub index: usize,
    pub enabled: bool,
    pub name: String,
    /// Input range in volts, one of the values the device reports.
    pub range: f64,
}

impl ChannelConfig {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            enabled: false,
            name: format!("Chan_{}", index + 1),
            range: 0.0,
        }
    }
}

pub fn channel_label(index: usize) -> String {
    format!("chan{:02}", index + 1)
}

/// One physical enclosure holding four consecutive channels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentGroup {
    pub serial: Option<u32>,
    pub enabled: bool,
}

impl InstrumentGroup {
    pub fn title(&self) -> String {
        match self.serial {
            Some(sn) => format!("Serial #{sn}"),
            None => "Serial".to_string(),
        }
    }
}

/// The full set of channel settings, grouped per enclosure.
#[derive(Debug, Clone)]
pub struct ChannelBank {
    channels: Vec<ChannelConfig>,
    groups: [InstrumentGroup; NUM_GROUPS],
    /// Ranges offered by the device, per channel. Empty until a device is opened.
    ranges: Vec<Vec<f64>>,
}

impl Default for ChannelBank {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBank {
    pub fn new() -> Self {
        Self {
            channels: (0..MAX_CHANNELS).map(ChannelConfig::new).collect(),
            groups: Default::default(),
            ranges: vec![Vec::new(); MAX_CHANNELS],
        }
    }

    pub fn channels(&self) -> &[ChannelConfig] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelConfig> {
        self.channels.get(index)
    }

    pub fn groups(&self) -> &[InstrumentGroup] {
        &self.groups
    }

    pub fn available_ranges(&self, index: usize) -> &[f64] {
        self.ranges.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indices of enabled channels, ascending.
    pub fn enabled_indices(&self) -> Vec<usize> {
        self.channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.index)
            .collect()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter().filter(|c| c.enabled)
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.get_mut(index)?.enabled = enabled;
        Ok(())
    }

    pub fn set_name(&mut self, index: usize, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StreamError::InvalidParameter(format!(
                "channel {} name must not be empty",
                index + 1
            )));
        }
        self.get_mut(index)?.name = name.to_string();
        Ok(())
    }

    pub fn set_range(&mut self, index: usize, range: f64) -> Result<()> {
        if !(range.is_finite() && range >= 0.0) {
            return Err(StreamError::InvalidParameter(format!(
                "channel {} range {range} is not a valid voltage",
                index + 1
            )));
        }
        self.get_mut(index)?.range = range;
        Ok(())
    }

    /// Replace all channel settings at once, e.g. from a settings file.
    pub fn replace(&mut self, channels: Vec<ChannelConfig>) -> Result<()> {
        if channels.len() != MAX_CHANNELS {
            return Err(StreamError::InvalidParameter(format!(
                "expected {MAX_CHANNELS} channels, got {}",
                channels.len()
            )));
        }
        for (i, c) in channels.iter().enumerate() {
            if c.index != i {
                return Err(StreamError::InvalidParameter(format!(
                    "channel at position {i} has index {}",
                    c.index
                )));
            }
        }
        self.channels = channels;
        Ok(())
    }

    /// Label the groups and pull current channel state from a freshly opened device.
    pub fn apply_device(&mut self, kind: &DeviceKind, infos: &[ChannelInfo]) {
        self.groups = Default::default();
        for (group, serial) in self.groups.iter_mut().zip(kind.serials()) {
            group.serial = Some(serial);
            group.enabled = true;
        }
        for info in infos {
            if let Some(channel) = self.channels.get_mut(info.index) {
                channel.enabled = info.enabled;
                channel.range = info.range;
                self.ranges[info.index] = info.ranges.clone();
            }
        }
    }

    /// Forget everything learned from the device.
    pub fn detach_device(&mut self) {
        self.groups = Default::default();
        self.ranges = vec![Vec::new(); MAX_CHANNELS];
    }

    /// Check the enabled set before arming and return its indices.
    pub fn validate(&self) -> Result<Vec<usize>> {
        let enabled = self.enabled_indices();
        if enabled.is_empty() {
            return Err(StreamError::InvalidParameter(
                "no channel is enabled".to_string(),
            ));
        }
        for c in self.enabled() {
            if c.name.trim().is_empty() {
                return Err(StreamError::InvalidParameter(format!(
                    "channel {} has an empty name",
                    c.index + 1
                )));
            }
            let group = c.index / CHANNELS_PER_GROUP;
            if self.groups.iter().any(|g| g.enabled) && !self.groups[group].enabled {
                return Err(StreamError::InvalidParameter(format!(
                    "channel {} belongs to an instrument that is not present",
                    c.index + 1
                )));
            }
            let ranges = self.available_ranges(c.index);
            if !ranges.is_empty() && !ranges.iter().any(|r| (r - c.range).abs() < 1e-9) {
                return Err(StreamError::InvalidParameter(format!(
                    "channel {} range {} is not offered by the device",
                    c.index + 1,
                    c.range
                )));
            }
        }
        Ok(enabled)
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut ChannelConfig> {
        self.channels.get_mut(index).ok_or_else(|| {
            StreamError::InvalidParameter(format!("channel index {index} out of range"))
        })
    }
}
