use crate::{
    AcquisitionParameters, ChannelConfig, OutputFormat, Result, RotationPolicy, RotationUnit,
    SessionOptions, StreamError, CHANNELS_PER_GROUP, MAX_CHANNELS, NUM_GROUPS,
};
use confique::Config;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub output: OutputConf,
    #[config(nested)]
    pub acquisition: AcquisitionConf,
    #[config(nested)]
    pub logging: LoggingConf,
    #[config(nested)]
    pub simulator: SimulatorConf,
}

#[derive(Config, Debug, Clone)]
pub struct OutputConf {
    #[config(default = ".")]
    pub dir: PathBuf,
    #[config(default = "datastream")]
    pub base_name: String,
    #[config(default = "hdf5")]
    pub format: OutputFormat,
    #[config(default = 1.0)]
    pub rotation_period: f64,
    #[config(default = "infty")]
    pub rotation_unit: RotationUnit,
    /// Channel settings file applied at startup.
    pub settings: Option<PathBuf>,
}

#[derive(Config, Debug, Clone)]
pub struct AcquisitionConf {
    #[config(default = 1000.0)]
    pub sample_rate: f64,
    #[config(default = 8)]
    pub resolution: u8,
    #[config(default = 1000)]
    pub record_length: usize,
    /// 1-based channel numbers enabled when no settings file is given.
    #[config(default = [1])]
    pub channels: Vec<usize>,
    #[config(default = 10)]
    pub poll_interval_ms: u64,
    #[config(default = 2000)]
    pub stop_timeout_ms: u64,
    #[config(default = 400)]
    pub preview_points: usize,
    #[config(default = false)]
    pub preview: bool,
}

#[derive(Config, Debug, Clone)]
pub struct LoggingConf {
    #[config(default = "scope_stream.log")]
    pub file: PathBuf,
    #[config(default = "info")]
    pub level: String,
}

#[derive(Config, Debug, Clone)]
pub struct SimulatorConf {
    #[config(default = 1)]
    pub units: usize,
    /// Scale on the natural chunk period, 0 streams as fast as possible.
    #[config(default = 1.0)]
    pub pace: f64,
    pub overflow_after: Option<u64>,
}

impl OutputConf {
    pub fn base_path(&self) -> PathBuf {
        self.dir.join(&self.base_name)
    }

    pub fn policy(&self) -> Result<RotationPolicy> {
        RotationPolicy::new(self.rotation_unit, self.rotation_period)
    }
}

impl AcquisitionConf {
    pub fn params(&self) -> AcquisitionParameters {
        AcquisitionParameters {
            sample_rate: self.sample_rate,
            resolution_bits: self.resolution,
            record_length: self.record_length,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
            preview_points: self.preview_points,
        }
    }
}

/// Number of lines in a settings file.
pub const SETTINGS_LINES: usize = 7 + 3 * MAX_CHANNELS;

/// Everything an operator can save and restore between sessions.
///
/// Stored as plain `key:value` lines whose meaning is given by position:
///
/// ```text
/// Date:2024-05-01T12:00:00Z
/// File format:.hdf5
/// New file period:1
/// New file unit:infty
/// Sampling freq:1000
/// Resolution:8
/// Record length:1000
/// Instr1_Chan1:1          enabled
/// Instr1_Chan1:Chan_1     name
/// Instr1_Chan1:8          range
/// ...
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub format: OutputFormat,
    pub policy: RotationPolicy,
    pub params: AcquisitionParameters,
    pub channels: Vec<ChannelConfig>,
}

impl SessionSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| StreamError::file_io(path, e))?;
        Self::parse(&text)
    }

    pub fn save(&self, path: &Path, date: OffsetDateTime) -> Result<()> {
        let text = self.to_text(date)?;
        fs::write(path, text).map_err(|e| StreamError::file_io(path, e))?;
        log::info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn to_text(&self, date: OffsetDateTime) -> Result<String> {
        if self.channels.len() != MAX_CHANNELS {
            return Err(StreamError::InvalidParameter(format!(
                "expected {MAX_CHANNELS} channels, got {}",
                self.channels.len()
            )));
        }
        let date = date
            .format(&Rfc3339)
            .map_err(|e| StreamError::InvalidParameter(e.to_string()))?;

        let mut lines = vec![
            format!("Date:{date}"),
            format!("File format:{}", self.format.extension()),
            format!("New file period:{}", self.policy.period),
            format!("New file unit:{}", self.policy.unit),
            format!("Sampling freq:{}", self.params.sample_rate),
            format!("Resolution:{}", self.params.resolution_bits),
            format!("Record length:{}", self.params.record_length),
        ];
        for c in &self.channels {
            if c.name.contains(['\n', '\r']) {
                return Err(StreamError::InvalidParameter(format!(
                    "channel {} name spans several lines",
                    c.index + 1
                )));
            }
            let key = channel_key(c.index);
            lines.push(format!("{key}:{}", u8::from(c.enabled)));
            lines.push(format!("{key}:{}", c.name));
            lines.push(format!("{key}:{}", c.range));
        }

        let mut text = lines.join("\n");
        text.push('\n');
        Ok(text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let lines = text.lines().collect::<Vec<_>>();
        if lines.len() < SETTINGS_LINES {
            return Err(StreamError::ConfigParse {
                line: lines.len(),
                reason: format!("expected {SETTINGS_LINES} lines, found {}", lines.len()),
            });
        }

        let format = value(&lines, 1).and_then(|v| {
            OutputFormat::from_extension(v.trim()).ok_or_else(|| parse_err(1, "unknown file format"))
        })?;
        let period = number::<f64>(&lines, 2)?;
        let unit = value(&lines, 3).and_then(|v| {
            RotationUnit::parse(v).ok_or_else(|| parse_err(3, "unknown rotation unit"))
        })?;
        let policy = RotationPolicy::new(unit, period).map_err(|e| parse_err(2, e))?;
        let params = AcquisitionParameters {
            sample_rate: number(&lines, 4)?,
            resolution_bits: number(&lines, 5)?,
            record_length: number(&lines, 6)?,
        };

        let mut channels = Vec::with_capacity(MAX_CHANNELS);
        for index in 0..MAX_CHANNELS {
            let n = 7 + 3 * index;
            let enabled = match value(&lines, n)?.trim() {
                "0" => false,
                "1" => true,
                other => return Err(parse_err(n, format!("expected 0 or 1, got {other:?}"))),
            };
            let name = value(&lines, n + 1)?.trim_end_matches('\r').to_string();
            let range = number::<f64>(&lines, n + 2)?;
            channels.push(ChannelConfig {
                index,
                enabled,
                name,
                range,
            });
        }

        Ok(Self {
            format,
            policy,
            params,
            channels,
        })
    }
}

/// Key prefix of one channel's lines, e.g. `Instr2_Chan3`.
pub fn channel_key(index: usize) -> String {
    debug_assert!(index / CHANNELS_PER_GROUP < NUM_GROUPS);
    format!(
        "Instr{}_Chan{}",
        index / CHANNELS_PER_GROUP + 1,
        index % CHANNELS_PER_GROUP + 1
    )
}

fn parse_err(line: usize, reason: impl ToString) -> StreamError {
    StreamError::ConfigParse {
        line,
        reason: reason.to_string(),
    }
}

/// Everything after the first `:` of line `n`.
fn value<'a>(lines: &[&'a str], n: usize) -> Result<&'a str> {
    let line = lines.get(n).ok_or_else(|| parse_err(n, "missing line"))?;
    line.split_once(':')
        .map(|(_, v)| v)
        .ok_or_else(|| parse_err(n, "missing ':' separator"))
}

fn number<T>(lines: &[&str], n: usize) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = value(lines, n)?.trim();
    raw.parse::<T>()
        .map_err(|e| parse_err(n, format!("{raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::datetime;

    fn sample() -> SessionSettings {
        let mut channels = (0..MAX_CHANNELS).map(ChannelConfig::new).collect::<Vec<_>>();
        channels[0].enabled = true;
        channels[0].range = 8.0;
        channels[5].enabled = true;
        channels[5].name = "probe: left".to_string();
        channels[5].range = 0.2;
        SessionSettings {
            format: OutputFormat::Text,
            policy: RotationPolicy::new(RotationUnit::Minutes, 2.5).unwrap(),
            params: AcquisitionParameters {
                sample_rate: 6.25e6,
                resolution_bits: 14,
                record_length: 50_000,
            },
            channels,
        }
    }

    #[test]
    fn layout_is_positional() {
        let text = sample().to_text(datetime!(2024-05-01 12:00 UTC)).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), SETTINGS_LINES);
        assert_eq!(SETTINGS_LINES, 55);
        assert_eq!(lines[0], "Date:2024-05-01T12:00:00Z");
        assert_eq!(lines[1], "File format:.csv");
        assert_eq!(lines[3], "New file unit:min");
        assert_eq!(lines[7], "Instr1_Chan1:1");
        assert_eq!(lines[8], "Instr1_Chan1:Chan_1");
        assert_eq!(lines[9], "Instr1_Chan1:8");
        assert_eq!(lines[7 + 3 * 5 + 1], "Instr2_Chan2:probe: left");
        assert_eq!(lines[54], "Instr4_Chan4:0");
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.txt");
        let settings = sample();
        settings.save(&path, OffsetDateTime::UNIX_EPOCH).unwrap();
        assert_eq!(SessionSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn value_keeps_later_colons() {
        let text = sample().to_text(OffsetDateTime::UNIX_EPOCH).unwrap();
        let parsed = SessionSettings::parse(&text).unwrap();
        assert_eq!(parsed.channels[5].name, "probe: left");
    }

    #[test]
    fn short_file_is_rejected() {
        let text = sample().to_text(OffsetDateTime::UNIX_EPOCH).unwrap();
        let short = text.lines().take(20).collect::<Vec<_>>().join("\n");
        assert!(matches!(
            SessionSettings::parse(&short),
            Err(StreamError::ConfigParse { line: 20, .. })
        ));
    }

    #[test]
    fn malformed_lines_name_their_position() {
        let text = sample().to_text(OffsetDateTime::UNIX_EPOCH).unwrap();
        let mut lines = text.lines().map(str::to_string).collect::<Vec<_>>();
        lines[4] = "Sampling freq:fast".to_string();
        assert!(matches!(
            SessionSettings::parse(&lines.join("\n")),
            Err(StreamError::ConfigParse { line: 4, .. })
        ));

        let mut lines = text.lines().map(str::to_string).collect::<Vec<_>>();
        lines[10] = "Instr1_Chan2:yes".to_string();
        assert!(matches!(
            SessionSettings::parse(&lines.join("\n")),
            Err(StreamError::ConfigParse { line: 10, .. })
        ));

        let mut lines = text.lines().map(str::to_string).collect::<Vec<_>>();
        lines[3] = "New file unit:weeks".to_string();
        assert!(matches!(
            SessionSettings::parse(&lines.join("\n")),
            Err(StreamError::ConfigParse { line: 3, .. })
        ));
    }

    #[test]
    fn multi_line_name_is_refused() {
        let mut settings = sample();
        settings.channels[2].name = "a\nb".to_string();
        assert!(settings.to_text(OffsetDateTime::UNIX_EPOCH).is_err());
    }

    #[test]
    fn toml_defaults_and_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scope_stream.toml");
        fs::write(
            &path,
            "[output]\nformat = \"csv\"\nrotation_unit = \"s\"\nrotation_period = 2.0\n\n\
             [acquisition]\nchannels = [1, 3]\n\n[simulator]\nunits = 2\npace = 0.5\n",
        )
        .unwrap();
        let conf = Conf::builder().file(&path).load().unwrap();
        assert_eq!(conf.output.format, OutputFormat::Text);
        assert_eq!(
            conf.output.policy().unwrap().interval(),
            Some(Duration::from_secs(2))
        );
        assert_eq!(conf.acquisition.channels, vec![1, 3]);
        assert_eq!(conf.acquisition.record_length, 1000);
        assert_eq!(
            conf.acquisition.session_options().stop_timeout,
            Duration::from_secs(2)
        );
        assert_eq!(conf.logging.level, "info");
        assert_eq!((conf.simulator.units, conf.simulator.pace), (2, 0.5));
        assert_eq!(conf.simulator.overflow_after, None);
        assert_eq!(conf.output.base_path(), PathBuf::from(".").join("datastream"));
    }
}
