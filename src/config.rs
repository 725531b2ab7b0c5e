//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; a missing file section falls back
//! to the defaults below.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MonitorError, Result};
use crate::relay::Role;

/// Baud rates accepted for the serial device
pub const VALID_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub display: DisplayConfig,
    pub log: LogConfig,
    pub snapshot: SnapshotConfig,
    pub relay: RelayConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

/// Where telemetry is read from
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    /// Serial device
    #[default]
    Device,
    /// Recorded file
    Replay,
    /// Another instance's relay socket
    Relay,
}

/// Layout of a replay file
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplayFormat {
    /// Raw device capture
    #[default]
    Raw,
    /// Backup log written by this program
    Backup,
}

/// Input configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub source: InputSource,
    pub device: String,
    pub baud_rate: u32,
    pub replay_file: Option<PathBuf>,
    pub replay_format: ReplayFormat,
    pub relay_socket: PathBuf,
}

/// Terminal output configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub panel: bool,
    pub raw: bool,
    pub fahrenheit: bool,
}

/// File log configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub prefix: String,
    /// Unset means "only when owning the source"
    pub plot: Option<bool>,
    pub backup: bool,
}

/// Snapshot store configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

/// Relay publishing configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub publish: bool,
    pub socket: PathBuf,
}

/// Persistent state configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StateConfig {
    pub event_file: PathBuf,
}

/// Diagnostics configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Also write diagnostics to a daily file here
    pub directory: Option<PathBuf>,
}

// Default value functions
fn default_device() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 19200 }
fn default_socket() -> PathBuf { PathBuf::from("/tmp/vedirect-mon.sock") }

fn default_panel() -> bool { true }

fn default_log_dir() -> PathBuf { PathBuf::from("./logs") }
fn default_log_prefix() -> String { "vedirect".to_string() }

fn default_snapshot_dir() -> PathBuf { PathBuf::from("./snapshot") }

fn default_event_file() -> PathBuf { PathBuf::from("./state/event-start") }

fn default_log_level() -> String { "info".to_string() }

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: InputSource::default(),
            device: default_device(),
            baud_rate: default_baud_rate(),
            replay_file: None,
            replay_format: ReplayFormat::default(),
            relay_socket: default_socket(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            panel: default_panel(),
            raw: false,
            fahrenheit: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            prefix: default_log_prefix(),
            plot: None,
            backup: false,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_snapshot_dir(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            publish: false,
            socket: default_socket(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            event_file: default_event_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vedirect_mon::config::Config;
    ///
    /// let config = Config::load("config/vedirect-mon.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Role implied by the input source
    pub fn role(&self) -> Role {
        Role::for_source(self.input.source)
    }

    /// Whether the plot log is written
    pub fn plot_enabled(&self) -> bool {
        self.log.plot.unwrap_or_else(|| self.role().plots_by_default())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        match self.input.source {
            InputSource::Device => {
                if self.input.device.is_empty() {
                    return Err(invalid("input device cannot be empty"));
                }
                if !VALID_BAUD_RATES.contains(&self.input.baud_rate) {
                    return Err(invalid(format!(
                        "baud_rate must be one of: {:?}",
                        VALID_BAUD_RATES
                    )));
                }
            }
            InputSource::Replay => {
                if self.input.replay_file.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
                    return Err(invalid("replay_file is required when source = \"replay\""));
                }
            }
            InputSource::Relay => {
                if self.input.relay_socket.as_os_str().is_empty() {
                    return Err(invalid("relay_socket cannot be empty"));
                }
                if self.relay.publish {
                    return Err(invalid("a relay subscriber cannot also publish"));
                }
            }
        }

        if self.relay.publish && self.relay.socket.as_os_str().is_empty() {
            return Err(invalid("relay socket cannot be empty when publishing"));
        }

        let writes_logs = self.plot_enabled() || self.log.backup;
        if writes_logs && self.log.dir.as_os_str().is_empty() {
            return Err(invalid("log dir cannot be empty when plot or backup logging is enabled"));
        }
        if writes_logs && self.log.prefix.is_empty() {
            return Err(invalid("log prefix cannot be empty"));
        }

        if self.snapshot.enabled && self.snapshot.dir.as_os_str().is_empty() {
            return Err(invalid("snapshot dir cannot be empty when enabled"));
        }

        if self.role() == Role::SourceOwner && self.state.event_file.as_os_str().is_empty() {
            return Err(invalid("state event_file cannot be empty"));
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> MonitorError {
    MonitorError::Config(toml::de::Error::custom(msg))
}
