//! Bridge configuration
//!
//! Read once at startup from a TOML file and consumed read-only by the bridge.
//! A missing file falls back to defaults so the bridge is usable without any
//! setup; a file that exists but does not parse or validate is an error.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud = 115200
//! wire_format = "text"
//!
//! [axes]
//! deadzone = 1
//! invert = [false, false, false, false, false, false, false, true]
//!
//! [[switches]]
//! on_key = "g"
//! off_key = "g"
//! ```

use crate::signal::{AxisConfig, SwitchFilterSettings};
use crate::telemetry::{WireFormat, POT_COUNT, SWITCH_COUNT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = ".config/potbridge";
const CONFIG_FILE: &str = "config.toml";

/// Errors while reading or validating the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serial link settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
    /// Upper bound of one blocking read, also the cancellation latency
    pub read_timeout_ms: u64,
    pub wire_format: WireFormat,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud: 115_200,
            read_timeout_ms: 100,
            wire_format: WireFormat::Text,
        }
    }
}

fn default_port() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else {
        "/dev/ttyACM0"
    }
}

/// Virtual joystick target
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct JoystickConfig {
    pub device_id: u32,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self { device_id: 1 }
    }
}

/// Keys tapped when a switch settles in a new state
///
/// An empty name disables the tap for that direction.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SwitchKeys {
    pub on_key: String,
    pub off_key: String,
}

impl SwitchKeys {
    pub fn same(key: &str) -> Self {
        Self {
            on_key: key.to_string(),
            off_key: key.to_string(),
        }
    }

    /// Key for the given stable state, `None` if disabled
    pub fn key_for(&self, on: bool) -> Option<&str> {
        let key = if on { &self.on_key } else { &self.off_key };
        (!key.is_empty()).then_some(key.as_str())
    }
}

/// Switch filter tuning shared by both switches
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SwitchFilterConfig {
    pub window: usize,
    pub off_threshold: u8,
    pub on_threshold: u8,
    pub debounce_ms: u64,
    pub sticky_ms: u64,
}

impl Default for SwitchFilterConfig {
    fn default() -> Self {
        let defaults = SwitchFilterSettings::default();
        Self {
            window: defaults.window,
            off_threshold: defaults.off_threshold,
            on_threshold: defaults.on_threshold,
            debounce_ms: defaults.debounce.as_millis() as u64,
            sticky_ms: defaults.sticky.as_millis() as u64,
        }
    }
}

/// Axis calibration applied to all eight pots
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct AxesConfig {
    pub deadzone: u8,
    pub smoothing: usize,
    pub invert: [bool; POT_COUNT],
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            deadzone: 1,
            smoothing: 0,
            invert: [false; POT_COUNT],
        }
    }
}

/// Watchdog and publication intervals
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Silence after which outputs are forced to neutral
    pub idle_timeout_ms: u64,
    /// Minimum spacing of "no data" warnings while idle
    pub idle_warn_interval_ms: u64,
    /// Minimum spacing of observer snapshots (~33 Hz)
    pub observer_interval_ms: u64,
    /// How long a stop request waits for the worker
    pub stop_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 1000,
            idle_warn_interval_ms: 2000,
            observer_interval_ms: 30,
            stop_timeout_ms: 2500,
        }
    }
}

impl TimingConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn idle_warn_interval(&self) -> Duration {
        Duration::from_millis(self.idle_warn_interval_ms)
    }

    pub fn observer_interval(&self) -> Duration {
        Duration::from_millis(self.observer_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Complete configuration of one bridge run
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    pub joystick: JoystickConfig,
    pub switches: [SwitchKeys; SWITCH_COUNT],
    pub switch_filter: SwitchFilterConfig,
    pub axes: AxesConfig,
    pub timing: TimingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            joystick: JoystickConfig::default(),
            switches: [SwitchKeys::same("g"), SwitchKeys::same("r")],
            switch_filter: SwitchFilterConfig::default(),
            axes: AxesConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// `~/.config/potbridge/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Reads and validates a config file
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Like [`BridgeConfig::load`], but a missing file yields the defaults
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if exists {
            Self::load(path).await
        } else {
            info!(
                "No configuration at {}, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Invalid("serial.port must not be empty".to_string()));
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("serial.baud must be positive".to_string()));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "serial.read_timeout_ms must be positive".to_string(),
            ));
        }
        if self.switch_filter.window == 0 {
            return Err(ConfigError::Invalid(
                "switch_filter.window must be at least 1".to_string(),
            ));
        }
        if self.switch_filter.off_threshold >= self.switch_filter.on_threshold {
            return Err(ConfigError::Invalid(format!(
                "switch_filter.off_threshold ({}) must be below on_threshold ({})",
                self.switch_filter.off_threshold, self.switch_filter.on_threshold
            )));
        }
        if self.timing.idle_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing.idle_timeout_ms must be positive".to_string(),
            ));
        }
        if self.timing.idle_timeout_ms < self.serial.read_timeout_ms {
            warn!(
                "Idle timeout {}ms is shorter than the read timeout {}ms",
                self.timing.idle_timeout_ms, self.serial.read_timeout_ms
            );
        }
        Ok(())
    }

    /// Per-axis mapper configuration in axis order
    pub fn axis_configs(&self) -> [AxisConfig; POT_COUNT] {
        self.axes.invert.map(|invert| AxisConfig {
            deadzone: self.axes.deadzone,
            invert,
            smoothing: self.axes.smoothing,
        })
    }

    pub fn filter_settings(&self) -> SwitchFilterSettings {
        SwitchFilterSettings {
            window: self.switch_filter.window,
            off_threshold: self.switch_filter.off_threshold,
            on_threshold: self.switch_filter.on_threshold,
            debounce: Duration::from_millis(self.switch_filter.debounce_ms),
            sticky: Duration::from_millis(self.switch_filter.sticky_ms),
        }
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
