use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use toml;
use tracing::{debug, info};

use crate::mqtt::config::MqttConfig;

const CONFIG_ENV_VAR: &str = "JOYSTICK_FORWARDER_CONFIG";
const CONFIG_DIR: &str = "joystick-forwarder";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Everything the forwarder reads from its TOML file. Missing sections and
/// fields fall back to their defaults.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub forwarder: ForwarderConfig,
    pub mqtt: MqttConfig,
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    // Only the XInput backend addresses pads by index
    pub index: u32,
    // Joystick backend: device nodes probed in order
    pub device_paths: Vec<PathBuf>,
    pub max_events_per_tick: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            index: 0,
            device_paths: vec![PathBuf::from("/dev/input/js0")],
            max_events_per_tick: 64,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ForwarderConfig {
    pub poll_interval_ms: u64,
    pub pump_timeout_ms: u64,
    pub stats_interval_secs: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
            pump_timeout_ms: 1,
            stats_interval_secs: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

impl Config {
    /// `$JOYSTICK_FORWARDER_CONFIG`, else `<config dir>/joystick-forwarder/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return PathBuf::from(path);
        }
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    // A missing file is not an error
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("Reading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
