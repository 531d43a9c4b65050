//! Service configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use airnut_core::ServerConfig;

/// Default seconds between host polls of the server's scheduling façade.
pub const DEFAULT_POLL_INTERVAL: u64 = 30;

/// Top-level service configuration.
///
/// An empty file (or no file at all) yields the stock defaults: listener on
/// `0.0.0.0:10511`, 600 second scan interval, night window 23:00–06:00.
///
/// ```toml
/// [server]
/// bind = "0.0.0.0:10511"
/// scan_interval = 600
/// night_start = "23:00"
/// night_end = "06:00"
/// night_update = false
///
/// [host]
/// poll_interval = 30
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Socket server settings.
    pub server: ServerConfig,
    /// Host polling settings.
    pub host: HostConfig,
}

/// Settings for the host-side polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Seconds between calls to the server's scheduling façade. This is the
    /// host's own cadence; whether a broadcast actually happens is decided
    /// by the server's scan interval and night window.
    pub poll_interval: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file was not valid TOML.
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
