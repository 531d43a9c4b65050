//! Socket server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::night::NightWindow;

/// Default listen address for inbound device connections.
pub const DEFAULT_BIND: &str = "0.0.0.0:10511";

/// Default minimum spacing between data broadcasts, in seconds.
pub const DEFAULT_SCAN_INTERVAL: u64 = 600;

/// Default quiet window start as configured (HH:MM).
pub const DEFAULT_NIGHT_START: &str = "23:00";

/// Default quiet window end as configured (HH:MM).
pub const DEFAULT_NIGHT_END: &str = "06:00";

/// Bytes read from a device socket per read call.
pub const SOCKET_BUFFER_SIZE: usize = 1024;

/// Configuration for [`crate::AirnutServer`].
///
/// All fields have defaults matching the stock Airnut 1S integration, so a
/// `ServerConfig::default()` (or an empty TOML table) yields a working
/// server on port 10511.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub bind: String,
    /// Minimum seconds between data broadcasts.
    pub scan_interval: u64,
    /// Quiet window start, `HH:MM`.
    pub night_start: String,
    /// Quiet window end, `HH:MM`.
    pub night_end: String,
    /// When `true`, broadcasts continue through the night window
    /// (i.e. suppression is disabled — the sense is inverted).
    pub night_update: bool,
    /// Close a connection after this many seconds without inbound data.
    /// `None` keeps idle connections open indefinitely.
    pub idle_timeout: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            night_start: DEFAULT_NIGHT_START.to_string(),
            night_end: DEFAULT_NIGHT_END.to_string(),
            night_update: false,
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Validate the configuration.
    ///
    /// Checks the bind address parses and intervals are at least one
    /// second. Night window strings are not rejected here; malformed values
    /// fall back at runtime with a warning (see [`NightWindow::parse`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        if self.scan_interval == 0 {
            return Err(Error::invalid_config("scan_interval must be >= 1 second"));
        }
        if self.idle_timeout == Some(0) {
            return Err(Error::invalid_config(
                "idle_timeout must be >= 1 second when set",
            ));
        }
        Ok(())
    }

    /// The parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `bind` is not `host:port`.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind.parse().map_err(|_| {
            Error::invalid_config(format!(
                "invalid bind address '{}': expected 'host:port'",
                self.bind
            ))
        })
    }

    /// Minimum spacing between broadcasts.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    /// Idle deadline per connection, if enabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout.map(Duration::from_secs)
    }

    /// The night window parsed from the configured strings.
    pub fn night_window(&self) -> NightWindow {
        NightWindow::parse(&self.night_start, &self.night_end)
    }
}
