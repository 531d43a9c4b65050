//! Error types for airnut-core.
//!
//! The propagation policy mirrors the server's failure model: nothing a
//! single device does escalates past its own connection task. Malformed
//! records surface as [`airnut_types::ParseError`] and are dropped where
//! they occur; per-connection I/O errors terminate only that connection.
//! The only error a caller of [`crate::AirnutServer::start`] must handle is
//! [`Error::Bind`], which is fatal to startup and not retried internally.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur while running the Airnut socket server.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The listening socket could not be acquired.
    ///
    /// Fatal to startup; the partially-created socket is released before
    /// this propagates. The caller decides whether to retry.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        /// The address the server attempted to bind.
        addr: SocketAddr,
        /// The underlying socket error.
        source: std::io::Error,
    },

    /// I/O error on a single connection.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A device record failed to parse.
    #[error(transparent)]
    Parse(#[from] airnut_types::ParseError),

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using airnut-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
