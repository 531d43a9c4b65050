//! TCP socket server for Airnut 1S indoor air-quality sensors.
//!
//! Airnut 1S devices connect *outward* to a fixed TCP listener (default
//! `0.0.0.0:10511`) and speak a line-delimited JSON protocol. This crate
//! provides that listener: it performs the small command handshake each
//! device expects, parses inbound records, keeps the latest reading per
//! device, and issues periodic "get data" commands throttled by a scan
//! interval and an optional night-time quiet window.
//!
//! # Architecture
//!
//! - [`codec`] — outbound command envelopes, inbound record parsing, and
//!   the cross-read frame accumulator.
//! - [`store`] — latest reading per device IP, replaced wholesale on each
//!   successful parse.
//! - [`registry`] — live connections and their shared write halves.
//! - [`server`] — listener lifecycle, accept loop, and the polling façade
//!   the host calls before reading a value.
//!
//! # Quick Start
//!
//! ```no_run
//! use airnut_core::{AirnutServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = AirnutServer::new(ServerConfig::default())?;
//!     server.start().await?;
//!
//!     // ... host polls on its own cadence ...
//!     server.update_device_data().await;
//!     if let Some(reading) = server.reading_for("192.168.1.23").await {
//!         println!("CO2: {:?} ppm", reading.co2);
//!     }
//!
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod night;
pub mod registry;
pub mod server;
pub mod store;

pub use codec::{Command, DeviceMessage, FrameAccumulator};
pub use config::{DEFAULT_BIND, DEFAULT_SCAN_INTERVAL, ServerConfig};
pub use error::{Error, Result};
pub use night::NightWindow;
pub use registry::ConnectionRegistry;
pub use server::AirnutServer;
pub use store::ReadingStore;

// Re-export the shared value types for downstream convenience.
pub use airnut_types::{DeviceReading, ParseError};
