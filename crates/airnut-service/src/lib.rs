//! Host adapter for the Airnut 1S socket server.
//!
//! This crate is deliberately thin: it owns the one [`airnut_core::AirnutServer`]
//! instance for the process lifetime, loads configuration from a TOML file,
//! and polls [`airnut_core::AirnutServer::update_device_data`] on a fixed
//! cadence the way a host platform's entity layer would before reading a
//! sensor value. All protocol and state-machine content lives in
//! `airnut-core`.

pub mod config;

pub use config::{Config, ConfigError, HostConfig};
