//! Platform-agnostic types for Airnut indoor air-quality sensors.
//!
//! This crate contains the value types shared between the socket server in
//! `airnut-core` and any host application that consumes sensor readings.
//! It deliberately knows nothing about sockets or the wire protocol: a
//! [`DeviceReading`] is what remains after a device report has been parsed
//! and normalized.
//!
//! # Quick Start
//!
//! ```
//! use airnut_types::DeviceReading;
//!
//! let reading = DeviceReading::builder()
//!     .temperature(23.5)
//!     .humidity(55.0)
//!     .pm25(12)
//!     .co2(450)
//!     .build();
//!
//! assert_eq!(reading.co2, Some(450));
//! ```

pub mod error;
pub mod reading;

pub use error::{ParseError, ParseResult};
pub use reading::{DeviceReading, DeviceReadingBuilder};
