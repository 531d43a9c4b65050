//! The latest-reading value type reported by an Airnut 1S device.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Latest sensor values reported by a single Airnut 1S device.
///
/// A reading is immutable once constructed: each successful parse of a
/// device "post" record produces a complete replacement, never a partial
/// field update. Fields are optional because a device may be known to the
/// server (it has connected) before it has reported any values.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceReading {
    /// Temperature in degrees Celsius, rounded to one decimal place.
    pub temperature: Option<f64>,
    /// Relative humidity percentage, rounded to one decimal place.
    pub humidity: Option<f64>,
    /// PM2.5 concentration in µg/m³.
    pub pm25: Option<i64>,
    /// CO2 concentration in ppm.
    pub co2: Option<i64>,
    /// When this reading was parsed by the server.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_update: Option<time::OffsetDateTime>,
}

impl DeviceReading {
    /// Create a builder for constructing a `DeviceReading`.
    pub fn builder() -> DeviceReadingBuilder {
        DeviceReadingBuilder::default()
    }
}

/// Builder for constructing [`DeviceReading`] values.
#[derive(Debug, Default)]
#[must_use]
pub struct DeviceReadingBuilder {
    reading: DeviceReading,
}

impl DeviceReadingBuilder {
    /// Set the temperature in degrees Celsius.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.reading.temperature = Some(temperature);
        self
    }

    /// Set the relative humidity percentage.
    pub fn humidity(mut self, humidity: f64) -> Self {
        self.reading.humidity = Some(humidity);
        self
    }

    /// Set the PM2.5 concentration.
    pub fn pm25(mut self, pm25: i64) -> Self {
        self.reading.pm25 = Some(pm25);
        self
    }

    /// Set the CO2 concentration.
    pub fn co2(mut self, co2: i64) -> Self {
        self.reading.co2 = Some(co2);
        self
    }

    /// Set the parse timestamp.
    pub fn last_update(mut self, at: time::OffsetDateTime) -> Self {
        self.reading.last_update = Some(at);
        self
    }

    /// Build the `DeviceReading`.
    #[must_use]
    pub fn build(self) -> DeviceReading {
        self.reading
    }
}
