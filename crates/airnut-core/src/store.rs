//! In-memory store of the latest reading per device.

use std::collections::HashMap;

use tokio::sync::RwLock;

use airnut_types::DeviceReading;

/// Latest-reading store keyed by device identifier (the connection's source
/// IP address).
///
/// Each successful data post replaces the device's entry wholesale; there is
/// no per-field mutation. Entries persist until [`clear`](Self::clear) at
/// server stop — a device that disconnects keeps its last reading visible.
#[derive(Debug, Default)]
pub struct ReadingStore {
    readings: RwLock<HashMap<String, DeviceReading>>,
}

impl ReadingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the reading for a device.
    pub async fn insert(&self, device_ip: &str, reading: DeviceReading) {
        self.readings
            .write()
            .await
            .insert(device_ip.to_string(), reading);
    }

    /// Get the latest reading for a device, if it has ever reported.
    pub async fn get(&self, device_ip: &str) -> Option<DeviceReading> {
        self.readings.read().await.get(device_ip).cloned()
    }

    /// Snapshot of all known readings.
    pub async fn all(&self) -> Vec<(String, DeviceReading)> {
        self.readings
            .read()
            .await
            .iter()
            .map(|(ip, reading)| (ip.clone(), reading.clone()))
            .collect()
    }

    /// Number of devices that have reported at least once.
    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    /// Whether no device has reported yet.
    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }

    /// Remove all readings (called at server stop).
    pub async fn clear(&self) {
        self.readings.write().await.clear();
    }
}
