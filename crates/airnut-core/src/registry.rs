//! Registry of live device connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};

/// Shared handle to a connection's write half.
///
/// Stored behind a mutex so the polling façade can broadcast to a connection
/// whose handler task owns the read half.
pub type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// One live connection.
#[derive(Clone)]
pub struct ConnectionEntry {
    /// Device identifier (the connection's source IP address).
    pub device_ip: String,
    /// Writer for outbound commands.
    pub writer: SharedWriter,
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("device_ip", &self.device_ip)
            .finish_non_exhaustive()
    }
}

/// Map from connection handle (peer address) to its entry.
///
/// Entries are added at accept time and removed exactly once at teardown;
/// [`remove`](Self::remove) of an absent handle is a tolerated no-op, which
/// guards the race between a handler's own cleanup and a server-wide stop.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<SocketAddr, ConnectionEntry>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection.
    pub async fn register(&self, peer: SocketAddr, device_ip: String, writer: SharedWriter) {
        self.connections
            .write()
            .await
            .insert(peer, ConnectionEntry { device_ip, writer });
    }

    /// Remove a connection, returning its entry if it was still registered.
    pub async fn remove(&self, peer: SocketAddr) -> Option<ConnectionEntry> {
        self.connections.write().await.remove(&peer)
    }

    /// Snapshot of all live connections.
    pub async fn entries(&self) -> Vec<(SocketAddr, ConnectionEntry)> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(peer, entry)| (*peer, entry.clone()))
            .collect()
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no connections are registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Remove and return every entry (used at server stop).
    pub async fn drain(&self) -> Vec<ConnectionEntry> {
        self.connections.write().await.drain().map(|(_, e)| e).collect()
    }
}
