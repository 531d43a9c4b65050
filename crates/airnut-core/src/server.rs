//! The device-facing socket server.
//!
//! One long-lived TCP listener accepts inbound Airnut connections and hands
//! each to its own [`crate::connection::ConnectionHandler`] task. The server
//! object is explicitly constructed and owned by the host — there is no
//! process-wide singleton — but `start()`/`stop()` are idempotent and safe
//! to call redundantly from host lifecycle hooks, serialized by a single
//! lifecycle mutex held across the whole transition.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use airnut_types::DeviceReading;

use crate::codec::Command;
use crate::config::ServerConfig;
use crate::connection::ConnectionHandler;
use crate::error::{Error, Result};
use crate::night::NightWindow;
use crate::registry::ConnectionRegistry;
use crate::store::ReadingStore;

/// Listen backlog for the device socket.
const LISTEN_BACKLOG: u32 = 1024;

/// State that exists only while the server is running.
struct ListenerState {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tracker: TaskTracker,
    accept_task: JoinHandle<()>,
}

/// Socket server for Airnut 1S devices.
///
/// Construct once with [`AirnutServer::new`], share as an `Arc`, and drive
/// through [`start`](Self::start) / [`stop`](Self::stop). Readings are
/// looked up with [`reading_for`](Self::reading_for); the host calls
/// [`update_device_data`](Self::update_device_data) before each lookup to
/// let the scheduling policy decide whether a refresh broadcast is due.
pub struct AirnutServer {
    config: ServerConfig,
    night: NightWindow,
    registry: Arc<ConnectionRegistry>,
    store: Arc<ReadingStore>,
    /// `Some` while running. Held across the whole start/stop transition.
    lifecycle: Mutex<Option<ListenerState>>,
    /// Time of the last executed broadcast. Held across the broadcast to
    /// serialize concurrent `update_device_data` calls.
    last_scan: Mutex<Option<OffsetDateTime>>,
}

impl AirnutServer {
    /// Create a server from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration fails
    /// [`ServerConfig::validate`].
    pub fn new(config: ServerConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let night = config.night_window();
        Ok(Arc::new(Self {
            config,
            night,
            registry: Arc::new(ConnectionRegistry::new()),
            store: Arc::new(ReadingStore::new()),
            lifecycle: Mutex::new(None),
            last_scan: Mutex::new(None),
        }))
    }

    /// Start listening for device connections.
    ///
    /// Idempotent: if the server is already running this logs and returns
    /// immediately. The listening socket is created with address (and, on
    /// Unix, port) reuse enabled so a just-stopped instance's lingering
    /// socket does not block rebinding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the listening socket cannot be acquired;
    /// the partially-created socket is released before the error propagates
    /// and no retry is attempted here.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            info!("socket server is already running, skipping start");
            return Ok(());
        }

        let addr = self.config.bind_addr()?;
        let listener = bind_listener(addr)?;
        let local_addr = listener.local_addr().map_err(|source| Error::Bind {
            addr,
            source,
        })?;

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            cancel.clone(),
            tracker.clone(),
            self.config.idle_timeout(),
        ));

        *lifecycle = Some(ListenerState {
            local_addr,
            cancel,
            tracker,
            accept_task,
        });
        info!(
            "Airnut socket server started on {} (port reuse enabled)",
            local_addr
        );
        Ok(())
    }

    /// Stop the server, close every live connection, and clear all state.
    ///
    /// Idempotent: a stop on an already-stopped server logs and returns.
    /// The bound port is fully released before this returns, so a
    /// subsequent [`start`](Self::start) can rebind immediately.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(state) = lifecycle.take() else {
            info!("socket server is not running, skipping stop");
            return;
        };

        // Stop accepting first; the listener is dropped inside the accept
        // task, releasing the port.
        state.cancel.cancel();
        if let Err(e) = state.accept_task.await {
            warn!("accept loop ended abnormally: {}", e);
        }

        // Connection tasks observe the cancellation and unwind through
        // their own teardown.
        state.tracker.close();
        state.tracker.wait().await;

        // Anything still registered gets a best-effort forced close.
        let leftovers = self.registry.drain().await;
        let closes = leftovers.iter().map(|entry| async {
            let mut writer = entry.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                warn!(
                    "failed to close connection to {}: {}",
                    entry.device_ip, e
                );
            }
        });
        join_all(closes).await;

        self.store.clear().await;
        info!("Airnut socket server stopped (port released)");
    }

    /// Decide whether a refresh broadcast is due and perform it.
    ///
    /// Called by the host before it reads a sensor value. Three outcomes:
    ///
    /// 1. Less than `scan_interval` since the last broadcast — silently
    ///    rate-limited, not an error.
    /// 2. Night suppression active and the local time is inside the night
    ///    window — skipped at debug level. The scan clock is *not*
    ///    advanced, so the next call re-evaluates the window.
    /// 3. Otherwise the scan clock advances and a `get` command goes to
    ///    every live connection; an unreachable connection is evicted and
    ///    the broadcast continues for the rest.
    pub async fn update_device_data(&self) {
        let mut last_scan = self.last_scan.lock().await;
        let now = OffsetDateTime::now_utc();

        if let Some(last) = *last_scan {
            let min_gap = time::Duration::seconds(
                i64::try_from(self.config.scan_interval).unwrap_or(i64::MAX),
            );
            if now - last < min_gap {
                return;
            }
        }

        if !self.config.night_update && self.night.contains(local_time_of_day()) {
            debug!("skipping device update (night window)");
            return;
        }

        *last_scan = Some(now);
        self.broadcast_get().await;
    }

    /// Send a `get` command to every registered connection.
    ///
    /// Per-connection send failures are logged and that connection is
    /// evicted from the registry; the loop continues for the rest.
    async fn broadcast_get(&self) {
        let get = Command::Get.encode();
        for (peer, entry) in self.registry.entries().await {
            let sent = {
                let mut writer = entry.writer.lock().await;
                match writer.write_all(&get).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                }
            };
            if let Err(e) = sent {
                warn!(
                    "failed to send get command to {}: {}",
                    entry.device_ip, e
                );
                self.registry.remove(peer).await;
            }
        }
    }

    /// Latest reading for a device, if it has ever reported.
    ///
    /// Pure lookup, no side effects.
    pub async fn reading_for(&self, device_ip: &str) -> Option<DeviceReading> {
        self.store.get(device_ip).await
    }

    /// Snapshot of all known readings.
    pub async fn readings(&self) -> Vec<(String, DeviceReading)> {
        self.store.all().await
    }

    /// Number of live device connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Whether the server is currently running.
    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.is_some()
    }

    /// The bound listen address while running.
    ///
    /// Useful when binding port 0 (ephemeral) in tests.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.lock().await.as_ref().map(|s| s.local_addr)
    }

    /// Time of the last executed broadcast.
    pub async fn last_scan_at(&self) -> Option<OffsetDateTime> {
        *self.last_scan.lock().await
    }

    /// The configuration this server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Bind the listening socket with address/port reuse enabled.
fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let bind_err = |source: std::io::Error| Error::Bind { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    #[cfg(unix)]
    socket.set_reuseport(true).map_err(bind_err)?;

    socket.bind(addr).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)
}

/// Accept inbound device connections until cancelled.
///
/// The listener is owned here; when the loop exits the socket is dropped
/// and the port released.
async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    store: Arc<ReadingStore>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    idle_timeout: Option<std::time::Duration>,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("accept loop cancelled");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let device_ip = peer.ip().to_string();
                let (reader, writer) = stream.into_split();
                let writer = Arc::new(Mutex::new(writer));
                registry
                    .register(peer, device_ip.clone(), Arc::clone(&writer))
                    .await;

                let handler = ConnectionHandler::new(
                    peer,
                    device_ip,
                    reader,
                    writer,
                    Arc::clone(&registry),
                    Arc::clone(&store),
                    cancel.child_token(),
                    idle_timeout,
                );
                tracker.spawn(handler.run());
            }
            Err(e) => {
                // One failed accept must not take the listener down.
                warn!("failed to accept connection: {}", e);
            }
        }
    }
}

/// Current local time of day, falling back to UTC when the local offset
/// cannot be determined (e.g. multi-threaded restrictions on some platforms).
fn local_time_of_day() -> time::Time {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .time()
}
