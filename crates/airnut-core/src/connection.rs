//! Per-connection lifecycle for one Airnut device.
//!
//! Each accepted connection runs as its own task: handshake, read loop,
//! teardown. A failure here affects exactly one device — parse errors drop
//! the record, I/O errors end the task, and teardown always deregisters and
//! closes the transport regardless of which path got us there.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{Command, DeviceMessage, FrameAccumulator, login_ack, parse_record};
use crate::config::SOCKET_BUFFER_SIZE;
use crate::error::Result;
use crate::registry::{ConnectionRegistry, SharedWriter};
use crate::store::ReadingStore;

/// Handler for a single device connection.
///
/// Owns the read half; the write half lives in the [`ConnectionRegistry`]
/// so the polling façade can broadcast to it.
pub(crate) struct ConnectionHandler {
    peer: SocketAddr,
    device_ip: String,
    reader: OwnedReadHalf,
    writer: SharedWriter,
    registry: Arc<ConnectionRegistry>,
    store: Arc<ReadingStore>,
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
}

impl ConnectionHandler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        peer: SocketAddr,
        device_ip: String,
        reader: OwnedReadHalf,
        writer: SharedWriter,
        registry: Arc<ConnectionRegistry>,
        store: Arc<ReadingStore>,
        cancel: CancellationToken,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            peer,
            device_ip,
            reader,
            writer,
            registry,
            store,
            cancel,
            idle_timeout,
        }
    }

    /// Run the connection to completion. Teardown is unconditional.
    pub(crate) async fn run(mut self) {
        info!("Airnut device connected: {}", self.device_ip);

        match self.handshake().await {
            Ok(()) => {
                if let Err(e) = self.stream().await {
                    warn!("error handling device {}: {}", self.device_ip, e);
                }
            }
            Err(e) => warn!(
                "failed to send initial commands to {}: {}",
                self.device_ip, e
            ),
        }

        self.teardown().await;
    }

    /// Send the two initial commands: mute the speaker, then ask for data.
    async fn handshake(&self) -> Result<()> {
        self.send(&Command::SetVolume { volume: 0 }.encode()).await?;
        self.send(&Command::Get.encode()).await
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read loop: chunks feed the frame accumulator, records dispatch.
    async fn stream(&mut self) -> Result<()> {
        let mut buf = [0u8; SOCKET_BUFFER_SIZE];
        let mut frames = FrameAccumulator::new();

        loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("connection to {} cancelled", self.device_ip);
                    return Ok(());
                }
                read = read_chunk(&mut self.reader, &mut buf, self.idle_timeout) => read,
            };

            let n = match read? {
                Some(0) => {
                    debug!("device {} closed the connection", self.device_ip);
                    return Ok(());
                }
                Some(n) => n,
                None => {
                    info!(
                        "closing idle connection to {} (no data within {:?})",
                        self.device_ip, self.idle_timeout
                    );
                    return Ok(());
                }
            };

            for record in frames.push(&buf[..n]) {
                self.dispatch(&record).await?;
            }
        }
    }

    /// Handle one parsed record. Parse failures are logged and swallowed;
    /// only reply I/O errors propagate (and close this connection).
    async fn dispatch(&self, record: &str) -> Result<()> {
        match parse_record(record) {
            Ok(DeviceMessage::Login) => {
                debug!("login request from {}", self.device_ip);
                self.send(&login_ack()).await
            }
            Ok(DeviceMessage::Post(reading)) => {
                debug!("updated data for {}: {:?}", self.device_ip, reading);
                self.store.insert(&self.device_ip, reading).await;
                Ok(())
            }
            Ok(DeviceMessage::Other) => Ok(()),
            Err(e) => {
                warn!("invalid record from {}: {}", self.device_ip, e);
                Ok(())
            }
        }
    }

    /// Deregister (idempotent) and close the transport.
    async fn teardown(self) {
        if self.registry.remove(self.peer).await.is_none() {
            // Already removed by a server-wide stop; nothing left to do.
            debug!("connection {} was already deregistered", self.peer);
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("error closing transport to {}: {}", self.device_ip, e);
        }
        info!("Airnut device disconnected: {}", self.device_ip);
    }
}

/// Read one chunk, bounded by the optional idle deadline.
///
/// Returns `Ok(None)` when the deadline elapsed without any bytes.
async fn read_chunk(
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> Result<Option<usize>> {
    match idle_timeout {
        Some(deadline) => match tokio::time::timeout(deadline, reader.read(buf)).await {
            Ok(read) => Ok(Some(read?)),
            Err(_) => Ok(None),
        },
        None => Ok(Some(reader.read(buf).await?)),
    }
}
