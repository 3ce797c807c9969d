mod link;
mod serial;
mod tcp_client;
mod tcp_server;

pub use link::{ConnectGuard, Link, PeerLoss};
pub use serial::{SerialPortConfig, SerialTransport};
pub use tcp_client::TcpClientTransport;
pub use tcp_server::TcpServerTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use domain::{ConnectionState, DeviceError, TransportKind};
use tokio::sync::mpsc;

/// Pause after a failed open before the outcome is announced
pub const OPEN_FAILURE_BACKOFF: Duration = Duration::from_millis(500);

/// Notifications published by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One chunk as delivered by the OS: part of a frame, or several frames
    MessageReceived(Bytes),
    /// Fired on every open outcome and on every link loss
    ConnectionChanged(bool),
}

/// Raw byte pipe with a background receive loop.
///
/// Implementations only provide how to build and connect their handle; the
/// provided methods carry the open/close protocol shared by all of them.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn link(&self) -> &Arc<Link>;

    /// Build a fresh handle from the connection parameters
    async fn prepare(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// One raw connect attempt; attaches the stream on success
    async fn connect(&self) -> Result<(), DeviceError>;

    /// Release transport specific resources (listeners, accept tasks)
    async fn release(&self) {}

    /// Tear down the current handle and prepare a new one. Safe to repeat.
    async fn initialize(&self) -> Result<(), DeviceError> {
        let link = self.link();
        link.detach().await;
        self.release().await;
        link.set_state(ConnectionState::Disconnected);
        self.prepare().await
    }

    /// Single connect attempt. Always announces the outcome through
    /// `ConnectionChanged`, after the failure backoff when it failed.
    async fn open(&self) -> bool {
        let link = self.link();
        if link.is_closed() {
            return false;
        }
        let Some(guard) = link.begin_connect() else {
            tracing::debug!(link = %link.name(), "Open already in progress");
            return false;
        };

        let connected = match self.connect().await {
            Ok(()) => {
                tracing::info!(link = %link.name(), "Link open");
                true
            }
            Err(_) if link.is_closed() => false,
            Err(e) => {
                tracing::warn!(link = %link.name(), error = %e, "Open failed");
                tokio::time::sleep(OPEN_FAILURE_BACKOFF).await;
                false
            }
        };

        // Release before announcing so a listener can start the next attempt.
        drop(guard);
        link.finish_open(connected).await
    }

    /// Write bytes. Callers must serialize; a failure takes the link down.
    async fn send(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.link().send(bytes).await
    }

    /// Release the handle for good. No reconnect happens afterwards.
    async fn close(&self) {
        let link = self.link();
        link.mark_closed();
        let was_connected = link.is_connected();
        link.detach().await;
        self.release().await;
        link.set_state(ConnectionState::Disconnected);
        if was_connected {
            link.emit(TransportEvent::ConnectionChanged(false));
        }
        tracing::info!(link = %link.name(), "Link closed");
    }

    fn is_connected(&self) -> bool {
        self.link().is_connected()
    }

    fn state(&self) -> ConnectionState {
        self.link().state()
    }

    fn is_closed(&self) -> bool {
        self.link().is_closed()
    }

    /// The transport's event stream; handed out once
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.link().take_events()
    }
}
