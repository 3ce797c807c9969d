use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use domain::{DeviceConfig, DeviceError, TransportKind};
use tokio::net::TcpSocket;
use tokio::task::JoinHandle;

use super::{Link, PeerLoss, Transport};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// TCP server transport. Serves a single peer at a time; a new peer
/// replaces the current one. Connected means "listening".
pub struct TcpServerTransport {
    bind_address: String,
    link: Arc<Link>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TcpServerTransport {
    pub fn new(bind_address: impl Into<String>) -> Self {
        let bind_address = bind_address.into();
        let link = Link::new(format!("listen:{}", bind_address), PeerLoss::KeepListening);
        Self {
            bind_address,
            link,
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    pub fn from_device(config: &DeviceConfig) -> Self {
        Self::new(config.socket_address())
    }

    /// Bound address while listening (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn has_peer(&self) -> bool {
        self.link.has_peer().await
    }

    /// The bind address must be a literal `ip:port`; hostnames are rejected
    pub fn validate(&self) -> Result<(), DeviceError> {
        self.bind_addr().map(|_| ())
    }

    fn bind_addr(&self) -> Result<SocketAddr, DeviceError> {
        self.bind_address.parse().map_err(|e| {
            DeviceError::InvalidConfiguration(format!(
                "Invalid bind address {}: {}",
                self.bind_address, e
            ))
        })
    }
}

#[async_trait]
impl Transport for TcpServerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::TcpServer
    }

    fn link(&self) -> &Arc<Link> {
        &self.link
    }

    async fn prepare(&self) -> Result<(), DeviceError> {
        self.validate()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        let addr = self.bind_addr()?;
        let bind_error =
            |e: std::io::Error| DeviceError::Transport(format!("Failed to bind {}: {}", addr, e));

        let socket = if addr.is_ipv6() {
            TcpSocket::new_v6()
        } else {
            TcpSocket::new_v4()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(16).map_err(bind_error)?;
        let local = listener.local_addr().map_err(bind_error)?;

        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(local);
        tracing::info!(address = %local, "Listening for device");

        let link = Arc::clone(&self.link);
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::info!(link = %link.name(), peer = %peer, "Device attached");
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(error = %e, "Unable to disable Nagle");
                        }
                        link.attach(stream).await;
                    }
                    Err(e) => {
                        tracing::warn!(link = %link.name(), error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                }
            }
        });

        if let Some(previous) = self
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            previous.abort();
        }

        // A close that ran while binding found no accept task to stop.
        if self.link.is_closed() {
            self.release().await;
            return Err(DeviceError::Transport("link closed while opening".into()));
        }
        Ok(())
    }

    async fn release(&self) {
        if let Some(handle) = self
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
