use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{DeviceConfig, DeviceError, TransportKind};
use tokio::net::TcpStream;

use super::{Link, PeerLoss, Transport};

/// TCP client transport
pub struct TcpClientTransport {
    address: String,
    connect_timeout: Duration,
    link: Arc<Link>,
}

impl TcpClientTransport {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        let address = address.into();
        let link = Link::new(format!("tcp:{}", address), PeerLoss::Disconnect);
        Self {
            address,
            connect_timeout,
            link,
        }
    }

    pub fn from_device(config: &DeviceConfig) -> Self {
        Self::new(config.socket_address(), config.timeout())
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Transport for TcpClientTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::TcpClient
    }

    fn link(&self) -> &Arc<Link> {
        &self.link
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        tracing::debug!(address = %self.address, "Connecting");
        let stream =
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(DeviceError::Transport(format!(
                        "Failed to connect to {}: {}",
                        self.address, e
                    )));
                }
                Err(_) => {
                    return Err(DeviceError::Transport(format!(
                        "Connection to {} timed out",
                        self.address
                    )));
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(address = %self.address, error = %e, "Unable to disable Nagle");
        }

        if !self.link.attach(stream).await {
            return Err(DeviceError::Transport("link closed while opening".into()));
        }
        Ok(())
    }
}
