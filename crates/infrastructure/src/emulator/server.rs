use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::MewtocolEmulator;
use crate::protocol::AsciiFrameScanner;

/// TCP front end for a [`MewtocolEmulator`]. Every accepted connection is
/// served concurrently against the same register image.
pub struct EmulatorServer {
    local_addr: SocketAddr,
    image: Arc<RwLock<MewtocolEmulator>>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl EmulatorServer {
    /// Bind and start accepting. Port 0 picks a free port.
    pub async fn bind(address: &str, emulator: MewtocolEmulator) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        let image = Arc::new(RwLock::new(emulator));
        let shutdown = CancellationToken::new();

        tracing::info!(address = %local_addr, "Mewtocol emulator listening");

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&image),
            shutdown.clone(),
        ));

        Ok(Self {
            local_addr,
            image,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared register image, for inspection or preloading
    pub fn image(&self) -> Arc<RwLock<MewtocolEmulator>> {
        Arc::clone(&self.image)
    }

    /// Stop accepting and drop every open connection
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::debug!(error = %e, "Emulator accept loop ended abnormally");
        }
        tracing::info!(address = %self.local_addr, "Mewtocol emulator stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    image: Arc<RwLock<MewtocolEmulator>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(peer = %peer, "Emulator client connected");
                    tokio::spawn(serve_client(stream, Arc::clone(&image), shutdown.child_token()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Emulator accept failed");
                }
            }
        }
    }
}

async fn serve_client(
    mut stream: TcpStream,
    image: Arc<RwLock<MewtocolEmulator>>,
    shutdown: CancellationToken,
) {
    let mut scanner = AsciiFrameScanner::new();
    let mut buffer = [0u8; 1024];

    loop {
        let n = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = stream.read(&mut buffer) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(error = %e, "Emulator client read failed");
                    break;
                }
            }
        };

        for frame in scanner.push(&buffer[..n]) {
            let reply = image.write().await.respond(&frame);
            if let Err(e) = stream.write_all(reply.as_bytes()).await {
                tracing::debug!(error = %e, "Emulator client write failed");
                return;
            }
        }
    }
    tracing::debug!("Emulator client disconnected");
}
