use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use domain::{ConnectionState, DeviceError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::TransportEvent;

const READ_BUFFER_SIZE: usize = 2048;

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// What a lost peer (EOF or read error) means for the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerLoss {
    /// The link goes down and a disconnect is announced
    Disconnect,
    /// Only the peer is dropped; the link stays up (listening servers)
    KeepListening,
}

/// State shared by a transport, its receive loop and its send path.
pub struct Link {
    name: String,
    peer_loss: PeerLoss,
    state: Mutex<ConnectionState>,
    connecting: AtomicBool,
    closed: AtomicBool,
    writer: TokioMutex<Option<Writer>>,
    reader: Mutex<Option<ReceiveLoop>>,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<TransportEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

struct ReceiveLoop {
    generation: u64,
    token: CancellationToken,
}

/// Held while an open attempt is running; releases the `connecting` flag on drop.
pub struct ConnectGuard<'a> {
    link: &'a Link,
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.link.connecting.store(false, Ordering::SeqCst);
    }
}

impl Link {
    pub fn new(name: impl Into<String>, peer_loss: PeerLoss) -> Arc<Self> {
        let (events, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            name: name.into(),
            peer_loss,
            state: Mutex::new(ConnectionState::Disconnected),
            connecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            writer: TokioMutex::new(None),
            reader: Mutex::new(None),
            generation: AtomicU64::new(0),
            events,
            receiver: Mutex::new(Some(receiver)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    /// Claim the single open slot. `None` while another attempt is running.
    pub fn begin_connect(&self) -> Option<ConnectGuard<'_>> {
        if self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        self.set_state(ConnectionState::Connecting);
        Some(ConnectGuard { link: self })
    }

    pub fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            state,
        );
        if previous != state {
            tracing::debug!(link = %self.name, from = %previous, to = %state, "State change");
        }
    }

    /// The event stream can be taken exactly once.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn emit(&self, event: TransportEvent) {
        // Nobody listening is fine: events are advisory.
        let _ = self.events.send(event);
    }

    /// Record the outcome of a transition and announce it.
    pub fn announce(&self, connected: bool) {
        self.set_state(if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        });
        self.emit(TransportEvent::ConnectionChanged(connected));
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Attach a freshly opened stream: keep its write half for `send` and
    /// start the receive loop on its read half. Replaces any previous stream.
    /// Returns `false` and drops the stream once the link has been closed.
    pub async fn attach<S>(self: &Arc<Self>, stream: S) -> bool
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);

        // `close` marks the link before it takes the writer lock to detach.
        let mut slot = self.writer.lock().await;
        if self.is_closed() {
            tracing::debug!(link = %self.name, "Link closed, dropping new stream");
            return false;
        }

        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.stop_receive_loop();
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(ReceiveLoop {
            generation,
            token: token.clone(),
        });
        *slot = Some(Box::new(writer));
        drop(slot);

        let link = Arc::clone(self);
        tokio::spawn(async move {
            let mut buffer = vec![0u8; READ_BUFFER_SIZE];
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    read = reader.read(&mut buffer) => match read {
                        Ok(0) => {
                            link.peer_lost(generation, "closed by peer").await;
                            break;
                        }
                        Ok(n) => {
                            tracing::trace!(link = %link.name, bytes = n, "Received chunk");
                            link.emit(TransportEvent::MessageReceived(Bytes::copy_from_slice(&buffer[..n])));
                        }
                        Err(e) => {
                            link.peer_lost(generation, &e.to_string()).await;
                            break;
                        }
                    }
                }
            }
        });
        true
    }

    fn stop_receive_loop(&self) {
        if let Some(receive_loop) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            receive_loop.token.cancel();
        }
    }

    async fn peer_lost(&self, generation: u64, reason: &str) {
        // A superseded loop must not tear down its replacement.
        let current = {
            let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
            let is_current = reader
                .as_ref()
                .is_some_and(|receive_loop| receive_loop.generation == generation);
            if is_current {
                reader.take();
            }
            is_current
        };
        if !current {
            return;
        }

        // Announce under the writer lock so it cannot interleave with `finish_open`.
        let mut writer = self.writer.lock().await;
        *writer = None;

        match self.peer_loss {
            PeerLoss::Disconnect if self.is_connecting() => {
                tracing::debug!(link = %self.name, reason = %reason, "Stream lost while opening");
            }
            PeerLoss::Disconnect => {
                tracing::warn!(link = %self.name, reason = %reason, "Receive loop ended, link down");
                self.announce(false);
            }
            PeerLoss::KeepListening => {
                tracing::info!(link = %self.name, reason = %reason, "Peer detached");
            }
        }
    }

    /// Announce the outcome of an open attempt. A stream that already dropped
    /// counts as a failed open.
    pub async fn finish_open(&self, opened: bool) -> bool {
        let writer = self.writer.lock().await;
        if self.is_closed() {
            // `close` already released the stream and announced the loss.
            self.set_state(ConnectionState::Disconnected);
            tracing::debug!(link = %self.name, "Link closed while opening");
            return false;
        }
        let connected = opened && (self.peer_loss == PeerLoss::KeepListening || writer.is_some());
        if opened && !connected {
            tracing::warn!(link = %self.name, "Link dropped while opening");
        }
        self.announce(connected);
        connected
    }

    /// Stop the receive loop and release the stream without announcing.
    pub async fn detach(&self) {
        self.stop_receive_loop();
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(link = %self.name, error = %e, "Error shutting down stream");
            }
        }
    }

    pub async fn has_peer(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Write one command. A write failure takes the link down.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut slot = self.writer.lock().await;
        let Some(writer) = slot.as_mut() else {
            return Err(DeviceError::NotConnected);
        };

        let written = match writer.write_all(bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            *slot = None;
            drop(slot);
            self.link_down(&format!("write failed: {}", e));
            return Err(DeviceError::Transport(format!("Write error: {}", e)));
        }

        tracing::trace!(link = %self.name, bytes = bytes.len(), "Sent command");
        Ok(())
    }

    /// Drop the current stream (e.g. after a write that never completed)
    /// and take the link down.
    pub async fn abandon_stream(&self, reason: &str) {
        let mut slot = self.writer.lock().await;
        if slot.take().is_none() {
            return;
        }
        drop(slot);
        self.link_down(reason);
    }

    fn link_down(&self, reason: &str) {
        self.stop_receive_loop();
        tracing::warn!(link = %self.name, reason = %reason, "Link down");
        if !self.is_closed() {
            self.announce(false);
        }
    }
}
