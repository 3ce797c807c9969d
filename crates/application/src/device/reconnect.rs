use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use infrastructure::Transport;
use infrastructure::transport::OPEN_FAILURE_BACKOFF;
use tracing::{debug, info, warn};

/// Re-initializes and reopens a transport after it reports a disconnect.
///
/// At most one reconnect loop runs per transport. Retries are unbounded and
/// stop only once the link is up again or the transport has been closed.
pub struct ReconnectSupervisor {
    device_id: String,
    transport: Arc<dyn Transport>,
    active: AtomicBool,
    min_cycle: Duration,
}

impl ReconnectSupervisor {
    pub fn new(device_id: impl Into<String>, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            device_id: device_id.into(),
            transport,
            active: AtomicBool::new(false),
            min_cycle: OPEN_FAILURE_BACKOFF,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start the reconnect loop unless one is already running
    pub fn schedule(self: &Arc<Self>) {
        if self.transport.is_closed() {
            return;
        }
        if self.active.swap(true, Ordering::SeqCst) {
            debug!(device_id = %self.device_id, "Reconnect already running");
            return;
        }
        let supervisor = Arc::clone(self);
        tokio::spawn(async move { supervisor.run().await });
    }

    fn should_retry(&self) -> bool {
        !self.transport.is_closed() && !self.transport.is_connected()
    }

    async fn run(self: Arc<Self>) {
        loop {
            let mut attempts: u64 = 0;
            while self.should_retry() {
                attempts += 1;
                let started = Instant::now();
                let reopened = self.attempt(attempts).await;
                if reopened {
                    info!(device_id = %self.device_id, attempts, "Reconnected");
                    continue;
                }
                // Keep a floor on the cycle even when the attempt returned early.
                let elapsed = started.elapsed();
                if elapsed < self.min_cycle {
                    tokio::time::sleep(self.min_cycle - elapsed).await;
                }
            }

            self.active.store(false, Ordering::SeqCst);
            // A disconnect may have landed between the last check and the store.
            if !self.should_retry() || self.active.swap(true, Ordering::SeqCst) {
                break;
            }
        }
    }

    async fn attempt(&self, attempt: u64) -> bool {
        if self.transport.link().is_connecting() {
            return false;
        }
        debug!(device_id = %self.device_id, attempt, "Reconnecting");
        if let Err(e) = self.transport.initialize().await {
            warn!(device_id = %self.device_id, error = %e, "Re-initialization failed");
            return false;
        }
        self.transport.open().await
    }
}
