use std::sync::Arc;

use domain::{DeviceError, DeviceEvent, EventPublisher};
use infrastructure::TransportEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::correlator::Exchange;
use super::reconnect::ReconnectSupervisor;

/// Receive pump of one device: feeds transport bytes into the adapter,
/// completes the in-flight command, and turns link changes into device
/// events and reconnect requests.
pub(crate) struct Dispatcher {
    pub device_id: String,
    pub exchange: Arc<Exchange>,
    pub supervisor: Arc<ReconnectSupervisor>,
    pub publisher: Arc<dyn EventPublisher>,
    /// Frames nobody asked for are scans (hardware-triggered scanners)
    pub unsolicited_scans: bool,
}

impl Dispatcher {
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: CancellationToken,
    ) {
        debug!(device_id = %self.device_id, "Dispatcher started");
        loop {
            // Drain pending events before honouring shutdown.
            let event = tokio::select! {
                biased;
                event = events.recv() => event,
                _ = shutdown.cancelled() => None,
            };
            let Some(event) = event else { break };

            match event {
                TransportEvent::MessageReceived(bytes) => self.on_bytes(&bytes).await,
                TransportEvent::ConnectionChanged(connected) => {
                    self.on_connection_changed(connected).await
                }
            }
        }
        debug!(device_id = %self.device_id, "Dispatcher stopped");
    }

    async fn on_bytes(&self, bytes: &[u8]) {
        for frame in self.exchange.feed(bytes) {
            let Some(unclaimed) = self.exchange.complete(frame) else {
                continue;
            };
            match unclaimed {
                Ok(payload) if self.unsolicited_scans => {
                    let serial_number = String::from_utf8_lossy(&payload).trim().to_string();
                    info!(device_id = %self.device_id, serial_number = %serial_number, "Unsolicited scan");
                    self.publish(DeviceEvent::sn_received(&self.device_id, serial_number))
                        .await;
                }
                Ok(payload) => {
                    debug!(device_id = %self.device_id, bytes = payload.len(), "Dropping unsolicited frame");
                }
                Err(e) => {
                    debug!(device_id = %self.device_id, error = %e, "Dropping unsolicited error frame");
                }
            }
        }
    }

    async fn on_connection_changed(&self, connected: bool) {
        self.publish(DeviceEvent::connection_changed(&self.device_id, connected))
            .await;
        if !connected {
            self.exchange.abort(DeviceError::Transport(
                "Link lost while awaiting response".to_string(),
            ));
            self.supervisor.schedule();
        }
    }

    async fn publish(&self, event: DeviceEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            warn!(device_id = %self.device_id, "Failed to publish event: {}", e);
        }
    }
}
