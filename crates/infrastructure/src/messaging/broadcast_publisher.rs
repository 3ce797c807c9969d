use async_trait::async_trait;
use domain::DeviceEvent;
use domain::event::EventPublisher;
use tokio::sync::broadcast;

/// Re-publishes events on a broadcast channel for in-process subscribers
/// (status indicators, scan consumers).
pub struct BroadcastEventPublisher {
    tx: broadcast::Sender<DeviceEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(
        &self,
        event: DeviceEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // No subscribers is not an error
        let _ = self.tx.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = BroadcastEventPublisher::new(4);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher
            .publish(DeviceEvent::sn_received("scanner-01", "SN42"))
            .await
            .unwrap();

        for rx in [&mut first, &mut second] {
            match rx.recv().await.unwrap() {
                DeviceEvent::SnReceived { serial_number, .. } => assert_eq!(serial_number, "SN42"),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let publisher = BroadcastEventPublisher::new(4);
        assert!(
            publisher
                .publish(DeviceEvent::connection_changed("plc-01", false))
                .await
                .is_ok()
        );
    }
}
