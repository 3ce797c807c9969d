use async_trait::async_trait;
use domain::DeviceEvent;
use domain::event::EventPublisher;
use std::sync::Arc;

/// Fans each event out to every inner publisher
pub struct CompositeEventPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }
}

#[async_trait]
impl EventPublisher for CompositeEventPublisher {
    async fn publish(
        &self,
        event: DeviceEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(event.clone()).await {
                // Log error but continue to other publishers
                tracing::error!(
                    device_id = %event.device_id(),
                    "Failed to publish event to one of the publishers: {}",
                    e
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::BroadcastEventPublisher;

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(
            &self,
            _event: DeviceEvent,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("sink unavailable".into())
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_fan_out() {
        let broadcast = Arc::new(BroadcastEventPublisher::new(8));
        let mut rx = broadcast.subscribe();
        let composite =
            CompositeEventPublisher::new(vec![Arc::new(FailingPublisher), broadcast.clone()]);

        composite
            .publish(DeviceEvent::connection_changed("plc-01", true))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.device_id(), "plc-01");
    }
}
