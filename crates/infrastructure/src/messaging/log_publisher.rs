use async_trait::async_trait;
use domain::DeviceEvent;
use domain::event::EventPublisher;

/// Writes every event to the tracing log
#[derive(Debug, Default, Clone)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(
        &self,
        event: DeviceEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(event_type = event.event_type(), payload = %serde_json::to_string(&event)?, "Device event");
        match &event {
            DeviceEvent::ConnectionChanged {
                device_id,
                connected,
                ..
            } => {
                if *connected {
                    tracing::info!(device_id = %device_id, "Device connected");
                } else {
                    tracing::warn!(device_id = %device_id, "Device disconnected");
                }
            }
            DeviceEvent::SnReceived {
                device_id,
                serial_number,
                ..
            } => {
                tracing::info!(device_id = %device_id, serial_number = %serial_number, "Serial number received");
            }
        }
        Ok(())
    }
}
