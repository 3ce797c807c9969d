use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod publisher;
pub use publisher::EventPublisher;

/// Events exposed to collaborators (status indicators, scanner consumers)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceEvent {
    /// Link to the device went up or down
    ConnectionChanged {
        device_id: String,
        connected: bool,
        timestamp: DateTime<Utc>,
    },

    /// A scanner produced a serial number
    SnReceived {
        device_id: String,
        serial_number: String,
        timestamp: DateTime<Utc>,
    },
}

impl DeviceEvent {
    /// Create a ConnectionChanged event
    pub fn connection_changed(device_id: impl Into<String>, connected: bool) -> Self {
        Self::ConnectionChanged {
            device_id: device_id.into(),
            connected,
            timestamp: Utc::now(),
        }
    }

    /// Create a SnReceived event
    pub fn sn_received(device_id: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self::SnReceived {
            device_id: device_id.into(),
            serial_number: serial_number.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Self::ConnectionChanged { device_id, .. } => device_id,
            Self::SnReceived { device_id, .. } => device_id,
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ConnectionChanged { timestamp, .. } => *timestamp,
            Self::SnReceived { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &str {
        match self {
            Self::ConnectionChanged { .. } => "ConnectionChanged",
            Self::SnReceived { .. } => "SnReceived",
        }
    }
}
