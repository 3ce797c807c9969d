use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection state of a device link
///
/// Disconnected -> Connecting -> Connected -> (I/O error) Disconnected -> ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected, no active connection attempt
    #[default]
    Disconnected,
    /// Currently attempting to establish (or re-establish) the link
    Connecting,
    /// Successfully connected and operational
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
