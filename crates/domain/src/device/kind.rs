use serde::{Deserialize, Serialize};

/// Byte pipe a device is reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Serial,
    TcpClient,
    TcpServer,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serial => "Serial",
            Self::TcpClient => "TcpClient",
            Self::TcpServer => "TcpServer",
        }
    }
}

/// Wire protocol spoken over the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    /// Binary MC (3E frame) protocol
    MelsecMc,
    /// ASCII Mewtocol-style protocol
    Mewtocol,
    /// Barcode scanner with start/end markers
    Scanner,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MelsecMc => "MelsecMc",
            Self::Mewtocol => "Mewtocol",
            Self::Scanner => "Scanner",
        }
    }
}
