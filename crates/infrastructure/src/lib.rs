//! Infrastructure layer - Transports, wire protocols and external integrations

pub mod config;
pub mod emulator;
pub mod messaging;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use config::{AgentConfig, EmulatorConfig};
pub use emulator::{EmulatorServer, MewtocolEmulator};
pub use messaging::{BroadcastEventPublisher, CompositeEventPublisher, LogEventPublisher};
pub use protocol::{MelsecMcAdapter, MewtocolAdapter, ScannerAdapter};
pub use registry::{Connector, ConnectorRegistry};
pub use transport::{
    SerialTransport, TcpClientTransport, TcpServerTransport, Transport, TransportEvent,
};
