mod config;
mod kind;

pub use config::{DeviceConfig, ScannerSettings, SerialSettings};
pub use kind::{ProtocolKind, TransportKind};
