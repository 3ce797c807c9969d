//! Domain layer - Pure device-access model with no I/O
//!
//! This crate contains:
//! - Device configuration records and transport/protocol kinds
//! - Connection state
//! - The protocol adapter strategy trait
//! - Payload conversion (`ByteTransform`, `DataFormat`)
//! - Errors, tagged operation results and device events
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Testable in isolation

pub mod connection;
pub mod convert;
pub mod device;
pub mod error;
pub mod event;
pub mod result;

// Re-export commonly used types
pub use connection::{ConnectionState, FrameResult, ProtocolAdapter};
pub use convert::{ByteTransform, ConvertError, DataFormat};
pub use device::{DeviceConfig, ProtocolKind, TransportKind};
pub use error::DeviceError;
pub use event::{DeviceEvent, EventPublisher};
pub use result::OperateResult;
