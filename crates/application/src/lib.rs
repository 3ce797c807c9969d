//! Application layer - Per-device command correlation, reconnection and the typed device API

pub mod device;

pub use device::{Device, DeviceManager};
