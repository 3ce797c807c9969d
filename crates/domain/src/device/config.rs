use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::convert::DataFormat;
use crate::error::DeviceError;

/// Connection record for one device. Immutable once the device is built;
/// a changed record means rebuilding the device.
///
/// `transport` / `protocol` are registry keys (see `TransportKind::as_str`
/// and `ProtocolKind::as_str` for the built-in names).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub transport: String,
    pub protocol: String,
    /// Serial port name, remote host or local bind address
    #[serde(alias = "address")]
    pub connection_param_string: String,
    /// Baud rate (serial) or TCP port
    #[serde(alias = "port", alias = "baud_rate")]
    pub connection_param_int: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub data_format: DataFormat,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub scanner: ScannerSettings,
}

fn default_timeout_ms() -> u64 {
    1000
}
fn default_enabled() -> bool {
    true
}

impl DeviceConfig {
    pub fn new(
        id: impl Into<String>,
        transport: impl Into<String>,
        protocol: impl Into<String>,
        connection_param_string: impl Into<String>,
        connection_param_int: u32,
    ) -> Self {
        Self {
            id: id.into(),
            transport: transport.into(),
            protocol: protocol.into(),
            connection_param_string: connection_param_string.into(),
            connection_param_int,
            timeout_ms: default_timeout_ms(),
            data_format: DataFormat::default(),
            enabled: default_enabled(),
            serial: SerialSettings::default(),
            scanner: ScannerSettings::default(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_data_format(mut self, data_format: DataFormat) -> Self {
        self.data_format = data_format;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `host:port` form of the connection parameters
    pub fn socket_address(&self) -> String {
        format!(
            "{}:{}",
            self.connection_param_string, self.connection_param_int
        )
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.id.trim().is_empty() {
            return Err(DeviceError::InvalidConfiguration(
                "device id must not be empty".into(),
            ));
        }
        if self.connection_param_string.trim().is_empty() {
            return Err(DeviceError::InvalidConfiguration(format!(
                "device {}: connection_param_string must not be empty",
                self.id
            )));
        }
        if self.timeout_ms == 0 {
            return Err(DeviceError::InvalidConfiguration(format!(
                "device {}: timeout_ms must be positive",
                self.id
            )));
        }
        Ok(())
    }
}

/// Line settings for serial transports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: String, // "None", "Even", "Odd"
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

fn default_data_bits() -> u8 {
    8
}
fn default_parity() -> String {
    "None".to_string()
}
fn default_stop_bits() -> u8 {
    1
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }
}

/// Framing for barcode scanners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerSettings {
    #[serde(default = "default_trigger_command")]
    pub trigger_command: String,
    #[serde(default = "default_start_marker")]
    pub start_marker: String,
    #[serde(default = "default_end_marker")]
    pub end_marker: String,
}

fn default_trigger_command() -> String {
    "LON\r".to_string()
}
fn default_start_marker() -> String {
    "A79Z".to_string()
}
fn default_end_marker() -> String {
    "Z97A".to_string()
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            trigger_command: default_trigger_command(),
            start_marker: default_start_marker(),
            end_marker: default_end_marker(),
        }
    }
}
