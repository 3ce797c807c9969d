use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::device::SerialSettings;
use domain::{DeviceConfig, DeviceError, TransportKind};
use tokio_serial::SerialPortBuilderExt;

use super::{Link, PeerLoss, Transport};

/// Serial line parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SerialPortConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: String, // "None", "Even", "Odd"
    pub stop_bits: u8,
    pub timeout_ms: u64,
}

impl SerialPortConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        let settings = SerialSettings::default();
        Self {
            port: port.into(),
            baud_rate,
            data_bits: settings.data_bits,
            parity: settings.parity,
            stop_bits: settings.stop_bits,
            timeout_ms: 1000,
        }
    }

    pub fn from_device(config: &DeviceConfig) -> Self {
        Self {
            port: config.connection_param_string.clone(),
            baud_rate: config.connection_param_int,
            data_bits: config.serial.data_bits,
            parity: config.serial.parity.clone(),
            stop_bits: config.serial.stop_bits,
            timeout_ms: config.timeout_ms,
        }
    }

    /// Line settings must map onto what the port driver supports
    pub fn validate(&self) -> Result<(), DeviceError> {
        self.to_data_bits()?;
        self.to_parity()?;
        self.to_stop_bits()?;
        Ok(())
    }

    /// Normalize port name for Windows (e.g., COM7 -> \\.\COM7)
    fn port_name(&self) -> String {
        if cfg!(target_os = "windows") && !self.port.to_uppercase().starts_with(r"\\.\") {
            format!(r"\\.\{}", self.port)
        } else {
            self.port.clone()
        }
    }

    fn to_parity(&self) -> Result<tokio_serial::Parity, DeviceError> {
        match self.parity.to_lowercase().as_str() {
            "n" | "none" => Ok(tokio_serial::Parity::None),
            "o" | "odd" => Ok(tokio_serial::Parity::Odd),
            "e" | "even" => Ok(tokio_serial::Parity::Even),
            _ => Err(DeviceError::InvalidConfiguration(format!(
                "Invalid parity: {}",
                self.parity
            ))),
        }
    }

    fn to_stop_bits(&self) -> Result<tokio_serial::StopBits, DeviceError> {
        match self.stop_bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            _ => Err(DeviceError::InvalidConfiguration(format!(
                "Invalid stop bits: {}",
                self.stop_bits
            ))),
        }
    }

    fn to_data_bits(&self) -> Result<tokio_serial::DataBits, DeviceError> {
        match self.data_bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            _ => Err(DeviceError::InvalidConfiguration(format!(
                "Invalid data bits: {}",
                self.data_bits
            ))),
        }
    }
}

/// Serial port transport
pub struct SerialTransport {
    config: SerialPortConfig,
    link: Arc<Link>,
}

impl SerialTransport {
    pub fn new(config: SerialPortConfig) -> Self {
        let link = Link::new(format!("serial:{}", config.port), PeerLoss::Disconnect);
        Self { config, link }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn link(&self) -> &Arc<Link> {
        &self.link
    }

    async fn prepare(&self) -> Result<(), DeviceError> {
        self.config.validate()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        let port_name = self.config.port_name();

        tracing::debug!(
            port = %port_name,
            baud_rate = self.config.baud_rate,
            "Opening serial port"
        );

        let port = tokio_serial::new(&port_name, self.config.baud_rate)
            .data_bits(self.config.to_data_bits()?)
            .parity(self.config.to_parity()?)
            .stop_bits(self.config.to_stop_bits()?)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .open_native_async()
            .map_err(|e| {
                DeviceError::Transport(format!(
                    "Failed to open serial port {}: {}. Tip: Ensure the port is not used by another application and that you have sufficient permissions.",
                    port_name, e
                ))
            })?;

        if !self.link.attach(port).await {
            return Err(DeviceError::Transport("link closed while opening".into()));
        }
        Ok(())
    }
}
