use std::collections::HashMap;
use std::sync::Arc;

use domain::{DeviceConfig, DeviceError, ProtocolAdapter, ProtocolKind, TransportKind};

use crate::protocol::{MelsecMcAdapter, MewtocolAdapter, ScannerAdapter};
use crate::transport::{
    SerialPortConfig, SerialTransport, TcpClientTransport, TcpServerTransport, Transport,
};

/// A transport and protocol adapter built for one device
pub struct Connector {
    pub transport: Arc<dyn Transport>,
    pub adapter: Box<dyn ProtocolAdapter>,
}

pub type ConnectorBuilder = fn(&DeviceConfig) -> Result<Connector, DeviceError>;

/// Maps `(transport, protocol)` name pairs to connector constructors.
/// Names are matched case-insensitively.
pub struct ConnectorRegistry {
    builders: HashMap<(String, String), ConnectorBuilder>,
}

fn key(transport: &str, protocol: &str) -> (String, String) {
    (transport.trim().to_lowercase(), protocol.trim().to_lowercase())
}

fn build_transport(config: &DeviceConfig) -> Result<Arc<dyn Transport>, DeviceError> {
    let transport: Arc<dyn Transport> = match config.transport.trim().to_lowercase().as_str() {
        "serial" => {
            let port = SerialPortConfig::from_device(config);
            port.validate()?;
            Arc::new(SerialTransport::new(port))
        }
        "tcpclient" => Arc::new(TcpClientTransport::from_device(config)),
        "tcpserver" => {
            let server = TcpServerTransport::from_device(config);
            server.validate()?;
            Arc::new(server)
        }
        other => {
            return Err(DeviceError::InvalidConfiguration(format!(
                "Unknown transport: {}",
                other
            )));
        }
    };
    Ok(transport)
}

fn melsec_mc(config: &DeviceConfig) -> Result<Connector, DeviceError> {
    Ok(Connector {
        transport: build_transport(config)?,
        adapter: Box::new(MelsecMcAdapter::new(config.data_format)),
    })
}

fn mewtocol(config: &DeviceConfig) -> Result<Connector, DeviceError> {
    Ok(Connector {
        transport: build_transport(config)?,
        adapter: Box::new(MewtocolAdapter::new(config.data_format)),
    })
}

fn scanner(config: &DeviceConfig) -> Result<Connector, DeviceError> {
    Ok(Connector {
        transport: build_transport(config)?,
        adapter: Box::new(ScannerAdapter::new(&config.scanner)?),
    })
}

impl ConnectorRegistry {
    /// Registry without any pairs
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Every built-in transport paired with every built-in protocol
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for transport in [
            TransportKind::Serial,
            TransportKind::TcpClient,
            TransportKind::TcpServer,
        ] {
            registry.register(transport.as_str(), ProtocolKind::MelsecMc.as_str(), melsec_mc);
            registry.register(transport.as_str(), ProtocolKind::Mewtocol.as_str(), mewtocol);
            registry.register(transport.as_str(), ProtocolKind::Scanner.as_str(), scanner);
        }
        registry
    }

    pub fn register(&mut self, transport: &str, protocol: &str, builder: ConnectorBuilder) {
        self.builders.insert(key(transport, protocol), builder);
    }

    pub fn contains(&self, transport: &str, protocol: &str) -> bool {
        self.builders.contains_key(&key(transport, protocol))
    }

    pub fn build(&self, config: &DeviceConfig) -> Result<Connector, DeviceError> {
        config.validate()?;
        let builder = self
            .builders
            .get(&key(&config.transport, &config.protocol))
            .ok_or_else(|| {
                DeviceError::InvalidConfiguration(format!(
                    "No connector registered for transport '{}' with protocol '{}'",
                    config.transport, config.protocol
                ))
            })?;
        builder(config)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
