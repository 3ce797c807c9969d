use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};

use domain::{
    ByteTransform, ConnectionState, ConvertError, DataFormat, DeviceConfig, DeviceError,
    DeviceEvent, EventPublisher, OperateResult, ProtocolKind,
};
use infrastructure::{Connector, ConnectorRegistry, Transport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::correlator::Correlator;
use super::dispatcher::Dispatcher;
use super::reconnect::ReconnectSupervisor;

/// Typed register access to one device.
///
/// Every operation returns an [`OperateResult`]; lower-layer failures are
/// reported there with a message and a numeric code.
pub struct Device {
    config: DeviceConfig,
    transport: Arc<dyn Transport>,
    correlator: Correlator,
    transform: ByteTransform,
    supervisor: Arc<ReconnectSupervisor>,
    publisher: Arc<dyn EventPublisher>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Device {
    /// Wire a device from its connector and start its dispatcher.
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: DeviceConfig,
        connector: Connector,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Arc<Self>, DeviceError> {
        let Connector { transport, adapter } = connector;
        let events = transport.take_events().ok_or_else(|| {
            DeviceError::InvalidConfiguration(format!(
                "device {}: transport already bound to another device",
                config.id
            ))
        })?;

        let transform = ByteTransform::new(adapter.data_format());
        let correlator = Correlator::new(
            config.id.clone(),
            Arc::clone(&transport),
            adapter,
            config.timeout(),
        );
        let exchange = correlator.exchange();
        let supervisor = ReconnectSupervisor::new(config.id.clone(), Arc::clone(&transport));
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher {
            device_id: config.id.clone(),
            unsolicited_scans: exchange.protocol() == ProtocolKind::Scanner.as_str(),
            exchange,
            supervisor: Arc::clone(&supervisor),
            publisher: Arc::clone(&publisher),
        };
        let handle = tokio::spawn(dispatcher.run(events, shutdown.clone()));

        Ok(Arc::new(Self {
            config,
            transport,
            correlator,
            transform,
            supervisor,
            publisher,
            shutdown,
            dispatcher: Mutex::new(Some(handle)),
        }))
    }

    /// Build the transport and adapter through `registry`
    pub fn from_registry(
        config: DeviceConfig,
        registry: &ConnectorRegistry,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Arc<Self>, DeviceError> {
        let connector = registry.build(&config)?;
        Self::new(config, connector, publisher)
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn data_format(&self) -> DataFormat {
        self.transform.data_format()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.supervisor.is_active()
    }

    /// Initialize the transport and make the first open attempt. A failed
    /// attempt hands over to the reconnect loop.
    pub async fn start(&self) -> bool {
        info!(device_id = %self.config.id, transport = %self.config.transport, protocol = %self.config.protocol, "Starting device");
        if let Err(e) = self.transport.initialize().await {
            warn!(device_id = %self.config.id, error = %e, "Transport initialization failed");
            self.supervisor.schedule();
            return false;
        }
        self.transport.open().await
    }

    /// Close the transport for good and stop the dispatcher
    pub async fn close(&self) {
        self.transport.close().await;
        self.shutdown.cancel();
        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!(device_id = %self.config.id, error = %e, "Dispatcher ended abnormally");
            }
        }
        info!(device_id = %self.config.id, "Device closed");
    }

    /// Raw read of `words` 16-bit registers
    pub async fn read_bytes(&self, address: u32, words: u16) -> Result<Vec<u8>, DeviceError> {
        let command = self.correlator.build_read(address, words)?;
        self.correlator.execute(&command, true).await
    }

    /// Raw write of whole registers
    pub async fn write_bytes(&self, address: u32, bytes: &[u8]) -> Result<(), DeviceError> {
        let command = self.correlator.build_write(address, bytes)?;
        self.correlator.execute(&command, true).await.map(|_| ())
    }

    async fn read_typed<T, F>(
        &self,
        operation: &str,
        address: u32,
        length: u16,
        words_per_element: u16,
        decode: F,
    ) -> OperateResult<Vec<T>>
    where
        T: Display,
        F: FnOnce(&ByteTransform, &[u8], usize) -> Result<Vec<T>, ConvertError>,
    {
        let result: Result<Vec<T>, DeviceError> = async {
            if length == 0 {
                return Err(DeviceError::InvalidRequest(
                    "length must be at least 1".into(),
                ));
            }
            let words = length.checked_mul(words_per_element).ok_or_else(|| {
                DeviceError::InvalidRequest(format!("{} elements exceed one request", length))
            })?;
            let bytes = self.read_bytes(address, words).await?;
            Ok(decode(&self.transform, &bytes, length as usize)?)
        }
        .await;

        match result {
            Ok(values) => {
                let message = match values.first() {
                    Some(first) => format!("{} at {}: {}", operation, address, first),
                    None => format!("{} at {}: no data", operation, address),
                };
                OperateResult::success(values, message)
            }
            Err(e) => self.failure(operation, address, e),
        }
    }

    async fn write_encoded(&self, operation: &str, address: u32, bytes: Vec<u8>) -> OperateResult<()> {
        match self.write_bytes(address, &bytes).await {
            Ok(()) => OperateResult::success((), format!("{} at {}: ok", operation, address)),
            Err(e) => self.failure(operation, address, e),
        }
    }

    fn failure<T>(&self, operation: &str, address: u32, error: DeviceError) -> OperateResult<T> {
        warn!(device_id = %self.config.id, operation, address, code = error.code(), error = %error, "Operation failed");
        OperateResult::failure(&error)
    }

    pub async fn read_bool(&self, address: u32, length: u16) -> OperateResult<Vec<bool>> {
        self.read_typed("ReadBool", address, length, 1, |t, b, n| t.decode_bool(b, n))
            .await
    }

    pub async fn read_int16(&self, address: u32, length: u16) -> OperateResult<Vec<i16>> {
        self.read_typed("ReadInt16", address, length, 1, |t, b, n| t.decode_i16(b, n))
            .await
    }

    pub async fn read_uint16(&self, address: u32, length: u16) -> OperateResult<Vec<u16>> {
        self.read_typed("ReadUInt16", address, length, 1, |t, b, n| t.decode_u16(b, n))
            .await
    }

    pub async fn read_int32(&self, address: u32, length: u16) -> OperateResult<Vec<i32>> {
        self.read_typed("ReadInt32", address, length, 2, |t, b, n| t.decode_i32(b, n))
            .await
    }

    pub async fn read_uint32(&self, address: u32, length: u16) -> OperateResult<Vec<u32>> {
        self.read_typed("ReadUInt32", address, length, 2, |t, b, n| t.decode_u32(b, n))
            .await
    }

    pub async fn read_float(&self, address: u32, length: u16) -> OperateResult<Vec<f32>> {
        self.read_typed("ReadFloat", address, length, 2, |t, b, n| t.decode_f32(b, n))
            .await
    }

    pub async fn read_double(&self, address: u32, length: u16) -> OperateResult<Vec<f64>> {
        self.read_typed("ReadDouble", address, length, 4, |t, b, n| t.decode_f64(b, n))
            .await
    }

    /// Read an ASCII string of `length` bytes (rounded up to whole registers)
    pub async fn read_string(&self, address: u32, length: u16) -> OperateResult<String> {
        let result: Result<String, DeviceError> = async {
            if length == 0 {
                return Err(DeviceError::InvalidRequest(
                    "length must be at least 1".into(),
                ));
            }
            let bytes = self.read_bytes(address, length.div_ceil(2)).await?;
            Ok(self.transform.decode_string(&bytes)?)
        }
        .await;

        match result {
            Ok(text) => {
                let message = format!("ReadString at {}: {}", address, text);
                OperateResult::success(text, message)
            }
            Err(e) => self.failure("ReadString", address, e),
        }
    }

    pub async fn write_bool(&self, address: u32, values: &[bool]) -> OperateResult<()> {
        self.write_encoded("WriteBool", address, self.transform.encode_bool(values))
            .await
    }

    pub async fn write_int16(&self, address: u32, values: &[i16]) -> OperateResult<()> {
        self.write_encoded("WriteInt16", address, self.transform.encode_i16(values))
            .await
    }

    pub async fn write_uint16(&self, address: u32, values: &[u16]) -> OperateResult<()> {
        self.write_encoded("WriteUInt16", address, self.transform.encode_u16(values))
            .await
    }

    pub async fn write_int32(&self, address: u32, values: &[i32]) -> OperateResult<()> {
        self.write_encoded("WriteInt32", address, self.transform.encode_i32(values))
            .await
    }

    pub async fn write_uint32(&self, address: u32, values: &[u32]) -> OperateResult<()> {
        self.write_encoded("WriteUInt32", address, self.transform.encode_u32(values))
            .await
    }

    pub async fn write_float(&self, address: u32, values: &[f32]) -> OperateResult<()> {
        self.write_encoded("WriteFloat", address, self.transform.encode_f32(values))
            .await
    }

    pub async fn write_double(&self, address: u32, values: &[f64]) -> OperateResult<()> {
        self.write_encoded("WriteDouble", address, self.transform.encode_f64(values))
            .await
    }

    pub async fn write_string(&self, address: u32, value: &str) -> OperateResult<()> {
        let mut bytes = match self.transform.encode_string(value) {
            Ok(bytes) => bytes,
            Err(e) => return self.failure("WriteString", address, e.into()),
        };
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        self.write_encoded("WriteString", address, bytes).await
    }

    /// Ask a scanner for one serial number. The result is also published
    /// as `SnReceived`.
    pub async fn trigger(&self) -> OperateResult<String> {
        let result: Result<String, DeviceError> = async {
            let command = self.correlator.build_read(0, 1)?;
            let payload = self.correlator.execute(&command, true).await?;
            Ok(String::from_utf8_lossy(&payload).trim().to_string())
        }
        .await;

        match result {
            Ok(serial_number) => {
                info!(device_id = %self.config.id, serial_number = %serial_number, "Scan received");
                let event = DeviceEvent::sn_received(&self.config.id, serial_number.clone());
                if let Err(e) = self.publisher.publish(event).await {
                    warn!(device_id = %self.config.id, "Failed to publish event: {}", e);
                }
                let message = format!("Trigger: {}", serial_number);
                OperateResult::success(serial_number, message)
            }
            Err(e) => self.failure("Trigger", 0, e),
        }
    }

    /// [`Device::trigger`] on a background task
    pub fn trigger_async(self: &Arc<Self>) -> JoinHandle<OperateResult<String>> {
        let device = Arc::clone(self);
        tokio::spawn(async move { device.trigger().await })
    }
}
