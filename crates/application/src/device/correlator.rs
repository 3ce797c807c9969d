use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use domain::{DataFormat, DeviceError, FrameResult, ProtocolAdapter};
use infrastructure::Transport;
use tokio::sync::{Mutex as TokioMutex, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Pause before a command against a disconnected device fails
pub const NOT_CONNECTED_DELAY: Duration = Duration::from_millis(100);

/// The command currently waiting for its response
struct InFlightCommand {
    reply: oneshot::Sender<FrameResult>,
}

/// Adapter and in-flight slot, shared by the correlator and the dispatcher.
pub(crate) struct Exchange {
    adapter: Mutex<Box<dyn ProtocolAdapter>>,
    in_flight: Mutex<Option<InFlightCommand>>,
}

impl Exchange {
    fn new(adapter: Box<dyn ProtocolAdapter>) -> Arc<Self> {
        Arc::new(Self {
            adapter: Mutex::new(adapter),
            in_flight: Mutex::new(None),
        })
    }

    fn adapter(&self) -> std::sync::MutexGuard<'_, Box<dyn ProtocolAdapter>> {
        self.adapter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<InFlightCommand>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run received bytes through the frame accumulator
    pub(crate) fn feed(&self, bytes: &[u8]) -> Vec<FrameResult> {
        self.adapter().on_bytes_received(bytes)
    }

    /// Hand a completed frame to the waiting command. Returns the frame back
    /// when nothing is in flight.
    pub(crate) fn complete(&self, frame: FrameResult) -> Option<FrameResult> {
        match self.slot().take() {
            Some(command) => {
                if command.reply.send(frame).is_err() {
                    debug!("Response arrived after its caller gave up");
                }
                None
            }
            None => Some(frame),
        }
    }

    /// Fail the waiting command, if any
    pub(crate) fn abort(&self, error: DeviceError) {
        if let Some(command) = self.slot().take() {
            let _ = command.reply.send(Err(error));
        }
    }

    pub(crate) fn protocol(&self) -> &'static str {
        self.adapter().name()
    }
}

/// Pairs each outgoing command with the next complete inbound frame.
///
/// Commands on one device are strictly serialized by `command_lock`; the
/// lock is scoped to `execute` and released on every exit path.
pub struct Correlator {
    device_id: String,
    transport: Arc<dyn Transport>,
    exchange: Arc<Exchange>,
    command_lock: TokioMutex<()>,
    timeout: Duration,
}

impl Correlator {
    pub fn new(
        device_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        adapter: Box<dyn ProtocolAdapter>,
        timeout: Duration,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            transport,
            exchange: Exchange::new(adapter),
            command_lock: TokioMutex::new(()),
            timeout,
        }
    }

    pub(crate) fn exchange(&self) -> Arc<Exchange> {
        Arc::clone(&self.exchange)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn data_format(&self) -> DataFormat {
        self.exchange.adapter().data_format()
    }

    pub fn build_read(&self, address: u32, length: u16) -> Result<Vec<u8>, DeviceError> {
        self.exchange.adapter().build_read_command(address, length)
    }

    pub fn build_write(&self, address: u32, values: &[u8]) -> Result<Vec<u8>, DeviceError> {
        self.exchange.adapter().build_write_command(address, values)
    }

    /// Send one command and, when `wait_for_response`, wait for its frame.
    pub async fn execute(
        &self,
        command: &[u8],
        wait_for_response: bool,
    ) -> Result<Vec<u8>, DeviceError> {
        let _guard = self.command_lock.lock().await;

        if !self.transport.is_connected() {
            tokio::time::sleep(NOT_CONNECTED_DELAY).await;
            return Err(DeviceError::NotConnected);
        }

        let response = {
            self.exchange.adapter().reset();
            let mut slot = self.exchange.slot();
            if wait_for_response {
                let (reply, response) = oneshot::channel();
                *slot = Some(InFlightCommand { reply });
                Some(response)
            } else {
                *slot = None;
                None
            }
        };

        // One deadline covers both the write and the response.
        let deadline = Instant::now() + self.timeout;
        let timeout_ms = self.timeout.as_millis() as u64;

        match tokio::time::timeout_at(deadline, self.transport.send(command)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.exchange.slot().take();
                warn!(device_id = %self.device_id, error = %e, "Send failed");
                return Err(e);
            }
            Err(_) => {
                self.exchange.slot().take();
                warn!(device_id = %self.device_id, timeout_ms, "Write did not complete within timeout");
                self.transport
                    .link()
                    .abandon_stream("write stalled")
                    .await;
                return Err(DeviceError::ResponseTimeout { timeout_ms });
            }
        }

        let Some(response) = response else {
            return Ok(Vec::new());
        };

        match tokio::time::timeout_at(deadline, response).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => Err(DeviceError::Transport(
                "Response channel closed".to_string(),
            )),
            Err(_) => {
                self.exchange.slot().take();
                warn!(device_id = %self.device_id, timeout_ms, "No response within timeout");
                Err(DeviceError::ResponseTimeout { timeout_ms })
            }
        }
    }
}
