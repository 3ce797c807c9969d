mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::Device;
use async_trait::async_trait;
use common::{RecordingPublisher, wait_until};
use domain::{ConnectionState, DeviceConfig, DeviceError, TransportKind};
use infrastructure::protocol::MewtocolAdapter;
use infrastructure::transport::{Link, PeerLoss};
use infrastructure::{Connector, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

// --- Transport with fault injection ---

struct FlakyTransport {
    link: Arc<Link>,
    // Number of connect() calls that fail before one succeeds
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
    // How long each connect() takes before it attaches
    delay: Duration,
    peers: Mutex<Vec<DuplexStream>>,
}

impl FlakyTransport {
    fn new(failures: usize) -> Arc<Self> {
        Self::build(failures, Duration::ZERO)
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Self::build(0, delay)
    }

    fn build(failures: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            link: Link::new("flaky", PeerLoss::Disconnect),
            failures_left: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            delay,
            peers: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn take_peer(&self) -> DuplexStream {
        self.peers.lock().unwrap().pop().expect("no peer attached")
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::TcpClient
    }

    fn link(&self) -> &Arc<Link> {
        &self.link
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(DeviceError::Transport("simulated connect failure".into()));
        }
        tokio::time::sleep(self.delay).await;
        let (ours, theirs) = tokio::io::duplex(1024);
        self.peers.lock().unwrap().push(theirs);
        if !self.link.attach(ours).await {
            return Err(DeviceError::Transport("closed while connecting".into()));
        }
        Ok(())
    }
}

fn device(transport: Arc<FlakyTransport>, publisher: Arc<RecordingPublisher>) -> Arc<Device> {
    let config = DeviceConfig::new("plc-flaky", "TcpClient", "Mewtocol", "127.0.0.1", 1)
        .with_timeout_ms(500);
    let connector = Connector {
        transport,
        adapter: Box::new(MewtocolAdapter::default()),
    };
    Device::new(config, connector, publisher).unwrap()
}

#[tokio::test]
async fn test_failed_first_open_keeps_retrying() {
    let transport = FlakyTransport::new(3);
    let publisher = RecordingPublisher::new();
    let device = device(transport.clone(), publisher.clone());

    assert!(!device.start().await);
    wait_until("reconnect after injected failures", || device.is_connected()).await;

    assert_eq!(transport.attempts(), 4);
    assert_eq!(publisher.connection_changes().last(), Some(&true));
    wait_until("supervisor idle", || !device.is_reconnecting()).await;

    device.close().await;
}

#[tokio::test]
async fn test_peer_loss_fails_waiting_command_and_reconnects() {
    let transport = FlakyTransport::new(0);
    let publisher = RecordingPublisher::new();
    let device = device(transport.clone(), publisher.clone());
    assert!(device.start().await);

    let mut peer = transport.take_peer();
    let pending = {
        let device = Arc::clone(&device);
        tokio::spawn(async move { device.read_uint16(0, 1).await })
    };

    // Swallow the request, then drop the link instead of answering
    let mut request = [0u8; 32];
    let n = peer.read(&mut request).await.unwrap();
    assert_eq!(&request[..n], b"<01#RDD0000000000**\r");
    drop(peer);

    let result = pending.await.unwrap();
    assert!(!result.is_success());
    assert_eq!(result.code(), DeviceError::Transport(String::new()).code());

    wait_until("second link", || transport.attempts() == 2 && device.is_connected()).await;
    assert_eq!(publisher.connection_changes(), vec![true, false, true]);

    // The fresh link serves commands again
    let mut peer = transport.take_peer();
    let responder = tokio::spawn(async move {
        let mut request = [0u8; 32];
        peer.read(&mut request).await.unwrap();
        peer.write_all(b"<01$RD2A00**\r").await.unwrap();
        peer
    });
    assert_eq!(device.read_uint16(0, 1).await.into_value(), Some(vec![42]));
    let _peer = responder.await.unwrap();

    device.close().await;
}

#[tokio::test]
async fn test_close_stops_reconnecting() {
    let transport = FlakyTransport::new(usize::MAX);
    let device = device(transport.clone(), RecordingPublisher::new());

    assert!(!device.start().await);
    wait_until("reconnect loop running", || device.is_reconnecting()).await;

    device.close().await;
    wait_until("reconnect loop stopped", || !device.is_reconnecting()).await;
    let attempts = transport.attempts();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(transport.attempts(), attempts);
}

#[tokio::test]
async fn test_close_during_slow_connect_stays_closed() {
    let transport = FlakyTransport::slow(Duration::from_millis(200));
    let publisher = RecordingPublisher::new();
    let device = device(transport.clone(), publisher.clone());

    let starting = {
        let device = Arc::clone(&device);
        tokio::spawn(async move { device.start().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    device.close().await;

    assert!(!starting.await.unwrap());
    assert!(!device.is_connected());
    assert_eq!(device.state(), ConnectionState::Disconnected);

    // The late stream was dropped rather than attached
    let mut peer = transport.take_peer();
    let mut buf = [0u8; 8];
    assert_eq!(peer.read(&mut buf).await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(!device.is_connected());
    assert!(!device.is_reconnecting());
    assert_eq!(transport.attempts(), 1);
    assert!(!publisher.connection_changes().contains(&true));
}
