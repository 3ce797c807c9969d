use std::time::{Duration, Instant};

use domain::{ConnectionState, DeviceError};
use infrastructure::transport::{
    OPEN_FAILURE_BACKOFF, TcpClientTransport, TcpServerTransport, Transport, TransportEvent,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;

const WAIT: Duration = Duration::from_secs(2);

async fn next_event(events: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_peer(server: &TcpServerTransport) {
    let deadline = Instant::now() + WAIT;
    while !server.has_peer().await {
        assert!(Instant::now() < deadline, "peer never attached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_client_exchanges_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let transport = TcpClientTransport::new(addr.to_string(), WAIT);
    let mut events = transport.take_events().unwrap();
    assert!(transport.take_events().is_none());

    transport.initialize().await.unwrap();
    assert!(transport.open().await);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectionChanged(true)
    );
    assert_eq!(transport.state(), ConnectionState::Connected);

    let (mut peer, _) = listener.accept().await.unwrap();
    transport.send(b"<01#RDD0000000000**\r").await.unwrap();
    let mut buf = [0u8; 64];
    let n = peer.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"<01#RDD0000000000**\r");

    peer.write_all(b"<01$RD0000**\r").await.unwrap();
    let mut received = Vec::new();
    while received.len() < 13 {
        match next_event(&mut events).await {
            TransportEvent::MessageReceived(chunk) => received.extend_from_slice(&chunk),
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(received, b"<01$RD0000**\r");

    transport.close().await;
}

#[tokio::test]
async fn test_failed_open_backs_off_and_announces() {
    let port = free_port().await;
    let transport = TcpClientTransport::new(format!("127.0.0.1:{}", port), WAIT);
    let mut events = transport.take_events().unwrap();

    let started = Instant::now();
    assert!(!transport.open().await);
    assert!(started.elapsed() >= OPEN_FAILURE_BACKOFF);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectionChanged(false)
    );
    assert!(!transport.is_connected());
    assert!(matches!(
        transport.send(b"x").await,
        Err(DeviceError::NotConnected)
    ));
}

#[tokio::test]
async fn test_peer_loss_then_reopen() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let transport = TcpClientTransport::new(addr.to_string(), WAIT);
    let mut events = transport.take_events().unwrap();

    assert!(transport.open().await);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectionChanged(true)
    );

    let (peer, _) = listener.accept().await.unwrap();
    drop(peer);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectionChanged(false)
    );
    assert!(!transport.is_connected());

    transport.initialize().await.unwrap();
    assert!(transport.open().await);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectionChanged(true)
    );
    let (_peer, _) = listener.accept().await.unwrap();
    assert!(transport.is_connected());
    transport.close().await;
}

#[tokio::test]
async fn test_closed_transport_stays_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let transport = TcpClientTransport::new(listener.local_addr().unwrap().to_string(), WAIT);
    let mut events = transport.take_events().unwrap();

    assert!(transport.open().await);
    next_event(&mut events).await;

    transport.close().await;
    assert!(transport.is_closed());
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectionChanged(false)
    );
    assert!(!transport.open().await);
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_server_keeps_listening_across_peers() {
    let server = TcpServerTransport::new("127.0.0.1:0");
    let mut events = server.take_events().unwrap();

    server.initialize().await.unwrap();
    assert!(server.open().await);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::ConnectionChanged(true)
    );
    let addr = server.local_addr().unwrap();

    // Listening without a peer
    assert!(matches!(
        server.send(b"LON\r").await,
        Err(DeviceError::NotConnected)
    ));
    assert!(server.is_connected());

    let mut first = TcpStream::connect(addr).await.unwrap();
    wait_for_peer(&server).await;
    server.send(b"LON\r").await.unwrap();
    let mut buf = [0u8; 16];
    let n = first.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"LON\r");

    drop(first);
    let deadline = Instant::now() + WAIT;
    while server.has_peer().await {
        assert!(Instant::now() < deadline, "peer never detached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(server.is_connected());

    let mut second = TcpStream::connect(addr).await.unwrap();
    second.write_all(b"A79ZSN1Z97A").await.unwrap();
    match next_event(&mut events).await {
        TransportEvent::MessageReceived(chunk) => assert_eq!(&chunk[..], b"A79ZSN1Z97A"),
        other => panic!("unexpected {:?}", other),
    }

    server.close().await;
    assert!(!server.is_connected());
}
