mod common;

use std::sync::Arc;

use application::DeviceManager;
use common::{RecordingPublisher, wait_until};
use domain::{DeviceConfig, DeviceError};
use infrastructure::{ConnectorRegistry, EmulatorServer, MewtocolEmulator};

fn plc(id: &str, port: u16) -> DeviceConfig {
    DeviceConfig::new(id, "TcpClient", "Mewtocol", "127.0.0.1", port as u32)
}

#[tokio::test]
async fn test_manager_lifecycle() {
    let server = EmulatorServer::bind("127.0.0.1:0", MewtocolEmulator::default())
        .await
        .unwrap();
    let port = server.local_addr().port();
    let manager = DeviceManager::new(ConnectorRegistry::with_defaults(), RecordingPublisher::new());

    let mut disabled = plc("plc-off", port);
    disabled.enabled = false;
    let started = manager
        .start_devices(vec![
            plc("plc-a", port),
            plc("plc-b", port),
            disabled,
            DeviceConfig::new("bad", "Udp", "Mewtocol", "127.0.0.1", 1),
        ])
        .await;
    assert_eq!(started, vec!["plc-a".to_string(), "plc-b".to_string()]);
    assert_eq!(manager.device_ids(), vec!["plc-a".to_string(), "plc-b".to_string()]);

    wait_until("both devices connected", || {
        manager.connection_summary() == vec![("plc-a".to_string(), true), ("plc-b".to_string(), true)]
    })
    .await;

    let a = manager.get("plc-a").unwrap();
    assert!(a.write_uint16(1, &[11]).await.is_success());
    let b = manager.get("plc-b").unwrap();
    assert_eq!(b.read_uint16(1, 1).await.into_value(), Some(vec![11]));

    assert!(matches!(
        manager.add_device(plc("plc-a", port)).await,
        Err(DeviceError::InvalidConfiguration(_))
    ));

    // Unchanged configuration keeps the running device
    let same = manager.replace_device(plc("plc-a", port)).await.unwrap();
    assert!(Arc::ptr_eq(&same, &a));

    // Changed configuration rebuilds it
    let rebuilt = manager
        .replace_device(plc("plc-a", port).with_timeout_ms(250))
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&rebuilt, &a));
    assert!(!a.is_connected());
    assert_eq!(rebuilt.config().timeout_ms, 250);

    assert!(manager.remove("plc-b").await);
    assert!(!manager.remove("plc-b").await);
    assert_eq!(manager.len(), 1);

    manager.stop_all().await;
    assert!(manager.is_empty());
    assert!(!rebuilt.is_connected());

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_of_one_id_build_one_device() {
    let server = EmulatorServer::bind("127.0.0.1:0", MewtocolEmulator::default())
        .await
        .unwrap();
    let port = server.local_addr().port();
    let manager = Arc::new(DeviceManager::new(
        ConnectorRegistry::with_defaults(),
        RecordingPublisher::new(),
    ));

    let adds: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.add_device(plc("plc-dup", port)).await })
        })
        .collect();

    let mut added = Vec::new();
    for add in adds {
        if let Ok(device) = add.await.unwrap() {
            added.push(device);
        }
    }
    assert_eq!(added.len(), 1);
    assert_eq!(manager.len(), 1);
    assert!(Arc::ptr_eq(&added[0], &manager.get("plc-dup").unwrap()));

    manager.stop_all().await;
    server.shutdown().await;
}
