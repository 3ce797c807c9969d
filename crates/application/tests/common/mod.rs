#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use domain::{DeviceEvent, EventPublisher};

pub const WAIT: Duration = Duration::from_secs(5);

/// Publisher that keeps every event for later assertions
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DeviceEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn connection_changes(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DeviceEvent::ConnectionChanged { connected, .. } => Some(connected),
                _ => None,
            })
            .collect()
    }

    pub fn serial_numbers(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DeviceEvent::SnReceived { serial_number, .. } => Some(serial_number),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        event: DeviceEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Poll `condition` until it holds or `WAIT` elapses
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
