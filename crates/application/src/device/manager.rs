use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{error, info, warn};

use domain::event::EventPublisher;
use domain::{DeviceConfig, DeviceError};
use infrastructure::ConnectorRegistry;

use super::Device;

/// Owns every running device, keyed by device id
pub struct DeviceManager {
    registry: ConnectorRegistry,
    devices: DashMap<String, Arc<Device>>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl DeviceManager {
    pub fn new(registry: ConnectorRegistry, event_publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            registry,
            devices: DashMap::new(),
            event_publisher,
        }
    }

    /// Build and start every enabled device. Returns the ids that were started.
    pub async fn start_devices(&self, configs: Vec<DeviceConfig>) -> Vec<String> {
        let mut started = Vec::new();
        for config in configs {
            if !config.enabled {
                info!(device_id = %config.id, "Skipping disabled device");
                continue;
            }
            let id = config.id.clone();
            match self.add_device(config).await {
                Ok(_) => started.push(id),
                Err(e) => error!(device_id = %id, "Failed to create device: {}", e),
            }
        }
        started
    }

    /// Build a device and start its first open attempt in the background
    pub async fn add_device(&self, config: DeviceConfig) -> Result<Arc<Device>, DeviceError> {
        // The entry guard keeps a concurrent add of the same id out until we insert.
        let device = match self.devices.entry(config.id.clone()) {
            Entry::Occupied(_) => {
                warn!(device_id = %config.id, "Device already running");
                return Err(DeviceError::InvalidConfiguration(format!(
                    "device {} already exists",
                    config.id
                )));
            }
            Entry::Vacant(slot) => {
                let device =
                    Device::from_registry(config, &self.registry, self.event_publisher.clone())?;
                slot.insert(Arc::clone(&device));
                device
            }
        };

        let starting = Arc::clone(&device);
        tokio::spawn(async move {
            starting.start().await;
        });
        Ok(device)
    }

    /// Apply a changed configuration by closing and rebuilding the device
    pub async fn replace_device(&self, config: DeviceConfig) -> Result<Arc<Device>, DeviceError> {
        if let Some(current) = self.get(&config.id) {
            if current.config() == &config {
                return Ok(current);
            }
            info!(device_id = %config.id, "Configuration changed, rebuilding device");
            self.remove(&config.id).await;
        }
        self.add_device(config).await
    }

    pub fn get(&self, id: &str) -> Option<Arc<Device>> {
        self.devices.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Close and forget one device
    pub async fn remove(&self, id: &str) -> bool {
        match self.devices.remove(id) {
            Some((_, device)) => {
                device.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.devices.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            info!(device_id = %id, "Stopping device");
            self.remove(&id).await;
        }
    }

    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// `(id, connected)` for every device, sorted by id
    pub fn connection_summary(&self) -> Vec<(String, bool)> {
        let mut summary: Vec<(String, bool)> = self
            .devices
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().is_connected()))
            .collect();
        summary.sort();
        summary
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
