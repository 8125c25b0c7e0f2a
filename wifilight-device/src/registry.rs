//! Device registry
//!
//! Owns the running device tasks, keyed by device id

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::device::{DeviceConfig, LightDevice};
use crate::error::DeviceError;
use crate::store::StateStore;

/// Running devices sharing one state store
pub struct DeviceRegistry {
    devices: BTreeMap<String, LightDevice>,
    store: Arc<dyn StateStore>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            devices: BTreeMap::new(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Start a device task. A device with the same id is shut down first.
    pub async fn spawn(&mut self, config: DeviceConfig) -> Result<LightDevice, DeviceError> {
        if let Some(old) = self.devices.remove(&config.id) {
            warn!(id = %config.id, "replacing running device");
            // Already gone is fine
            let _ = old.shutdown().await;
        }
        info!(id = %config.id, family = %config.family, host = %config.host, port = config.port, "starting device");
        let device = LightDevice::spawn(config, self.store.clone())?;
        self.devices.insert(device.id().to_string(), device.clone());
        Ok(device)
    }

    /// Register a device spawned elsewhere, e.g. on a custom connector
    pub fn insert(&mut self, device: LightDevice) {
        self.devices.insert(device.id().to_string(), device);
    }

    pub fn get(&self, id: &str) -> Option<&LightDevice> {
        self.devices.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn devices(&self) -> impl Iterator<Item = &LightDevice> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Stop every device and close its connection
    pub async fn shutdown_all(&mut self) {
        for (id, device) in std::mem::take(&mut self.devices) {
            if let Err(e) = device.shutdown().await {
                warn!(id = %id, error = %e, "device did not shut down cleanly");
            }
        }
    }
}
