//! Devices seen during scanning, deduplicated by identifier.

use crate::domain::models::Peripheral;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Peripheral>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peripheral unless it is unnamed or its id is already known.
    /// Known entries are never updated. Returns true if it was added.
    pub fn add(&mut self, peripheral: Peripheral) -> bool {
        if peripheral.name.is_empty() {
            return false;
        }
        if self.contains(&peripheral.id) {
            return false;
        }
        debug!("Registered {} ({})", peripheral.name, peripheral.id);
        self.devices.push(peripheral);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.iter().any(|d| d.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Peripheral> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// All devices, in the order they were first seen
    pub fn devices(&self) -> &[Peripheral] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
