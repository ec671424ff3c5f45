use indexmap::IndexMap;

use crate::device::types::{DeviceId, DiscoveredDevice};

/// Peripherals discovered during the current scan session, in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: IndexMap<DeviceId, DiscoveredDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        DeviceRegistry::default()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// Returns false if a device with the same id was already known; the existing entry is kept
    /// untouched.
    pub fn add(&mut self, candidate: DiscoveredDevice) -> bool {
        if self.devices.contains_key(&candidate.id) {
            return false;
        }

        self.devices.insert(candidate.id.clone(), candidate);
        true
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DiscoveredDevice> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.devices.values()
    }

    pub fn to_vec(&self) -> Vec<DiscoveredDevice> {
        self.devices.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
