use std::collections::HashSet;
use log::debug;
use uuid::Uuid;

use crate::device::constants::{make_esp32_service_uuid, RSSI_UNAVAILABLE};
use crate::device::radio::RadioEvent;
use crate::device::types::DeviceId;
use crate::error::DeviceError;

/// Turns an advertisement into a discovery event. Some environments ignore the scan filter, so
/// advertisements that do not list the ESP32 service are dropped here.
pub fn advertisement<S, C>(
    id: DeviceId,
    local_name: Option<String>,
    rssi: Option<i16>,
    services: &[Uuid],
) -> Option<RadioEvent<S, C>> {
    if !services.contains(&make_esp32_service_uuid()) {
        return None;
    }

    Some(RadioEvent::PeripheralDiscovered {
        id,
        name: local_name,
        rssi: rssi.unwrap_or(RSSI_UNAVAILABLE),
    })
}

/// Link transitions reported so far, per peripheral.
///
/// The adapter and the outcome of our own connect/disconnect requests both learn about the same
/// physical transition. Everything goes through here so the controller hears about each one
/// exactly once: the adapter is the source of truth for links that came up, request outcomes only
/// fill in for links the adapter never reported.
#[derive(Debug, Default)]
pub struct LinkReports {
    connected: HashSet<DeviceId>,
}

impl LinkReports {
    pub fn new() -> Self {
        LinkReports::default()
    }

    pub fn is_connected(&self, id: &DeviceId) -> bool {
        self.connected.contains(id)
    }

    /// The adapter reported the peripheral connected.
    pub fn adapter_connected<S, C>(&mut self, id: DeviceId) -> Option<RadioEvent<S, C>> {
        if !self.connected.insert(id.clone()) {
            debug!("Suppressing repeated connect of {}", id);
            return None;
        }

        Some(RadioEvent::Connected { id })
    }

    /// The adapter reported the peripheral disconnected.
    pub fn adapter_disconnected<S, C>(&mut self, id: DeviceId) -> Option<RadioEvent<S, C>> {
        if !self.connected.remove(&id) {
            debug!("Suppressing repeated disconnect of {}", id);
            return None;
        }

        Some(RadioEvent::Disconnected { id, error: None })
    }

    /// A connect request failed; the pending link has to be released.
    pub fn connect_failed<S, C>(&mut self, id: DeviceId, error: DeviceError) -> RadioEvent<S, C> {
        self.connected.remove(&id);
        RadioEvent::Disconnected { id, error: Some(error) }
    }

    /// A disconnect request completed. Links the adapter reported as connected get their
    /// disconnect from the adapter; a link that never came up gets none, so report it here.
    pub fn disconnect_completed<S, C>(&mut self, id: DeviceId) -> Option<RadioEvent<S, C>> {
        if self.connected.contains(&id) {
            return None;
        }

        Some(RadioEvent::Disconnected { id, error: None })
    }
}
