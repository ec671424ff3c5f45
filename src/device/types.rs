use std::fmt;
use serde::{Deserialize, Serialize};

use crate::device::constants::{STATUS_PLACEHOLDER, UNKNOWN_DEVICE_NAME};

/// Opaque, platform assigned identifier of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        DeviceId::new(value)
    }
}

/// A peripheral seen during the current scan session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub name: String,
    pub rssi: i16,
}

impl DiscoveredDevice {
    pub fn new(id: DeviceId, advertised_name: Option<String>, rssi: i16) -> Self {
        let name = advertised_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());

        DiscoveredDevice { id, name, rssi }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    /// Service discovery finished but the peripheral does not expose the expected service.
    ServiceMissing,
    /// Characteristic discovery finished without the command characteristic.
    CommandCharacteristicMissing,
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            StallReason::ServiceMissing => "service not found",
            StallReason::CommandCharacteristicMissing => "command characteristic not found",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Scanning,
    /// A connect request is outstanding, or the link is up and services are being discovered.
    Connecting,
    ServicesDiscovered,
    Ready,
    /// The link is up but the handshake can not make further progress.
    Stalled(StallReason),
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionPhase::Idle => write!(f, "Idle"),
            ConnectionPhase::Scanning => write!(f, "Scanning…"),
            ConnectionPhase::Connecting => write!(f, "Connecting…"),
            ConnectionPhase::ServicesDiscovered => write!(f, "Discovering characteristics…"),
            ConnectionPhase::Ready => write!(f, "Ready"),
            ConnectionPhase::Stalled(reason) => write!(f, "Stalled ({})", reason),
        }
    }
}

/// Everything the presentation layer may observe, published as one consistent value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub radio_ready: bool,
    pub scanning: bool,
    pub connected: bool,
    pub phase: ConnectionPhase,
    pub devices: Vec<DiscoveredDevice>,
    pub status_text: String,
}

impl Snapshot {
    pub fn connection_label(&self) -> &'static str {
        if self.scanning {
            return "Scanning…";
        }

        if self.connected { "Connected" } else { "Not connected" }
    }

    /// Whether a peripheral is linked, including one that is still connecting.
    pub fn has_link(&self) -> bool {
        !matches!(self.phase, ConnectionPhase::Idle | ConnectionPhase::Scanning)
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            radio_ready: false,
            scanning: false,
            connected: false,
            phase: ConnectionPhase::Idle,
            devices: Vec::new(),
            status_text: STATUS_PLACEHOLDER.to_string(),
        }
    }
}
