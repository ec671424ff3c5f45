use log::{debug, info, warn};

use crate::config::types::ReconnectPolicy;
use crate::device::constants::{make_esp32_command_uuid, make_esp32_service_uuid, make_esp32_status_uuid};
use crate::device::radio::{GattAttribute, Radio, RadioEvent, RadioEventFor};
use crate::device::registry::DeviceRegistry;
use crate::device::status::{decode_status, display_status};
use crate::device::types::{ConnectionPhase, DeviceId, DiscoveredDevice, Snapshot, StallReason};
use crate::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    DiscoveringServices,
    DiscoveringCharacteristics,
    Ready,
    Stalled(StallReason),
}

struct ActiveConnection<R: Radio> {
    id: DeviceId,
    peripheral: R::Peripheral,
    command_char: Option<R::Characteristic>,
    status_char: Option<R::Characteristic>,
    handshake: Handshake,
}

enum Link<R: Radio> {
    Idle,
    Pending {
        id: DeviceId,
        peripheral: R::Peripheral,
    },
    Connected(ActiveConnection<R>),
}

impl<R: Radio> Link<R> {
    fn id(&self) -> Option<&DeviceId> {
        match self {
            Link::Idle => None,
            Link::Pending { id, .. } => Some(id),
            Link::Connected(connection) => Some(&connection.id),
        }
    }

    fn peripheral(&self) -> Option<&R::Peripheral> {
        match self {
            Link::Idle => None,
            Link::Pending { peripheral, .. } => Some(peripheral),
            Link::Connected(connection) => Some(&connection.peripheral),
        }
    }

    fn connection_mut(&mut self, id: &DeviceId) -> Option<&mut ActiveConnection<R>> {
        match self {
            Link::Connected(connection) if connection.id == *id => Some(connection),
            _ => {
                debug!("Ignoring event for {}: not connected to it", id);
                None
            },
        }
    }
}

/// Owns the (single) link to a peripheral and drives the scan, connect, discover and subscribe
/// handshake. Operations only issue requests to the radio; state changes happen when the
/// corresponding [`RadioEvent`] is handled.
pub struct ConnectionStateMachine<R: Radio> {
    radio: R,
    policy: ReconnectPolicy,
    radio_ready: bool,
    scanning: bool,
    registry: DeviceRegistry,
    link: Link<R>,
    // connect target waiting for the current link to go down (ReconnectPolicy::ReplaceExisting)
    queued: Option<(DeviceId, R::Peripheral)>,
    // pending link that was dropped while its connect request may still complete
    released: Option<DeviceId>,
    status_text: Option<String>,
}

impl<R: Radio> ConnectionStateMachine<R> {
    pub fn new(radio: R, policy: ReconnectPolicy) -> Self {
        ConnectionStateMachine {
            radio,
            policy,
            radio_ready: false,
            scanning: false,
            registry: DeviceRegistry::new(),
            link: Link::Idle,
            queued: None,
            released: None,
            status_text: None,
        }
    }

    pub fn start_scan(&mut self) {
        if !self.radio_ready {
            debug!("Not scanning: radio is not ready");
            return;
        }

        info!("Starting scan");
        self.registry.clear();
        self.scanning = true;
        self.radio.request_scan(make_esp32_service_uuid());
    }

    pub fn stop_scan(&mut self) {
        if self.scanning {
            info!("Stopping scan");
        }
        self.scanning = false;
        self.radio.request_stop_scan();
    }

    pub fn connect(&mut self, id: &DeviceId) {
        let peripheral = match self.radio.lookup_peripheral(id) {
            Some(peripheral) => peripheral,
            None => {
                debug!("Not connecting: peripheral {} is unknown to the radio", id);
                return;
            },
        };

        if let Some(current) = self.link.peripheral().cloned() {
            match self.policy {
                ReconnectPolicy::Reject => {
                    info!("Ignoring connect to {}: already linked to {}", id, self.describe_link());
                },
                ReconnectPolicy::ReplaceExisting => {
                    if self.link.id() == Some(id) {
                        debug!("Already linked to {}", id);
                        return;
                    }

                    info!("Replacing link to {} with {}", self.describe_link(), id);
                    self.stop_scan();
                    self.queued = Some((id.clone(), peripheral));
                    self.radio.request_disconnect(&current);
                },
            }
            return;
        }

        self.stop_scan();
        info!("Connecting to {}", id);
        if self.released.as_ref() == Some(id) {
            self.released = None;
        }
        self.radio.request_connect(&peripheral);
        self.link = Link::Pending { id: id.clone(), peripheral };
    }

    pub fn disconnect(&mut self) {
        if self.queued.take().is_some() {
            debug!("Dropping queued connect");
        }

        match self.link.peripheral() {
            Some(peripheral) => {
                info!("Disconnecting from {}", self.describe_link());
                self.radio.request_disconnect(peripheral);
            },
            None => debug!("Not disconnecting: no peripheral"),
        }
    }

    pub fn send(&mut self, text: &str) {
        let (peripheral, command_char) = match &self.link {
            Link::Connected(ActiveConnection { peripheral, command_char: Some(command_char), .. }) => {
                (peripheral, command_char)
            },
            _ => {
                debug!("Dropping command {:?}: no command characteristic", text);
                return;
            },
        };

        debug!("Sending command {:?}", text);
        self.radio.request_write(peripheral, command_char, text.as_bytes(), false);
    }

    pub fn handle_event(&mut self, event: RadioEventFor<R>) {
        match event {
            RadioEvent::StateChanged { powered_on } => self.on_state_changed(powered_on),
            RadioEvent::PeripheralDiscovered { id, name, rssi } => {
                if !self.scanning {
                    debug!("Ignoring advertisement from {} outside of a scan", id);
                    return;
                }

                let device = DiscoveredDevice::new(id, name, rssi);
                let description = format!("{} {:?} {}", device.id, device.name, device.rssi);
                if self.registry.add(device) {
                    info!("Discovered peripheral {}", description);
                }
            },
            RadioEvent::Connected { id } => self.on_connected(id),
            RadioEvent::Disconnected { id, error } => self.on_disconnected(id, error),
            RadioEvent::ServicesDiscovered { id, services } => self.on_services_discovered(id, services),
            RadioEvent::CharacteristicsDiscovered { id, characteristics } => {
                self.on_characteristics_discovered(id, characteristics)
            },
            RadioEvent::ValueUpdated { id, characteristic, value } => {
                let connection = match self.link.connection_mut(&id) {
                    Some(connection) => connection,
                    None => return,
                };

                let value = match value {
                    Ok(value) => value,
                    Err(err) => {
                        warn!("Failed to receive value of {} from {}: {}", characteristic, connection.id, err);
                        return;
                    },
                };

                if characteristic != make_esp32_status_uuid() {
                    debug!("Ignoring update of characteristic {}", characteristic);
                    return;
                }

                let text = decode_status(&value);
                debug!("Status update {:?}", text);
                self.status_text = Some(text);
            },
        }
    }

    fn on_state_changed(&mut self, powered_on: bool) {
        info!("Radio is {}", if powered_on { "ready" } else { "not ready" });
        self.radio_ready = powered_on;

        if !powered_on && self.scanning {
            self.scanning = false;
        }
    }

    fn on_connected(&mut self, id: DeviceId) {
        let peripheral = match &self.link {
            Link::Pending { id: pending_id, peripheral } if *pending_id == id => peripheral.clone(),
            _ => {
                self.on_unowned_connect(id);
                return;
            },
        };

        info!("Connected to {}; Discovering services...", id);
        self.radio.request_discover_services(&peripheral, &[make_esp32_service_uuid()]);
        self.link = Link::Connected(ActiveConnection {
            id,
            peripheral,
            command_char: None,
            status_char: None,
            handshake: Handshake::DiscoveringServices,
        });
    }

    fn on_unowned_connect(&mut self, id: DeviceId) {
        if self.released.as_ref() != Some(&id) {
            debug!("Ignoring connect of {}: not the pending peripheral", id);
            return;
        }

        self.released = None;
        match self.radio.lookup_peripheral(&id) {
            Some(peripheral) => {
                warn!("Connect to {} completed after it was given up; disconnecting", id);
                self.radio.request_disconnect(&peripheral);
            },
            None => warn!("Connect to {} completed after it was given up, but the peripheral is gone", id),
        }
    }

    fn on_services_discovered(&mut self, id: DeviceId, services: Result<Vec<R::Service>, DeviceError>) {
        let service_uuid = make_esp32_service_uuid();
        let connection = match self.link.connection_mut(&id) {
            Some(connection) => connection,
            None => return,
        };

        match connection.handshake {
            Handshake::DiscoveringServices | Handshake::Stalled(StallReason::ServiceMissing) => {},
            handshake => {
                debug!("Ignoring service discovery result while {:?}", handshake);
                return;
            },
        }

        let services = match services {
            Ok(services) => services,
            Err(err) => {
                warn!("Service discovery on {} failed: {}", id, err);
                return;
            },
        };

        match services.iter().find(|service| service.uuid() == service_uuid) {
            Some(service) => {
                info!("Discovering characteristics of service {}", service_uuid);
                self.radio.request_discover_characteristics(
                    &connection.peripheral,
                    service,
                    &[make_esp32_command_uuid(), make_esp32_status_uuid()],
                );
                connection.handshake = Handshake::DiscoveringCharacteristics;
            },
            None => {
                warn!("Peripheral {} does not expose service {}", id, service_uuid);
                connection.handshake = Handshake::Stalled(StallReason::ServiceMissing);
            },
        }
    }

    fn on_characteristics_discovered(
        &mut self,
        id: DeviceId,
        characteristics: Result<Vec<R::Characteristic>, DeviceError>,
    ) {
        let connection = match self.link.connection_mut(&id) {
            Some(connection) => connection,
            None => return,
        };

        match connection.handshake {
            Handshake::DiscoveringCharacteristics
            | Handshake::Stalled(StallReason::CommandCharacteristicMissing) => {},
            handshake => {
                debug!("Ignoring characteristic discovery result while {:?}", handshake);
                return;
            },
        }

        let characteristics = match characteristics {
            Ok(characteristics) => characteristics,
            Err(err) => {
                warn!("Characteristic discovery on {} failed: {}", id, err);
                return;
            },
        };

        for characteristic in characteristics {
            let uuid = characteristic.uuid();
            if uuid == make_esp32_command_uuid() {
                connection.command_char = Some(characteristic);
            } else if uuid == make_esp32_status_uuid() {
                connection.status_char = Some(characteristic);
            }
        }

        if let Some(status_char) = &connection.status_char {
            info!("Subscribing to characteristic {}", status_char.uuid());
            self.radio.request_set_notify(&connection.peripheral, status_char, true);
        } else {
            warn!("Peripheral {} has no status characteristic", id);
        }

        connection.handshake = if connection.command_char.is_some() {
            info!("Peripheral {} ready", id);
            Handshake::Ready
        } else {
            warn!("Peripheral {} has no command characteristic", id);
            Handshake::Stalled(StallReason::CommandCharacteristicMissing)
        };
    }

    fn on_disconnected(&mut self, id: DeviceId, error: Option<DeviceError>) {
        if self.link.id() != Some(&id) {
            debug!("Ignoring disconnect of {}: not the current peripheral", id);
            return;
        }

        match error {
            Some(err) => warn!("Disconnected from {}: {}", id, err),
            None => info!("Disconnected from {}", id),
        }

        // the only place where the link is torn down
        if let Link::Pending { .. } = self.link {
            self.released = Some(id);
        }
        self.link = Link::Idle;

        if let Some((queued_id, peripheral)) = self.queued.take() {
            info!("Connecting to {}", queued_id);
            self.radio.request_connect(&peripheral);
            self.link = Link::Pending { id: queued_id, peripheral };
        }
    }

    fn describe_link(&self) -> String {
        match self.link.id() {
            Some(id) => id.to_string(),
            None => "nothing".to_string(),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        match &self.link {
            Link::Idle if self.scanning => ConnectionPhase::Scanning,
            Link::Idle => ConnectionPhase::Idle,
            Link::Pending { .. } => ConnectionPhase::Connecting,
            Link::Connected(connection) => match connection.handshake {
                Handshake::DiscoveringServices => ConnectionPhase::Connecting,
                Handshake::DiscoveringCharacteristics => ConnectionPhase::ServicesDiscovered,
                Handshake::Ready => ConnectionPhase::Ready,
                Handshake::Stalled(reason) => ConnectionPhase::Stalled(reason),
            },
        }
    }

    pub fn is_radio_ready(&self) -> bool {
        self.radio_ready
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected(_))
    }

    pub fn can_send(&self) -> bool {
        matches!(self.link, Link::Connected(ActiveConnection { command_char: Some(_), .. }))
    }

    pub fn has_status_subscription(&self) -> bool {
        matches!(self.link, Link::Connected(ActiveConnection { status_char: Some(_), .. }))
    }

    pub fn connected_device(&self) -> Option<&DeviceId> {
        match &self.link {
            Link::Connected(connection) => Some(&connection.id),
            _ => None,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn status_text(&self) -> &str {
        display_status(self.status_text.as_deref())
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            radio_ready: self.radio_ready,
            scanning: self.scanning,
            connected: self.is_connected(),
            phase: self.phase(),
            devices: self.registry.to_vec(),
            status_text: self.status_text().to_string(),
        }
    }
}
