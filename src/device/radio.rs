use std::fmt::Debug;
use uuid::Uuid;

use crate::device::types::DeviceId;
use crate::error::DeviceError;

/// A discovered GATT service or characteristic, identified by its UUID.
pub trait GattAttribute {
    fn uuid(&self) -> Uuid;
}

/// The radio stack, as seen by the connection state machine.
///
/// Every `request_*` call must return immediately. Outcomes are reported later as
/// [`RadioEvent`]s on the channel the radio was created with, in the order they happened.
pub trait Radio {
    type Peripheral: Clone + Debug + Send + 'static;
    type Service: GattAttribute + Clone + Debug + Send + 'static;
    type Characteristic: GattAttribute + Clone + Debug + Send + 'static;

    fn request_scan(&mut self, service_filter: Uuid);

    fn request_stop_scan(&mut self);

    fn lookup_peripheral(&self, id: &DeviceId) -> Option<Self::Peripheral>;

    fn request_connect(&mut self, peripheral: &Self::Peripheral);

    fn request_disconnect(&mut self, peripheral: &Self::Peripheral);

    fn request_discover_services(&mut self, peripheral: &Self::Peripheral, services: &[Uuid]);

    fn request_discover_characteristics(
        &mut self,
        peripheral: &Self::Peripheral,
        service: &Self::Service,
        characteristics: &[Uuid],
    );

    fn request_set_notify(
        &mut self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
        enabled: bool,
    );

    fn request_write(
        &mut self,
        peripheral: &Self::Peripheral,
        characteristic: &Self::Characteristic,
        value: &[u8],
        ack_required: bool,
    );
}

/// Asynchronous notifications from the radio stack.
#[derive(Debug)]
pub enum RadioEvent<S, C> {
    StateChanged {
        powered_on: bool,
    },
    PeripheralDiscovered {
        id: DeviceId,
        name: Option<String>,
        rssi: i16,
    },
    Connected {
        id: DeviceId,
    },
    Disconnected {
        id: DeviceId,
        error: Option<DeviceError>,
    },
    ServicesDiscovered {
        id: DeviceId,
        services: Result<Vec<S>, DeviceError>,
    },
    CharacteristicsDiscovered {
        id: DeviceId,
        characteristics: Result<Vec<C>, DeviceError>,
    },
    ValueUpdated {
        id: DeviceId,
        characteristic: Uuid,
        value: Result<Vec<u8>, DeviceError>,
    },
}

pub type RadioEventFor<R> = RadioEvent<<R as Radio>::Service, <R as Radio>::Characteristic>;
