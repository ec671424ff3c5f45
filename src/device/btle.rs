use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::{channel, Receiver, Sender};
use btleplug::api::{Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{EVENT_CHANNEL_SIZE, WRITE_DEADLINE};
use crate::device::radio::{GattAttribute, Radio, RadioEvent};
use crate::device::reports::{advertisement, LinkReports};
use crate::device::types::DeviceId;
use crate::error::DeviceError;

pub type BtleEvent = RadioEvent<Service, Characteristic>;

type PeripheralTable = Arc<Mutex<HashMap<DeviceId, Peripheral>>>;
type NotificationTable = Arc<Mutex<HashMap<DeviceId, CancellationToken>>>;
type SharedReports = Arc<Mutex<LinkReports>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn stop_notifications(tasks: &NotificationTable, id: &DeviceId) {
    if let Some(token) = lock(tasks).remove(id) {
        token.cancel();
    }
}

impl GattAttribute for Service {
    fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl GattAttribute for Characteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }
}

fn device_id(id: &PeripheralId) -> DeviceId {
    DeviceId::new(id.to_string())
}

async fn forward(sender: &mut Sender<BtleEvent>, event: BtleEvent) -> bool {
    match sender.send(event).await {
        Ok(()) => true,
        Err(err) => {
            debug!("Dropping radio event, the controller is gone: {}", err);
            false
        },
    }
}

/// [`Radio`] backed by the first btleplug adapter of this machine.
///
/// Requests are carried out on spawned tasks; their outcomes, together with the adapter's own
/// events, are delivered on the receiver returned by [`BtleRadio::new`].
pub struct BtleRadio {
    adapter: Adapter,
    sender: Sender<BtleEvent>,
    peripherals: PeripheralTable,
    notification_tasks: NotificationTable,
    reports: SharedReports,
    cancel: CancellationToken,
    event_task: JoinHandle<Result<(), DeviceError>>,
}

impl BtleRadio {
    pub async fn new(cancel: CancellationToken) -> Result<(BtleRadio, Receiver<BtleEvent>), DeviceError> {
        let manager = Manager::new().await?;
        let adapter = manager.adapters().await?
            .into_iter()
            .next()
            .ok_or(DeviceError::NoAdapter)?;

        info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

        let (sender, receiver) = channel::<BtleEvent>(EVENT_CHANNEL_SIZE);
        let peripherals: PeripheralTable = Arc::new(Mutex::new(HashMap::new()));
        let notification_tasks: NotificationTable = Arc::new(Mutex::new(HashMap::new()));
        let reports: SharedReports = Arc::new(Mutex::new(LinkReports::new()));
        let event_task = central_events_task(
            cancel.child_token(),
            adapter.clone(),
            peripherals.clone(),
            notification_tasks.clone(),
            reports.clone(),
            sender.clone(),
        );

        let radio = BtleRadio {
            adapter,
            sender,
            peripherals,
            notification_tasks,
            reports,
            cancel,
            event_task,
        };

        Ok((radio, receiver))
    }

    pub fn is_running(&self) -> bool {
        !self.event_task.is_finished()
    }

    fn stop_notifications(&mut self, id: &DeviceId) {
        stop_notifications(&self.notification_tasks, id);
    }
}

impl Drop for BtleRadio {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Radio for BtleRadio {
    type Peripheral = Peripheral;
    type Service = Service;
    type Characteristic = Characteristic;

    fn request_scan(&mut self, service_filter: Uuid) {
        let adapter = self.adapter.clone();
        let filter = ScanFilter {
            services: vec![service_filter],
        };

        spawn(async move {
            if let Err(err) = adapter.start_scan(filter).await {
                let err = DeviceError::from(err);
                if err.is_permission_denied() {
                    warn!("Not allowed to access Bluetooth: {}", err);
                } else {
                    warn!("Scanning failed: {}", err);
                }
            }
        });
    }

    fn request_stop_scan(&mut self) {
        let adapter = self.adapter.clone();

        spawn(async move {
            if let Err(err) = adapter.stop_scan().await {
                warn!("Failed to stop scanning: {}", err);
            }
        });
    }

    fn lookup_peripheral(&self, id: &DeviceId) -> Option<Peripheral> {
        lock(&self.peripherals).get(id).cloned()
    }

    fn request_connect(&mut self, peripheral: &Peripheral) {
        let peripheral = peripheral.clone();
        let reports = self.reports.clone();
        let mut sender = self.sender.clone();

        spawn(async move {
            let id = device_id(&peripheral.id());
            // success is reported by the adapter
            if let Err(err) = peripheral.connect().await {
                warn!("Connecting to peripheral {} failed: {}", id, err);
                let event = lock(&reports).connect_failed(id, err.into());
                forward(&mut sender, event).await;
            }
        });
    }

    fn request_disconnect(&mut self, peripheral: &Peripheral) {
        let peripheral = peripheral.clone();
        let reports = self.reports.clone();
        let mut sender = self.sender.clone();
        self.stop_notifications(&device_id(&peripheral.id()));

        spawn(async move {
            let id = device_id(&peripheral.id());
            match peripheral.disconnect().await {
                Ok(()) => {
                    let event = lock(&reports).disconnect_completed(id);
                    if let Some(event) = event {
                        forward(&mut sender, event).await;
                    }
                },
                Err(err) => warn!("Disconnecting from peripheral {} failed: {}", id, err),
            }
        });
    }

    fn request_discover_services(&mut self, peripheral: &Peripheral, services: &[Uuid]) {
        let peripheral = peripheral.clone();
        let wanted = services.to_vec();
        let mut sender = self.sender.clone();

        spawn(async move {
            let id = device_id(&peripheral.id());
            let services = match peripheral.discover_services().await {
                Ok(()) => Ok(
                    peripheral.services()
                        .into_iter()
                        .filter(|service| wanted.contains(&service.uuid))
                        .collect()
                ),
                Err(err) => Err(err.into()),
            };
            forward(&mut sender, BtleEvent::ServicesDiscovered { id, services }).await;
        });
    }

    fn request_discover_characteristics(&mut self, peripheral: &Peripheral, service: &Service, characteristics: &[Uuid]) {
        // btleplug resolves characteristics together with their service
        let id = device_id(&peripheral.id());
        let characteristics: Vec<Characteristic> = service.characteristics
            .iter()
            .filter(|characteristic| characteristics.contains(&characteristic.uuid))
            .cloned()
            .collect();
        let mut sender = self.sender.clone();

        spawn(async move {
            forward(&mut sender, BtleEvent::CharacteristicsDiscovered { id, characteristics: Ok(characteristics) }).await;
        });
    }

    fn request_set_notify(&mut self, peripheral: &Peripheral, characteristic: &Characteristic, enabled: bool) {
        let id = device_id(&peripheral.id());

        if !enabled {
            self.stop_notifications(&id);
            let peripheral = peripheral.clone();
            let characteristic = characteristic.clone();
            spawn(async move {
                if let Err(err) = peripheral.unsubscribe(&characteristic).await {
                    warn!("Failed to unsubscribe from characteristic {}: {}", characteristic.uuid, err);
                }
            });
            return;
        }

        self.stop_notifications(&id);
        let token = self.cancel.child_token();
        lock(&self.notification_tasks).insert(id, token.clone());
        read_notifications_task(token, peripheral.clone(), characteristic.clone(), self.sender.clone());
    }

    fn request_write(&mut self, peripheral: &Peripheral, characteristic: &Characteristic, value: &[u8], ack_required: bool) {
        let peripheral = peripheral.clone();
        let characteristic = characteristic.clone();
        let value = value.to_vec();
        let write_type = if ack_required { WriteType::WithResponse } else { WriteType::WithoutResponse };

        spawn(async move {
            let fut = peripheral.write(&characteristic, &value, write_type);

            tokio::select! {
                _ = sleep(Duration::from_millis(WRITE_DEADLINE)) => {
                    warn!("Sending to command characteristic took too long");
                }
                result = fut => {
                    if let Err(err) = result {
                        warn!("Failed to send to command characteristic: {:?}", err);
                    }
                }
            };
        });
    }
}

async fn discovered_event(adapter: &Adapter, peripherals: &PeripheralTable, id: &PeripheralId) -> Option<BtleEvent> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(err) => {
            warn!("Failed to query BLE adapter for peripheral {}: {}", id, err);
            return None;
        },
    };

    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => {
            debug!("Peripheral {} has no properties", id);
            return None;
        },
        Err(err) => {
            warn!("Could not query peripheral {} for properties: {:?}", id, err);
            return None;
        },
    };

    let event = advertisement(device_id(id), properties.local_name, properties.rssi, &properties.services)?;
    lock(peripherals).insert(device_id(id), peripheral);
    Some(event)
}

fn central_events_task(
    cancel: CancellationToken,
    adapter: Adapter,
    peripherals: PeripheralTable,
    notification_tasks: NotificationTable,
    reports: SharedReports,
    mut sender: Sender<BtleEvent>,
) -> JoinHandle<Result<(), DeviceError>> {
    spawn(async move {
        let mut central_events = adapter.events().await?;

        let powered_on = match adapter.adapter_state().await {
            Ok(state) => matches!(state, CentralState::PoweredOn),
            Err(err) => {
                // an adapter exists, so assume it is usable
                warn!("Failed to query adapter state: {}", err);
                true
            },
        };
        if !forward(&mut sender, BtleEvent::StateChanged { powered_on }).await {
            return Ok(());
        }

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                central_event = central_events.next() => {
                    let event = match central_event {
                        None => {
                            warn!("Adapter event stream ended");
                            break 'mainloop;
                        },
                        Some(CentralEvent::StateUpdate(state)) => Some(BtleEvent::StateChanged {
                            powered_on: matches!(state, CentralState::PoweredOn),
                        }),
                        Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                            discovered_event(&adapter, &peripherals, &id).await
                        },
                        Some(CentralEvent::DeviceConnected(id)) => {
                            let event = lock(&reports).adapter_connected(device_id(&id));
                            event
                        },
                        Some(CentralEvent::DeviceDisconnected(id)) => {
                            let id = device_id(&id);
                            stop_notifications(&notification_tasks, &id);
                            let event = lock(&reports).adapter_disconnected(id);
                            event
                        },
                        Some(_) => None,
                    };

                    if let Some(event) = event {
                        if !forward(&mut sender, event).await {
                            break 'mainloop;
                        }
                    }
                },
            }
        }

        Ok(())
    })
}

fn read_notifications_task(
    cancel: CancellationToken,
    peripheral: Peripheral,
    characteristic: Characteristic,
    mut sender: Sender<BtleEvent>,
) -> JoinHandle<()> {
    spawn(async move {
        let id = device_id(&peripheral.id());

        // open the stream before subscribing so the first notification is not missed
        let mut notification_stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to open notification stream of {}: {}", id, err);
                return;
            },
        };

        if let Err(err) = peripheral.subscribe(&characteristic).await {
            warn!("Failed to subscribe to characteristic {}: {}", characteristic.uuid, err);
            forward(&mut sender, BtleEvent::ValueUpdated {
                id,
                characteristic: characteristic.uuid,
                value: Err(err.into()),
            }).await;
            return;
        }

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                data = notification_stream.next() => {
                    let data = match data {
                        Some(data) => data,
                        None => break 'mainloop,
                    };

                    let event = BtleEvent::ValueUpdated {
                        id: id.clone(),
                        characteristic: data.uuid,
                        value: Ok(data.value),
                    };
                    if !forward(&mut sender, event).await {
                        break 'mainloop;
                    }
                },
            }
        }

        debug!("Notification task for {} stopped", id);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopping_notifications_cancels_and_forgets_the_task() {
        let tasks: NotificationTable = Arc::new(Mutex::new(HashMap::new()));
        let token = CancellationToken::new();
        lock(&tasks).insert(DeviceId::from("A"), token.clone());
        lock(&tasks).insert(DeviceId::from("B"), CancellationToken::new());

        stop_notifications(&tasks, &DeviceId::from("A"));

        assert!(token.is_cancelled());
        assert!(!lock(&tasks).contains_key(&DeviceId::from("A")));
        assert!(lock(&tasks).contains_key(&DeviceId::from("B")));

        // unknown peripherals are fine
        stop_notifications(&tasks, &DeviceId::from("Z"));
    }
}
