#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::SinkExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use esp32_ble_control::config::types::ReconnectPolicy;
use esp32_ble_control::device::controller::{spawn_controller, ControllerHandle};
use esp32_ble_control::device::radio::{GattAttribute, Radio, RadioEvent};
use esp32_ble_control::device::types::{DeviceId, Snapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Scan(Uuid),
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    DiscoverServices(DeviceId, Vec<Uuid>),
    DiscoverCharacteristics(DeviceId, Uuid, Vec<Uuid>),
    SetNotify(DeviceId, Uuid, bool),
    Write(DeviceId, Uuid, Vec<u8>, bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute(pub Uuid);

impl GattAttribute for Attribute {
    fn uuid(&self) -> Uuid {
        self.0
    }
}

pub type Event = RadioEvent<Attribute, Attribute>;

/// Radio that records every request; the test plays the radio stack by sending events.
#[derive(Clone, Default)]
pub struct RecordingRadio {
    known: Arc<Mutex<Vec<DeviceId>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl RecordingRadio {
    pub fn knowing(ids: &[&str]) -> Self {
        let radio = RecordingRadio::default();
        radio.known.lock().unwrap().extend(ids.iter().map(|id| DeviceId::from(*id)));
        radio
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Request> {
        self.requests().into_iter()
            .filter(|request| matches!(request, Request::Write(..)))
            .collect()
    }

    fn record(&self, request: Request) {
        self.requests.lock().unwrap().push(request);
    }

    /// Polls until a recorded request matches `predicate`.
    pub async fn wait_for_request<F: Fn(&Request) -> bool>(&self, predicate: F) -> Request {
        for _ in 0..200 {
            if let Some(request) = self.requests().into_iter().find(|request| predicate(request)) {
                return request;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("request not issued; got {:?}", self.requests());
    }

    /// Polls until exactly `count` requests were recorded that match `predicate`.
    pub async fn wait_for_count<F: Fn(&Request) -> bool>(&self, count: usize, predicate: F) {
        for _ in 0..200 {
            if self.requests().iter().filter(|request| predicate(request)).count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} matching requests; got {:?}", count, self.requests());
    }
}

impl Radio for RecordingRadio {
    type Peripheral = DeviceId;
    type Service = Attribute;
    type Characteristic = Attribute;

    fn request_scan(&mut self, service_filter: Uuid) {
        self.record(Request::Scan(service_filter));
    }

    fn request_stop_scan(&mut self) {
        self.record(Request::StopScan);
    }

    fn lookup_peripheral(&self, id: &DeviceId) -> Option<DeviceId> {
        self.known.lock().unwrap().iter().find(|known| *known == id).cloned()
    }

    fn request_connect(&mut self, peripheral: &DeviceId) {
        self.record(Request::Connect(peripheral.clone()));
    }

    fn request_disconnect(&mut self, peripheral: &DeviceId) {
        self.record(Request::Disconnect(peripheral.clone()));
    }

    fn request_discover_services(&mut self, peripheral: &DeviceId, services: &[Uuid]) {
        self.record(Request::DiscoverServices(peripheral.clone(), services.to_vec()));
    }

    fn request_discover_characteristics(&mut self, peripheral: &DeviceId, service: &Attribute, characteristics: &[Uuid]) {
        self.record(Request::DiscoverCharacteristics(peripheral.clone(), service.0, characteristics.to_vec()));
    }

    fn request_set_notify(&mut self, peripheral: &DeviceId, characteristic: &Attribute, enabled: bool) {
        self.record(Request::SetNotify(peripheral.clone(), characteristic.0, enabled));
    }

    fn request_write(&mut self, peripheral: &DeviceId, characteristic: &Attribute, value: &[u8], ack_required: bool) {
        self.record(Request::Write(peripheral.clone(), characteristic.0, value.to_vec(), ack_required));
    }
}

pub struct Harness {
    pub radio: RecordingRadio,
    pub controller: ControllerHandle,
    pub events: Sender<Event>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start(policy: ReconnectPolicy) -> Self {
        let radio = RecordingRadio::knowing(&["A", "B"]);
        let (events, receiver): (Sender<Event>, Receiver<Event>) = channel(16);
        let cancel = CancellationToken::new();
        let (controller, task) = spawn_controller(cancel.clone(), radio.clone(), receiver, policy);

        Harness { radio, controller, events, cancel, task }
    }

    pub async fn emit(&mut self, event: Event) {
        self.events.send(event).await.unwrap();
    }

    pub async fn wait_for<F: FnMut(&Snapshot) -> bool>(&self, predicate: F) -> Snapshot {
        tokio::time::timeout(Duration::from_secs(1), self.controller.wait_for(predicate))
            .await
            .expect("timed out waiting for state")
            .expect("controller stopped")
    }
}

pub fn id(value: &str) -> DeviceId {
    DeviceId::from(value)
}

pub fn attributes(uuids: &[Uuid]) -> Vec<Attribute> {
    uuids.iter().map(|uuid| Attribute(*uuid)).collect()
}
