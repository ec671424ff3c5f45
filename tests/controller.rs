mod common;

use esp32_ble_control::config::types::{Config, ReconnectPolicy};
use esp32_ble_control::device::constants::{make_esp32_command_uuid, make_esp32_service_uuid, make_esp32_status_uuid};
use esp32_ble_control::device::types::{ConnectionPhase, DeviceId, DiscoveredDevice, StallReason};
use esp32_ble_control::error::{ControllerError, DeviceError};
use esp32_ble_control::terminal::application::TerminalApplication;

use common::{attributes, id, Event, Harness, Request};

async fn scan_and_discover(harness: &mut Harness) {
    harness.emit(Event::StateChanged { powered_on: true }).await;
    harness.wait_for(|s| s.radio_ready).await;

    harness.controller.start_scan().await.unwrap();
    harness.wait_for(|s| s.scanning).await;

    harness.emit(Event::PeripheralDiscovered { id: id("A"), name: Some("ESP32-Lamp".to_string()), rssi: -55 }).await;
    harness.wait_for(|s| s.devices.len() == 1).await;
}

async fn connect_with(harness: &mut Harness, characteristics: &[uuid::Uuid]) {
    harness.controller.connect(id("A")).await.unwrap();
    harness.wait_for(|s| s.phase == ConnectionPhase::Connecting).await;

    harness.emit(Event::Connected { id: id("A") }).await;
    harness.wait_for(|s| s.connected).await;

    harness.emit(Event::ServicesDiscovered {
        id: id("A"),
        services: Ok(attributes(&[make_esp32_service_uuid()])),
    }).await;
    harness.wait_for(|s| s.phase == ConnectionPhase::ServicesDiscovered).await;

    harness.emit(Event::CharacteristicsDiscovered {
        id: id("A"),
        characteristics: Ok(attributes(characteristics)),
    }).await;
}

/// Commands are applied in order, so once a later stop-scan request shows up every earlier
/// command has been handled.
async fn flush_commands(harness: &mut Harness) {
    let before = harness.radio.requests().iter().filter(|r| **r == Request::StopScan).count();
    harness.controller.stop_scan().await.unwrap();
    harness.radio.wait_for_count(before + 1, |r| *r == Request::StopScan).await;
}

#[tokio::test]
async fn lamp_scenario() {
    let mut harness = Harness::start(ReconnectPolicy::Reject);
    scan_and_discover(&mut harness).await;

    assert_eq!(harness.controller.snapshot().devices, vec![
        DiscoveredDevice { id: DeviceId::from("A"), name: "ESP32-Lamp".to_string(), rssi: -55 },
    ]);
    assert_eq!(harness.radio.requests()[0], Request::Scan(make_esp32_service_uuid()));

    connect_with(&mut harness, &[make_esp32_command_uuid(), make_esp32_status_uuid()]).await;
    let snapshot = harness.wait_for(|s| s.phase == ConnectionPhase::Ready).await;
    assert!(snapshot.connected);
    assert!(!snapshot.scanning);
    harness.radio.wait_for_request(|r| *r == Request::SetNotify(id("A"), make_esp32_status_uuid(), true)).await;

    harness.controller.send("LED:1").await.unwrap();
    let write = harness.radio.wait_for_request(|r| matches!(r, Request::Write(..))).await;
    assert_eq!(write, Request::Write(id("A"), make_esp32_command_uuid(), vec![0x4C, 0x45, 0x44, 0x3A, 0x31], false));
    flush_commands(&mut harness).await;
    assert_eq!(harness.radio.writes().len(), 1);

    harness.emit(Event::ValueUpdated { id: id("A"), characteristic: make_esp32_status_uuid(), value: Ok(b"ON".to_vec()) }).await;
    let snapshot = harness.wait_for(|s| s.status_text == "ON").await;
    assert_eq!(snapshot.connection_label(), "Connected");
}

#[tokio::test]
async fn send_without_command_characteristic_is_dropped() {
    let mut harness = Harness::start(ReconnectPolicy::Reject);
    scan_and_discover(&mut harness).await;

    connect_with(&mut harness, &[make_esp32_status_uuid()]).await;
    let snapshot = harness.wait_for(|s| matches!(s.phase, ConnectionPhase::Stalled(_))).await;
    assert_eq!(snapshot.phase, ConnectionPhase::Stalled(StallReason::CommandCharacteristicMissing));
    assert!(snapshot.connected);

    harness.controller.send("LED:1").await.unwrap();
    flush_commands(&mut harness).await;
    assert!(harness.radio.writes().is_empty());
}

#[tokio::test]
async fn disconnected_event_resets_the_link() {
    let mut harness = Harness::start(ReconnectPolicy::Reject);
    scan_and_discover(&mut harness).await;
    connect_with(&mut harness, &[make_esp32_command_uuid(), make_esp32_status_uuid()]).await;
    harness.wait_for(|s| s.phase == ConnectionPhase::Ready).await;

    harness.controller.disconnect().await.unwrap();
    harness.radio.wait_for_request(|r| *r == Request::Disconnect(id("A"))).await;
    // still connected until the radio says otherwise
    assert!(harness.controller.snapshot().connected);

    let mut states = harness.controller.subscribe();
    states.borrow_and_update();
    harness.emit(Event::Disconnected { id: id("A"), error: Some(DeviceError::Reported("link lost".to_string())) }).await;
    states.changed().await.unwrap();
    let snapshot = states.borrow_and_update().clone();
    assert!(!snapshot.connected);
    assert_eq!(snapshot.phase, ConnectionPhase::Idle);

    harness.controller.send("LED:0").await.unwrap();
    flush_commands(&mut harness).await;
    assert!(harness.radio.writes().is_empty());
}

#[tokio::test]
async fn second_scan_only_lists_new_discoveries() {
    let mut harness = Harness::start(ReconnectPolicy::Reject);
    scan_and_discover(&mut harness).await;

    harness.controller.start_scan().await.unwrap();
    harness.wait_for(|s| s.devices.is_empty()).await;
    harness.emit(Event::PeripheralDiscovered { id: id("B"), name: None, rssi: -80 }).await;
    harness.emit(Event::PeripheralDiscovered { id: id("B"), name: Some("late name".to_string()), rssi: -60 }).await;
    harness.emit(Event::PeripheralDiscovered { id: id("A"), name: Some("ESP32-Lamp".to_string()), rssi: -50 }).await;

    let snapshot = harness.wait_for(|s| s.devices.len() == 2).await;
    let names: Vec<&str> = snapshot.devices.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Unknown", "ESP32-Lamp"]);
    assert_eq!(snapshot.devices[0].rssi, -80);
}

#[tokio::test]
async fn replace_policy_switches_peripherals() {
    let mut harness = Harness::start(ReconnectPolicy::ReplaceExisting);
    scan_and_discover(&mut harness).await;
    connect_with(&mut harness, &[make_esp32_command_uuid(), make_esp32_status_uuid()]).await;
    harness.wait_for(|s| s.phase == ConnectionPhase::Ready).await;

    harness.controller.connect(id("B")).await.unwrap();
    harness.radio.wait_for_request(|r| *r == Request::Disconnect(id("A"))).await;

    harness.emit(Event::Disconnected { id: id("A"), error: None }).await;
    harness.radio.wait_for_request(|r| *r == Request::Connect(id("B"))).await;
    harness.wait_for(|s| !s.connected && s.phase == ConnectionPhase::Connecting).await;

    harness.emit(Event::Connected { id: id("B") }).await;
    harness.wait_for(|s| s.connected).await;
    harness.radio.wait_for_request(|r| *r == Request::DiscoverServices(id("B"), vec![make_esp32_service_uuid()])).await;
}

#[tokio::test]
async fn operations_fail_once_the_controller_stopped() {
    let mut harness = Harness::start(ReconnectPolicy::Reject);
    harness.cancel.cancel();
    (&mut harness.task).await.unwrap();

    let result = harness.controller.start_scan().await;
    assert!(matches!(result, Err(ControllerError::Stopped { .. })));
    assert!(harness.controller.wait_for(|s| s.connected).await.is_none());
}

#[tokio::test]
async fn closing_while_connecting_releases_the_pending_link() {
    let mut harness = Harness::start(ReconnectPolicy::Reject);
    scan_and_discover(&mut harness).await;
    harness.controller.connect(id("A")).await.unwrap();
    let snapshot = harness.wait_for(|s| s.phase == ConnectionPhase::Connecting).await;
    assert!(!snapshot.connected);

    let mut application = TerminalApplication::new(harness.controller.clone(), Config::default());
    let close = tokio::spawn(async move { application.disconnect_before_close().await });

    harness.radio.wait_for_request(|r| *r == Request::Disconnect(id("A"))).await;
    harness.emit(Event::Disconnected { id: id("A"), error: None }).await;

    close.await.unwrap().unwrap();
    assert_eq!(harness.controller.snapshot().phase, ConnectionPhase::Idle);
}
