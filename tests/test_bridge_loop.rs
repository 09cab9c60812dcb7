//! Bridge lifecycle tests against recording mocks
//!
//! Time is paused so the five-second ticks and settle waits run instantly.

use mz2mqtt::bridge::{BridgeLoop, BridgeState, CommandOutcome};
use mz2mqtt::error::{BridgeError, ErrorKind};
use mz2mqtt::protocol::{VehicleId, VehicleRecord};
use mz2mqtt::testing::{ApiCall, MockTransport, MockVehicleApi};
use mz2mqtt::transport::Transport;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::watch;

use test_helpers::{gas_vehicle_api, test_options};

fn two_vehicle_api() -> MockVehicleApi {
    let api = MockVehicleApi::new(vec![
        VehicleRecord::new("1", "ABC123", false),
        VehicleRecord::new("2", "DEF456", false),
    ]);
    api.set_status("1", json!({"fuel": {"level": 55}, "odometer": 1000}));
    api.set_status("2", json!({"fuel": {"level": 20}, "odometer": 52000}));
    api
}

#[tokio::test(start_paused = true)]
async fn test_startup_publishes_base_attributes_and_requests_refresh() {
    let transport = MockTransport::new();
    let api = two_vehicle_api();
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));

    bridge.start().await.unwrap();

    assert_eq!(bridge.state(), BridgeState::Running);
    assert_eq!(bridge.fleet().len(), 2);
    assert!(transport.subscribed.load(Ordering::SeqCst));
    assert_eq!(
        &transport.published_topics()[..3],
        &["base/ABC123/id", "base/ABC123/vin", "base/ABC123/isElectric"]
    );
    assert_eq!(transport.last_payload("base/DEF456/id").as_deref(), Some("2"));
    assert_eq!(
        transport.last_payload("base/ABC123/isElectric").as_deref(),
        Some("false")
    );
    assert_eq!(
        api.calls(),
        vec![
            ApiCall::ListVehicles,
            ApiCall::Refresh(VehicleId::new("1")),
            ApiCall::Refresh(VehicleId::new("2")),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_startup_waits_for_settle_once() {
    let mut bridge = BridgeLoop::new(MockTransport::new(), two_vehicle_api(), test_options(3));

    let before = tokio::time::Instant::now();
    bridge.start().await.unwrap();

    let elapsed = before.elapsed();
    assert!(elapsed >= Duration::from_secs(120));
    assert!(elapsed < Duration::from_secs(240));
}

#[tokio::test(start_paused = true)]
async fn test_initial_refresh_failure_does_not_stop_startup() {
    let api = two_vehicle_api();
    api.fail_refresh_for("1");
    let mut bridge = BridgeLoop::new(MockTransport::new(), api.clone(), test_options(3));

    bridge.start().await.unwrap();

    assert!(api.calls().contains(&ApiCall::Refresh(VehicleId::new("2"))));
    assert_eq!(bridge.state(), BridgeState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_publishes_flattened_status() {
    let transport = MockTransport::new();
    let mut bridge = BridgeLoop::new(transport.clone(), gas_vehicle_api(), test_options(3));
    bridge.start().await.unwrap();
    transport.clear_history();

    let report = bridge.tick().await.unwrap();

    assert!(report.polled);
    let messages = transport.published_messages();
    let pairs: Vec<(&str, String)> = messages
        .iter()
        .map(|m| (m.topic.as_str(), m.payload_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("base/ABC123/fuel/level", "55".to_string()),
            ("base/ABC123/odometer", "1000".to_string()),
        ]
    );
    assert!(messages.iter().all(|m| m.retain));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_command_touches_only_target_vehicle() {
    let transport = MockTransport::new();
    let api = two_vehicle_api();
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    bridge.start().await.unwrap();
    bridge.tick().await.unwrap();
    api.clear_calls();
    transport.clear_history();

    assert!(transport.inject_command("base/SET/ABC123/refresh", "1"));
    let report = bridge.tick().await.unwrap();

    assert!(!report.polled);
    assert_eq!(
        report.commands,
        vec![CommandOutcome::Refreshed {
            vin: "ABC123".to_string(),
            published: 2
        }]
    );
    assert_eq!(
        api.calls(),
        vec![
            ApiCall::Refresh(VehicleId::new("1")),
            ApiCall::GetStatus(VehicleId::new("1")),
        ]
    );
    assert!(transport
        .published_topics()
        .iter()
        .all(|t| t.starts_with("base/ABC123/")));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_vin_makes_no_api_calls() {
    let transport = MockTransport::new();
    let api = two_vehicle_api();
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    bridge.start().await.unwrap();
    bridge.tick().await.unwrap();
    api.clear_calls();

    transport.inject_command("base/SET/ZZZ999/refresh", "1");
    let report = bridge.tick().await.unwrap();

    assert_eq!(
        report.commands,
        vec![CommandOutcome::VehicleNotFound {
            vin: "ZZZ999".to_string()
        }]
    );
    assert!(api.calls().is_empty());

    transport.inject_command("base/SET/DEF456/refresh", "");
    let report = bridge.tick().await.unwrap();
    assert!(matches!(report.commands[0], CommandOutcome::Refreshed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_command_keeps_loop_running() {
    let transport = MockTransport::new();
    let api = two_vehicle_api();
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    bridge.start().await.unwrap();
    bridge.tick().await.unwrap();
    api.fail_refresh_for("1");

    transport.inject_command("base/SET/ABC123/refresh", "");
    let report = bridge.tick().await.unwrap();

    assert!(matches!(
        &report.commands[0],
        CommandOutcome::Failed { vin, .. } if vin == "ABC123"
    ));
    assert!(bridge.tick().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_commands_are_handled_in_arrival_order() {
    let transport = MockTransport::new();
    let api = two_vehicle_api();
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    bridge.start().await.unwrap();
    bridge.tick().await.unwrap();
    api.clear_calls();

    transport.inject_command("base/SET/DEF456/refresh", "");
    transport.inject_command("base/SET/ABC123/refresh", "");
    bridge.tick().await.unwrap();

    assert_eq!(
        api.calls(),
        vec![
            ApiCall::Refresh(VehicleId::new("2")),
            ApiCall::GetStatus(VehicleId::new("2")),
            ApiCall::Refresh(VehicleId::new("1")),
            ApiCall::GetStatus(VehicleId::new("1")),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_electric_vehicle_also_publishes_ev_status() {
    let transport = MockTransport::new();
    let api = MockVehicleApi::new(vec![VehicleRecord::new("7", "EV0001", true)]);
    api.set_status("7", json!({"odometer": 12}));
    api.set_ev_status("7", json!({"charge": {"percent": 80, "plugged": true}}));
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    bridge.start().await.unwrap();
    api.clear_calls();
    transport.clear_history();

    bridge.tick().await.unwrap();

    assert_eq!(
        api.calls(),
        vec![
            ApiCall::GetStatus(VehicleId::new("7")),
            ApiCall::GetEvStatus(VehicleId::new("7")),
        ]
    );
    assert_eq!(
        transport.published_topics(),
        vec![
            "base/EV0001/odometer",
            "base/EV0001/charge/percent",
            "base/EV0001/charge/plugged",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_refresh_command_for_electric_vehicle() {
    let transport = MockTransport::new();
    let api = MockVehicleApi::new(vec![VehicleRecord::new("7", "EV1", true)]);
    api.set_status("7", json!({"odo": 5}));
    api.set_ev_status("7", json!({"soc": {"pct": 80}}));
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    bridge.start().await.unwrap();
    bridge.tick().await.unwrap();
    api.clear_calls();
    transport.clear_history();

    assert!(transport.inject_command("base/SET/EV1/refresh", ""));
    let before = tokio::time::Instant::now();
    let report = bridge.tick().await.unwrap();

    assert!(!report.polled);
    assert_eq!(
        report.commands,
        vec![CommandOutcome::Refreshed {
            vin: "EV1".to_string(),
            published: 2
        }]
    );
    assert!(before.elapsed() >= Duration::from_secs(120));
    assert_eq!(
        api.calls(),
        vec![
            ApiCall::Refresh(VehicleId::new("7")),
            ApiCall::GetStatus(VehicleId::new("7")),
            ApiCall::GetEvStatus(VehicleId::new("7")),
        ]
    );
    assert_eq!(transport.published_topics(), vec!["base/EV1/odo", "base/EV1/soc/pct"]);
    assert_eq!(transport.last_payload("base/EV1/soc/pct").as_deref(), Some("80"));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_command_settles_before_fetching() {
    let transport = MockTransport::new();
    let api = MockVehicleApi::new(vec![VehicleRecord::new("7", "EV1", true)]);
    api.set_status("7", json!({"odo": 5}));
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    bridge.start().await.unwrap();
    bridge.tick().await.unwrap();
    api.clear_calls();

    transport.inject_command("base/SET/EV1/refresh", "");
    bridge.tick().await.unwrap();

    let timed = api.timed_calls();
    assert_eq!(timed.len(), 3);
    let (first, refreshed_at) = &timed[0];
    assert_eq!(first, &ApiCall::Refresh(VehicleId::new("7")));
    for (call, at) in &timed[1..] {
        assert!(
            at.duration_since(*refreshed_at) >= Duration::from_secs(120),
            "{call:?} was fetched before the settle wait ended"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_too_deep_base_attributes_are_fatal() {
    let transport = MockTransport::new();
    let mut vehicle = VehicleRecord::new("1", "ABC123", false);
    vehicle
        .attributes
        .insert("owner".to_string(), json!({"name": {"first": "Ada"}}));
    let api = MockVehicleApi::new(vec![vehicle]);
    let mut options = test_options(3);
    options.max_depth = 1;
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), options);
    let (_tx, rx) = watch::channel(false);

    let error = bridge.execute(rx).await.unwrap_err();

    assert!(matches!(error, BridgeError::Startup(_)));
    assert_eq!(error.kind(), ErrorKind::Fatal);
    assert_eq!(bridge.state(), BridgeState::ShuttingDown);
    assert!(!api.calls().contains(&ApiCall::Refresh(VehicleId::new("1"))));
}

#[tokio::test(start_paused = true)]
async fn test_fleet_listing_failure_is_fatal() {
    let transport = MockTransport::new();
    let api = gas_vehicle_api();
    api.fail_listing();
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    let (_tx, rx) = watch::channel(false);

    let error = bridge.execute(rx).await.unwrap_err();

    assert!(matches!(error, BridgeError::FleetUnavailable(_)));
    assert_eq!(error.kind(), ErrorKind::Fatal);
    assert_eq!(bridge.state(), BridgeState::ShuttingDown);
    assert!(transport.published_messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_broker_connect_failure_is_fatal() {
    let api = gas_vehicle_api();
    let mut bridge = BridgeLoop::new(MockTransport::with_failure(), api.clone(), test_options(3));
    let (_tx, rx) = watch::channel(false);

    let error = bridge.execute(rx).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Fatal);
    assert!(!api.calls().contains(&ApiCall::ListVehicles));
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_poll_failure_ends_run_and_shuts_down() {
    let transport = MockTransport::new();
    let api = gas_vehicle_api();
    api.fail_status_fetch();
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    let (_tx, rx) = watch::channel(false);

    let error = bridge.execute(rx).await.unwrap_err();

    assert!(matches!(error, BridgeError::VehicleApi(_)));
    assert_eq!(error.kind(), ErrorKind::LoopFatal);
    assert_eq!(bridge.state(), BridgeState::ShuttingDown);
    assert!(!transport.is_connected());
    assert_eq!(transport.disconnect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.calls().last(), Some(&ApiCall::Close));
}

#[tokio::test(start_paused = true)]
async fn test_lost_broker_connection_ends_run() {
    let transport = MockTransport::new();
    let mut bridge = BridgeLoop::new(transport.clone(), gas_vehicle_api(), test_options(3));
    bridge.start().await.unwrap();
    transport.drop_connection();

    let (_tx, rx) = watch::channel(false);
    let error = bridge.run(rx).await.unwrap_err();

    assert!(matches!(error, BridgeError::BrokerConnectionLost { .. }));
    assert_eq!(error.kind(), ErrorKind::LoopFatal);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_signal_stops_cleanly() {
    let transport = MockTransport::new();
    let api = gas_vehicle_api();
    let mut bridge = BridgeLoop::new(transport.clone(), api.clone(), test_options(3));
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(300)).await;
        let _ = tx.send(true);
    });

    bridge.execute(rx).await.unwrap();

    assert_eq!(bridge.state(), BridgeState::ShuttingDown);
    assert!(!transport.is_connected());
    let polls = api
        .calls()
        .iter()
        .filter(|c| matches!(c, ApiCall::GetStatus(_)))
        .count();
    assert!(polls >= 1);
    assert_eq!(api.calls().last(), Some(&ApiCall::Close));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_shutdown_sender_stops_loop() {
    let mut bridge = BridgeLoop::new(MockTransport::new(), gas_vehicle_api(), test_options(3));
    let (tx, rx) = watch::channel(false);
    drop(tx);

    assert!(bridge.execute(rx).await.is_ok());
}
