#![allow(clippy::unwrap_used)]
// End-to-end tests for the controller lifecycle, dispatch policy, and
// sync loop against a wiremock cloud.
//
// Timer-sensitive tests use short real windows (tens of milliseconds)
// rather than virtual time: the flows under test interleave timers
// with real socket I/O.

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use heatlink_core::{
    ConnectionState, Controller, ControllerConfig, CoreError, Credentials, EnergyStore,
    JsonFileStore,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn ata_id() -> Uuid {
    Uuid::parse_str("5f0c7bde-23a1-4a8e-9c27-04d7b1a6c001").unwrap()
}

fn atw_id() -> Uuid {
    Uuid::parse_str("9b1f4c02-77aa-4e10-8a3d-6f2e9d5b7c12").unwrap()
}

fn config(server: &MockServer) -> ControllerConfig {
    ControllerConfig {
        base_url: server.uri().parse().unwrap(),
        credentials: Credentials::new("user@example.com", "hunter2"),
        timeout: Duration::from_secs(5),
        // Long enough that scheduled ticks never interfere; tests that
        // need the interval override it.
        poll_interval: Duration::from_secs(3600),
        telemetry_interval: Duration::from_secs(3600),
        debounce_window: Duration::from_millis(150),
        energy_retention: Duration::from_secs(48 * 3600),
        energy_store_path: None,
    }
}

fn ata_entry(target_temperature: f64) -> serde_json::Value {
    json!({
        "id": ata_id(),
        "family": "ata",
        "name": "Living room",
        "serial": "2309P00142",
        "capabilities": {},
        "state": {
            "power": true,
            "mode": "heat",
            "target_temperature": target_temperature,
            "fan_speed": "auto",
            "vane_horizontal": "center",
            "vane_vertical": "auto",
            "room_temperature": 20.8
        }
    })
}

fn context_body() -> serde_json::Value {
    json!({ "devices": [ata_entry(21.5)] })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "tok-1",
            "accountId": "acct-1"
        })))
        .mount(server)
        .await;
}

async fn mount_context(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/user/context"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Quiet down the sub-poll tasks: every telemetry request answers
/// "series structurally absent".
async fn mount_telemetry_absent(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/devices/{}/telemetry", ata_id())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "available": false })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/devices/{}/telemetry", atw_id())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "available": false })))
        .mount(server)
        .await;
}

async fn connected_controller(server: &MockServer, config: ControllerConfig) -> Controller {
    let controller = Controller::new(config);
    controller.connect().await.unwrap();
    controller
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn connect_loads_initial_snapshot() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_context(&server, context_body()).await;
    mount_telemetry_absent(&server).await;

    let controller = connected_controller(&server, config(&server)).await;

    assert_eq!(controller.connection_state(), ConnectionState::Connected);
    let device = controller.device(&ata_id()).unwrap();
    assert_eq!(device.name, "Living room");
    assert_eq!(device.field("target_temperature"), Some(&json!(21.5)));

    controller.disconnect().await;
    assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn bad_credentials_fail_without_retry() {
    let server = MockServer::start().await;

    // Exactly one login attempt: credential rejection is fatal.
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let controller = Controller::new(config(&server));
    let result = controller.connect().await;

    assert!(
        matches!(result, Err(CoreError::AuthenticationFailed { .. })),
        "expected AuthenticationFailed, got: {result:?}"
    );
    assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn apply_before_connect_is_rejected() {
    let server = MockServer::start().await;
    let controller = Controller::new(config(&server));

    let result = controller.apply(ata_id(), "power", json!(false)).await;

    assert!(matches!(result, Err(CoreError::ControllerDisconnected)));
}

// ── Dispatch: dedup ─────────────────────────────────────────────────

#[tokio::test]
async fn apply_matching_cached_state_issues_no_network_call() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_context(&server, context_body()).await;
    mount_telemetry_absent(&server).await;

    // Zero PUTs allowed for the whole test.
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let controller = connected_controller(&server, config(&server)).await;

    // Cached target_temperature is 21.5; both calls must dedup.
    controller
        .apply(ata_id(), "target_temperature", json!(21.5))
        .await
        .unwrap();
    controller
        .apply(ata_id(), "target_temperature", json!(21.5))
        .await
        .unwrap();

    controller.disconnect().await;
}

#[tokio::test]
async fn apply_sends_one_put_with_sentinel_patch() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_context(&server, context_body()).await;
    mount_telemetry_absent(&server).await;

    // Changing 21.5 -> 22.0 must produce exactly one PUT whose body
    // carries the literal for the changed field and the explicit null
    // sentinel for every other writable field.
    Mock::given(method("PUT"))
        .and(path(format!("/devices/ata/{}/state", ata_id())))
        .and(body_json(json!({
            "power": null,
            "mode": null,
            "target_temperature": 22.0,
            "fan_speed": null,
            "vane_horizontal": null,
            "vane_vertical": null
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected_controller(&server, config(&server)).await;

    controller
        .apply(ata_id(), "target_temperature", json!(22.0))
        .await
        .unwrap();

    // A repeat of the in-flight target joins it instead of re-sending.
    controller
        .apply(ata_id(), "target_temperature", json!(22.0))
        .await
        .unwrap();

    controller.disconnect().await;
}

#[tokio::test]
async fn apply_to_unknown_device_fails() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_context(&server, context_body()).await;
    mount_telemetry_absent(&server).await;

    let controller = connected_controller(&server, config(&server)).await;

    let stranger = Uuid::new_v4();
    let result = controller.apply(stranger, "power", json!(false)).await;

    assert!(matches!(
        result,
        Err(CoreError::DeviceNotFound { device_id }) if device_id == stranger
    ));

    controller.disconnect().await;
}

// ── Dispatch: retry-on-expiry ───────────────────────────────────────

#[tokio::test]
async fn expired_session_reauthenticates_and_retries_once() {
    let server = MockServer::start().await;
    mount_context(&server, context_body()).await;
    mount_telemetry_absent(&server).await;

    // Initial login + exactly one re-authentication.
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "tok-1",
            "accountId": "acct-1"
        })))
        .expect(2)
        .mount(&server)
        .await;

    // First PUT is rejected as expired, the retry succeeds.
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected_controller(&server, config(&server)).await;

    controller
        .apply(ata_id(), "target_temperature", json!(22.0))
        .await
        .unwrap();

    controller.disconnect().await;
}

#[tokio::test]
async fn second_expiry_on_retry_is_fatal() {
    let server = MockServer::start().await;
    mount_context(&server, context_body()).await;
    mount_telemetry_absent(&server).await;

    // Initial login + the single permitted re-authentication.
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "tok-1",
            "accountId": "acct-1"
        })))
        .expect(2)
        .mount(&server)
        .await;

    // Attempt + retry, nothing more.
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let controller = connected_controller(&server, config(&server)).await;

    let result = controller
        .apply(ata_id(), "target_temperature", json!(22.0))
        .await;

    assert!(
        matches!(result, Err(CoreError::SessionExpired)),
        "expected SessionExpired, got: {result:?}"
    );

    controller.disconnect().await;
}

#[tokio::test]
async fn validation_failure_surfaces_without_retry() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_context(&server, context_body()).await;
    mount_telemetry_absent(&server).await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(422).set_body_string("setpoint out of range"))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected_controller(&server, config(&server)).await;

    let result = controller
        .apply(ata_id(), "target_temperature", json!(95.0))
        .await;

    assert!(
        matches!(result, Err(CoreError::Api { status: Some(422), .. })),
        "expected Api error, got: {result:?}"
    );

    controller.disconnect().await;
}

// ── Dispatch: debounce ──────────────────────────────────────────────

#[tokio::test]
async fn command_burst_collapses_into_one_refresh() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_telemetry_absent(&server).await;

    // Initial load + exactly one debounced confirmation fetch.
    Mock::given(method("GET"))
        .and(path("/user/context"))
        .respond_with(ResponseTemplate::new(200).set_body_json(context_body()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let controller = connected_controller(&server, config(&server)).await;

    // A slider-style burst: three different setpoints inside the
    // 150 ms quiet window.
    for target in [22.0, 22.5, 23.0] {
        controller
            .apply(ata_id(), "target_temperature", json!(target))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    // Let the trailing-edge window elapse and the refresh land.
    tokio::time::sleep(Duration::from_millis(500)).await;

    controller.disconnect().await;
}

#[tokio::test]
async fn disconnect_cancels_pending_debounce_timer() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_telemetry_absent(&server).await;

    // Only the initial load: the armed timer must not fire after
    // disconnect.
    Mock::given(method("GET"))
        .and(path("/user/context"))
        .respond_with(ResponseTemplate::new(200).set_body_json(context_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let controller = connected_controller(&server, config(&server)).await;

    controller
        .apply(ata_id(), "target_temperature", json!(22.0))
        .await
        .unwrap();
    controller.disconnect().await;

    tokio::time::sleep(Duration::from_millis(400)).await;
}

// ── Sync loop ───────────────────────────────────────────────────────

#[tokio::test]
async fn failed_poll_marks_snapshot_stale_but_keeps_it() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_telemetry_absent(&server).await;

    // First fetch succeeds, everything after that breaks.
    Mock::given(method("GET"))
        .and(path("/user/context"))
        .respond_with(ResponseTemplate::new(200).set_body_json(context_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/context"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.poll_interval = Duration::from_millis(100);
    let controller = connected_controller(&server, cfg).await;

    assert!(!controller.sync_health().stale);

    tokio::time::sleep(Duration::from_millis(350)).await;

    assert!(controller.sync_health().stale);
    // The previous snapshot stays published.
    assert!(controller.device(&ata_id()).is_some());

    controller.disconnect().await;
}

#[tokio::test]
async fn snapshot_updates_publish_to_subscribers() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_telemetry_absent(&server).await;

    Mock::given(method("GET"))
        .and(path("/user/context"))
        .respond_with(ResponseTemplate::new(200).set_body_json(context_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/context"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "devices": [ata_entry(23.0)] })),
        )
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.poll_interval = Duration::from_millis(100);
    let controller = connected_controller(&server, cfg).await;

    let mut rx = controller.subscribe();
    rx.mark_unchanged();

    // The next cycle replaces the snapshot wholesale.
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("snapshot update within two seconds")
        .unwrap();

    let device = controller.device(&ata_id()).unwrap();
    assert_eq!(device.field("target_temperature"), Some(&json!(23.0)));

    controller.disconnect().await;
}

// ── Ambient sub-poll ────────────────────────────────────────────────

#[tokio::test]
async fn ambient_probe_happens_exactly_once_for_unsupported_device() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_context(&server, context_body()).await;

    // The device structurally lacks the series: one probe, never again,
    // across several sub-poll check ticks.
    Mock::given(method("GET"))
        .and(path(format!("/devices/{}/telemetry", ata_id())))
        .and(query_param("measure", "ambient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "available": false })))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.poll_interval = Duration::from_millis(50);
    let controller = connected_controller(&server, cfg).await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(controller.device(&ata_id()).unwrap().ambient.is_none());
    controller.disconnect().await;
}

#[tokio::test]
async fn ambient_probe_success_records_reading() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_context(&server, context_body()).await;

    Mock::given(method("GET"))
        .and(path(format!("/devices/{}/telemetry", ata_id())))
        .and(query_param("measure", "ambient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "available": true,
            "points": [
                { "timestamp": "2026-08-06T11:40:00Z", "value": 16.4 },
                { "timestamp": "2026-08-06T11:50:00Z", "value": 16.9 }
            ]
        })))
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.poll_interval = Duration::from_millis(50);
    let controller = connected_controller(&server, cfg).await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    let ambient = controller
        .device(&ata_id())
        .unwrap()
        .ambient
        .expect("reading recorded");
    assert!((ambient.temperature_c - 16.9).abs() < f64::EPSILON);

    controller.disconnect().await;
}

// ── Energy poll ─────────────────────────────────────────────────────

#[tokio::test]
async fn energy_poll_accumulates_and_persists() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let body = json!({
        "devices": [{
            "id": ata_id(),
            "family": "ata",
            "name": "Living room",
            "serial": "2309P00142",
            "capabilities": { "hasEnergyReporting": true },
            "state": { "power": true }
        }]
    });
    mount_context(&server, body).await;

    // First poll baselines at 100 Wh; the second observes 300 Wh, so
    // exactly the 200 Wh delta (0.2 kWh) is credited.
    Mock::given(method("GET"))
        .and(path(format!("/devices/{}/telemetry", ata_id())))
        .and(query_param("measure", "energy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "available": true,
            "points": [{ "timestamp": "2026-08-06T11:00:00Z", "value": 100.0 }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/devices/{}/telemetry", ata_id())))
        .and(query_param("measure", "energy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "available": true,
            "points": [{ "timestamp": "2026-08-06T11:00:00Z", "value": 300.0 }]
        })))
        .mount(&server)
        .await;
    // Ambient probe answered once with "absent".
    Mock::given(method("GET"))
        .and(query_param("measure", "ambient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "available": false })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let energy_path = dir.path().join("energy.json");
    let mut cfg = config(&server);
    cfg.poll_interval = Duration::from_millis(100);
    cfg.energy_store_path = Some(energy_path.clone());

    let controller = connected_controller(&server, cfg).await;

    tokio::time::sleep(Duration::from_millis(450)).await;

    let total = controller.energy_total_kwh(&ata_id()).await.unwrap();
    assert!(
        (total - 0.2).abs() < 1e-9,
        "expected 0.2 kWh accumulated, got {total}"
    );

    controller.disconnect().await;

    // The accumulator state was durably saved and reloads with the
    // bucket intact.
    let persisted = JsonFileStore::new(&energy_path).load().unwrap();
    assert!((persisted.cumulative_kwh[&ata_id()] - 0.2).abs() < 1e-9);
    assert!(
        persisted.hour_records[&ata_id()].contains_key("2026-08-06T11:00:00Z"),
        "in-progress bucket persisted"
    );
}

// ── Typed facades ───────────────────────────────────────────────────

#[tokio::test]
async fn facade_checks_device_family() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_context(&server, context_body()).await;
    mount_telemetry_absent(&server).await;

    let controller = connected_controller(&server, config(&server)).await;

    assert!(controller.ata(ata_id()).is_ok());
    assert!(matches!(
        controller.atw(ata_id()),
        Err(CoreError::WrongFamily { .. })
    ));

    controller.disconnect().await;
}

#[tokio::test]
async fn facade_setter_routes_through_dispatch() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_context(&server, context_body()).await;
    mount_telemetry_absent(&server).await;

    Mock::given(method("PUT"))
        .and(path(format!("/devices/ata/{}/state", ata_id())))
        .and(body_json(json!({
            "power": false,
            "mode": null,
            "target_temperature": null,
            "fan_speed": null,
            "vane_horizontal": null,
            "vane_vertical": null
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected_controller(&server, config(&server)).await;

    controller.ata(ata_id()).unwrap().set_power(false).await.unwrap();

    controller.disconnect().await;
}
