#![allow(clippy::unwrap_used)]
// Integration tests for `ControlPlaneClient` using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rigline_api::{
    AccessToken, CommandOutcome, ControlPlaneClient, DeviceCredentials, Error, HeartbeatRequest,
    RegisterDeviceRequest, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ControlPlaneClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = ControlPlaneClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn device() -> DeviceCredentials {
    DeviceCredentials::new("dev-1", SecretString::from("device-secret".to_string()))
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "username": "ops", "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok" })))
        .expect(1)
        .mount(&server)
        .await;

    let secret = SecretString::from("hunter2".to_string());
    client.login("ops", &secret).await.unwrap();
}

#[tokio::test]
async fn test_login_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let secret = SecretString::from("wrong".to_string());
    let result = client.login("ops", &secret).await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

// ── Registration ────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_device_sends_bearer_and_fingerprint() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/devices/register"))
        .and(header("authorization", "Bearer tok"))
        .and(body_json(json!({
            "fingerprint": "abc",
            "hostname": "rig-01",
            "ip_address": "10.0.0.5",
            "os": "linux",
            "agent_version": "0.1.0"
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "device_id": "dev-1", "api_key": "device-secret" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = RegisterDeviceRequest {
        fingerprint: "abc".into(),
        hostname: "rig-01".into(),
        ip_address: Some("10.0.0.5".into()),
        os: "linux".into(),
        agent_version: "0.1.0".into(),
    };
    let registered = client
        .register_device(&AccessToken::new("tok"), &request)
        .await
        .unwrap();

    assert_eq!(registered.device_id, "dev-1");
    assert_eq!(registered.api_key, "device-secret");
}

// ── Device-scoped endpoints ─────────────────────────────────────────

#[tokio::test]
async fn test_heartbeat_uses_device_key() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/devices/dev-1/heartbeat"))
        .and(header("x-device-key", "device-secret"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .heartbeat(&device(), &HeartbeatRequest::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pending_commands_preserves_order() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices/dev-1/commands"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "commands": [
                { "id": "c1", "action": "enter_car" },
                { "id": "c2", "action": "reset_car", "params": { "hold_ms": 200 } }
            ]
        })))
        .mount(&server)
        .await;

    let commands = client.pending_commands(&device()).await.unwrap();

    let actions: Vec<&str> = commands.iter().map(|c| c.action.as_str()).collect();
    assert_eq!(actions, vec!["enter_car", "reset_car"]);
    assert!(commands[0].params.is_none());
}

#[tokio::test]
async fn test_report_result_posts_outcome() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/devices/dev-1/commands/c9/result"))
        .and(body_json(json!({ "success": false, "message": "Unknown command: x. Available commands: " })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = CommandOutcome {
        success: false,
        message: Some("Unknown command: x. Available commands: ".into()),
    };
    client.report_result(&device(), "c9", &outcome).await.unwrap();
}

// ── Error mapping ───────────────────────────────────────────────────

#[tokio::test]
async fn test_revoked_device_key_is_auth_failure() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = client.pending_commands(&device()).await.unwrap_err();
    assert!(err.is_auth_failure(), "got: {err:?}");
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/devices/dev-1/heartbeat"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = client
        .heartbeat(&device(), &HeartbeatRequest::default())
        .await
        .unwrap_err();

    match err {
        Error::Api { status, ref message } => {
            assert_eq!(status, 502);
            assert!(message.contains("upstream down"));
        }
        ref other => panic!("expected Api error, got: {other:?}"),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = client.health().await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn test_slow_response_reports_configured_timeout() {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        timeout: Duration::from_millis(200),
        ..TransportConfig::default()
    };
    let client = ControlPlaneClient::new(Url::parse(&server.uri()).unwrap(), &transport).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "ok" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client.health().await.unwrap_err();
    assert!(
        matches!(err, Error::Timeout { timeout } if timeout == Duration::from_millis(200)),
        "got: {err:?}"
    );
    assert!(err.is_transient());
}
