#![allow(clippy::unwrap_used)]
// `HttpControlPlane` against a mock control plane, plus one end-to-end
// agent run over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rigline_api::TransportConfig;
use rigline_core::command::builtin::register_builtin;
use rigline_core::{
    Agent, AgentConfig, AgentContext, CommandRegistry, CommandResult, ControlPlane, CoreError,
    DeviceIdentity, HttpControlPlane, IdentityManager, InputDevice, InputMapping,
    LoggingInputDevice, LoginCredentials, OfflineTelemetry, RegistrationRequest, SessionToken,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpControlPlane) {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();
    let cp = HttpControlPlane::connect(base, &TransportConfig::default()).unwrap();
    (server, cp)
}

fn device() -> DeviceIdentity {
    DeviceIdentity {
        fingerprint: "fp".into(),
        device_id: "dev-1".into(),
        api_key: SecretString::from("device-secret".to_string()),
        registered_at: None,
    }
}

// ── Adapter ─────────────────────────────────────────────────────────

#[tokio::test]
async fn login_then_register_maps_credentials() {
    let (server, cp) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/devices/register"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "device_id": "dev-9", "api_key": "k9" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = cp
        .login("ops", &SecretString::from("pw".to_string()))
        .await
        .unwrap();
    let request = RegistrationRequest {
        fingerprint: "fp".into(),
        hostname: "rig".into(),
        ip_address: None,
        os: "linux".into(),
        agent_version: "0.1.0".into(),
    };
    let registration = cp.register_device(&session, &request).await.unwrap();

    assert_eq!(registration.device_id, "dev-9");
    assert_eq!(registration.api_key.expose_secret(), "k9");
}

#[tokio::test]
async fn poll_and_ack_round_trip() {
    let (server, cp) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices/dev-1/commands"))
        .and(header("x-device-key", "device-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "commands": [{ "id": "c1", "action": "enter_car", "params": { "hold_ms": 20 } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/devices/dev-1/commands/c1/result"))
        .and(body_json(json!({ "success": true })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let commands = cp.poll_commands(&device()).await.unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].action, "enter_car");
    assert_eq!(
        commands[0].params.as_ref().and_then(|p| p.get("hold_ms")),
        Some(&json!(20))
    );

    cp.ack_command(&device(), "c1", &CommandResult::ok()).await.unwrap();
}

#[tokio::test]
async fn rejected_device_key_is_an_auth_failure() {
    let (server, cp) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/devices/dev-1/heartbeat"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = cp
        .heartbeat(&device(), &rigline_core::HeartbeatReport::default())
        .await
        .unwrap_err();
    assert!(err.is_auth_failure(), "got {err:?}");
}

#[tokio::test]
async fn unhealthy_status_is_an_error() {
    let (server, cp) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "degraded" })))
        .mount(&server)
        .await;

    assert!(matches!(cp.health().await, Err(CoreError::Api { .. })));
}

// ── End to end ──────────────────────────────────────────────────────

#[tokio::test]
async fn agent_registers_heartbeats_and_acks_over_http() {
    let (server, cp) = setup().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/devices/register"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "device_id": "dev-1", "api_key": "device-secret" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/devices/dev-1/heartbeat"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices/dev-1/commands"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "commands": [{ "id": "c1", "action": "reset_car" }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices/dev-1/commands"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "commands": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/devices/dev-1/commands/c1/result"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mapping = Arc::new(InputMapping::open(dir.path().join("joystick.json")));
    mapping.set_button("reset_car", Some(2)).unwrap();
    let input: Arc<dyn InputDevice> = Arc::new(LoggingInputDevice);
    let mut registry = CommandRegistry::new();
    register_builtin(&mut registry, &mapping, &input).unwrap();

    let identity = Arc::new(
        IdentityManager::open(dir.path().join("device.json"), "0.1.0").with_fingerprint("fp-e2e"),
    );
    let agent = Agent::new(AgentContext {
        config: AgentConfig {
            heartbeat_interval: Duration::from_millis(200),
            command_poll_interval: Duration::from_millis(50),
            credentials: Some(LoginCredentials {
                username: "ops".into(),
                password: SecretString::from("pw".to_string()),
            }),
            ..AgentConfig::default()
        },
        control_plane: Arc::new(cp),
        identity: identity.clone(),
        registry: Arc::new(registry),
        telemetry: Arc::new(OfflineTelemetry),
        input,
    });

    agent.start();
    let acked = wait_for_result(&server, Duration::from_secs(5)).await;
    agent.stop().await;

    assert_eq!(acked["success"], Value::Bool(true));
    assert_eq!(identity.identity().unwrap().device_id, "dev-1");
}

async fn wait_for_result(server: &MockServer, within: Duration) -> Value {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let requests = server.received_requests().await.unwrap_or_default();
        if let Some(ack) = requests
            .iter()
            .find(|r| r.url.path().ends_with("/commands/c1/result"))
        {
            return serde_json::from_slice(&ack.body).unwrap();
        }
        assert!(tokio::time::Instant::now() < deadline, "no command result posted");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[test]
fn session_token_round_trips() {
    assert_eq!(SessionToken::new("abc").expose(), "abc");
}
