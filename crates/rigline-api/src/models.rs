// Wire models for the control-plane API.
//
// Field names mirror the JSON payloads exactly; everything the agent
// does not need is ignored on decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `GET /api/health`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok") || self.status.eq_ignore_ascii_case("healthy")
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub access_token: String,
}

/// `POST /api/devices/register` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDeviceRequest {
    pub fingerprint: String,
    pub hostname: String,
    pub ip_address: Option<String>,
    pub os: String,
    pub agent_version: String,
}

/// `POST /api/devices/register` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDeviceResponse {
    pub device_id: String,
    pub api_key: String,
}

/// `POST /api/devices/{id}/heartbeat` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeartbeatRequest {
    pub agent_version: String,
    pub sim_connected: bool,
    pub current_lap: u32,
    pub laps_recorded: u64,
}

/// One pending remote command, as delivered by the poll endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PendingCommand {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PendingCommandsResponse {
    #[serde(default)]
    pub commands: Vec<PendingCommand>,
}

/// Execution outcome reported back for a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `POST /api/devices/{id}/telemetry/laps` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LapTelemetry {
    pub lap: u32,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pending_command_params_are_optional() {
        let cmd: PendingCommand =
            serde_json::from_str(r#"{"id":"c1","action":"enter_car"}"#).unwrap();
        assert_eq!(cmd.action, "enter_car");
        assert!(cmd.params.is_none());

        let cmd: PendingCommand =
            serde_json::from_str(r#"{"id":"c2","action":"reset_car","params":{"hold_ms":250}}"#)
                .unwrap();
        assert_eq!(
            cmd.params.unwrap().get("hold_ms").and_then(Value::as_u64),
            Some(250)
        );
    }

    #[test]
    fn outcome_omits_absent_message() {
        let json = serde_json::to_string(&CommandOutcome {
            success: true,
            message: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"success":true}"#);
    }

    #[test]
    fn health_accepts_ok_and_healthy() {
        let ok: HealthResponse = serde_json::from_str(r#"{"status":"OK"}"#).unwrap();
        assert!(ok.is_ok());
        let down: HealthResponse = serde_json::from_str(r#"{"status":"degraded"}"#).unwrap();
        assert!(!down.is_ok());
    }
}
