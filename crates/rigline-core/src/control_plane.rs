// ── Control-plane collaborator ──
//
// The coordinator only talks to the control plane through `ControlPlane`.
// `HttpControlPlane` adapts `rigline_api::ControlPlaneClient` to it; tests
// substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use rigline_api::{
    AccessToken, CommandOutcome, ControlPlaneClient, DeviceCredentials, HeartbeatRequest,
    LapTelemetry, RegisterDeviceRequest, TransportConfig,
};
use url::Url;

use crate::command::{CommandParams, CommandResult};
use crate::error::CoreError;
use crate::identity::{DeviceIdentity, Registration, RegistrationRequest};

/// Operator session obtained from `login`.
#[derive(Debug, Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// A command waiting for this device.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCommand {
    pub id: String,
    pub action: String,
    pub params: Option<CommandParams>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub agent_version: String,
    pub sim_connected: bool,
    pub current_lap: u32,
    pub laps_recorded: u64,
}

/// A completed lap queued for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapRecord {
    pub lap: u32,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn health(&self) -> Result<(), CoreError>;

    async fn login(&self, username: &str, password: &SecretString) -> Result<SessionToken, CoreError>;

    async fn register_device(
        &self,
        session: &SessionToken,
        request: &RegistrationRequest,
    ) -> Result<Registration, CoreError>;

    async fn heartbeat(&self, device: &DeviceIdentity, report: &HeartbeatReport) -> Result<(), CoreError>;

    /// Pending commands, oldest first.
    async fn poll_commands(&self, device: &DeviceIdentity) -> Result<Vec<RemoteCommand>, CoreError>;

    async fn ack_command(
        &self,
        device: &DeviceIdentity,
        command_id: &str,
        result: &CommandResult,
    ) -> Result<(), CoreError>;

    async fn submit_lap(&self, device: &DeviceIdentity, lap: &LapRecord) -> Result<(), CoreError>;
}

// ── HTTP adapter ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: ControlPlaneClient,
}

impl HttpControlPlane {
    pub fn new(client: ControlPlaneClient) -> Self {
        Self { client }
    }

    /// Build the HTTP client for `base_url` with the given transport settings.
    pub fn connect(base_url: Url, transport: &TransportConfig) -> Result<Self, CoreError> {
        Ok(Self::new(ControlPlaneClient::new(base_url, transport)?))
    }

    pub fn client(&self) -> &ControlPlaneClient {
        &self.client
    }
}

fn credentials(device: &DeviceIdentity) -> DeviceCredentials {
    DeviceCredentials::new(device.device_id.clone(), device.api_key.clone())
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn health(&self) -> Result<(), CoreError> {
        let health = self.client.health().await?;
        if health.is_ok() {
            Ok(())
        } else {
            Err(CoreError::Api {
                message: format!("control plane reports status '{}'", health.status),
                status: None,
            })
        }
    }

    async fn login(&self, username: &str, password: &SecretString) -> Result<SessionToken, CoreError> {
        let token = self.client.login(username, password).await?;
        Ok(SessionToken::new(token.bearer()))
    }

    async fn register_device(
        &self,
        session: &SessionToken,
        request: &RegistrationRequest,
    ) -> Result<Registration, CoreError> {
        let token = AccessToken::new(session.expose());
        let response = self
            .client
            .register_device(&token, &RegisterDeviceRequest::from(request.clone()))
            .await?;
        Ok(Registration {
            device_id: response.device_id,
            api_key: SecretString::from(response.api_key),
        })
    }

    async fn heartbeat(&self, device: &DeviceIdentity, report: &HeartbeatReport) -> Result<(), CoreError> {
        let request = HeartbeatRequest {
            agent_version: report.agent_version.clone(),
            sim_connected: report.sim_connected,
            current_lap: report.current_lap,
            laps_recorded: report.laps_recorded,
        };
        Ok(self.client.heartbeat(&credentials(device), &request).await?)
    }

    async fn poll_commands(&self, device: &DeviceIdentity) -> Result<Vec<RemoteCommand>, CoreError> {
        let pending = self.client.pending_commands(&credentials(device)).await?;
        Ok(pending
            .into_iter()
            .map(|cmd| RemoteCommand {
                id: cmd.id,
                action: cmd.action,
                params: cmd.params,
            })
            .collect())
    }

    async fn ack_command(
        &self,
        device: &DeviceIdentity,
        command_id: &str,
        result: &CommandResult,
    ) -> Result<(), CoreError> {
        let outcome = CommandOutcome::from(result.clone());
        Ok(self
            .client
            .report_result(&credentials(device), command_id, &outcome)
            .await?)
    }

    async fn submit_lap(&self, device: &DeviceIdentity, lap: &LapRecord) -> Result<(), CoreError> {
        let telemetry = LapTelemetry {
            lap: lap.lap,
            recorded_at: lap.recorded_at,
        };
        Ok(self.client.submit_lap(&credentials(device), &telemetry).await?)
    }
}
