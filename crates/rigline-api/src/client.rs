// Control-plane HTTP client
//
// Wraps `reqwest::Client` with URL construction, auth header injection,
// and status-to-error mapping. Every endpoint returns a decoded payload or
// a typed `Error`; the caller never sees raw responses.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::auth::{AccessToken, DEVICE_KEY_HEADER, DeviceCredentials};
use crate::error::Error;
use crate::models::{
    CommandOutcome, HealthResponse, HeartbeatRequest, LapTelemetry, LoginRequest, LoginResponse,
    PendingCommand, PendingCommandsResponse, RegisterDeviceRequest, RegisterDeviceResponse,
};
use crate::transport::TransportConfig;

/// Async client for the rigline control plane.
///
/// Cheap to clone: `reqwest::Client` is internally reference counted.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: Url,
    /// Set when the client was built from a `TransportConfig`.
    timeout: Option<Duration>,
}

impl ControlPlaneClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the control-plane root (e.g. `https://rigs.example.com`);
    /// every endpoint lives under `/api/`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout: Some(transport.timeout),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout: None,
        }
    }

    /// The control-plane base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /api/health` -- unauthenticated reachability probe.
    pub async fn health(&self) -> Result<HealthResponse, Error> {
        let url = self.api_url("health")?;
        debug!("GET {}", url);
        let resp = self.send(self.http.get(url)).await?;
        self.decode(resp).await
    }

    /// Exchange operator credentials for a bearer token.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<AccessToken, Error> {
        let url = self.api_url("auth/login")?;
        debug!("logging in at {}", url);

        let body = LoginRequest {
            username,
            password: password.expose_secret(),
        };
        let resp = self.send(self.http.post(url).json(&body)).await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {}", preview(&body)),
            });
        }

        let login: LoginResponse = self.decode(resp).await?;
        debug!("login successful");
        Ok(AccessToken::new(login.access_token))
    }

    /// Register this machine. Requires an operator bearer token.
    pub async fn register_device(
        &self,
        token: &AccessToken,
        request: &RegisterDeviceRequest,
    ) -> Result<RegisterDeviceResponse, Error> {
        let url = self.api_url("devices/register")?;
        debug!(fingerprint = %request.fingerprint, "POST {}", url);
        let resp = self
            .send(self.http.post(url).bearer_auth(token.bearer()).json(request))
            .await?;
        self.decode(resp).await
    }

    /// Liveness signal for a registered device.
    pub async fn heartbeat(
        &self,
        device: &DeviceCredentials,
        request: &HeartbeatRequest,
    ) -> Result<(), Error> {
        let url = self.device_url(device, "heartbeat")?;
        trace!("POST {}", url);
        self.post_device(device, url, request).await
    }

    /// Fetch commands queued for this device, oldest first.
    pub async fn pending_commands(
        &self,
        device: &DeviceCredentials,
    ) -> Result<Vec<PendingCommand>, Error> {
        let url = self.device_url(device, "commands")?;
        trace!("GET {}", url);
        let resp = self
            .send(self.http.get(url).header(DEVICE_KEY_HEADER, device.key()))
            .await?;
        let page: PendingCommandsResponse = self.decode(resp).await?;
        Ok(page.commands)
    }

    /// Acknowledge a command with its execution outcome.
    pub async fn report_result(
        &self,
        device: &DeviceCredentials,
        command_id: &str,
        outcome: &CommandOutcome,
    ) -> Result<(), Error> {
        let url = self.device_url(device, &format!("commands/{command_id}/result"))?;
        debug!(success = outcome.success, "POST {}", url);
        self.post_device(device, url, outcome).await
    }

    /// Upload a completed lap.
    pub async fn submit_lap(
        &self,
        device: &DeviceCredentials,
        lap: &LapTelemetry,
    ) -> Result<(), Error> {
        let url = self.device_url(device, "telemetry/laps")?;
        debug!(lap = lap.lap, "POST {}", url);
        self.post_device(device, url, lap).await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/{path}`
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/api/{path}"))?)
    }

    /// `{base}/api/devices/{device_id}/{path}`
    pub(crate) fn device_url(&self, device: &DeviceCredentials, path: &str) -> Result<Url, Error> {
        self.api_url(&format!("devices/{}/{path}", device.device_id))
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn post_device(
        &self,
        device: &DeviceCredentials,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<(), Error> {
        let resp = self
            .send(self.http.post(url).header(DEVICE_KEY_HEADER, device.key()).json(body))
            .await?;
        Self::check_status(resp).await.map(|_| ())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        request.send().await.map_err(|e| self.transport_error(e))
    }

    /// Timeouts against our own configured limit become `Error::Timeout`.
    fn transport_error(&self, err: reqwest::Error) -> Error {
        match self.timeout {
            Some(timeout) if err.is_timeout() => Error::Timeout { timeout },
            _ => Error::Transport(err),
        }
    }

    /// Map non-success statuses to typed errors.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication {
                message: format!("control plane rejected credentials (HTTP {status})"),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: preview(&body).to_owned(),
            });
        }

        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        let resp = Self::check_status(resp).await?;
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body,
        })
    }
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn api_url_tolerates_trailing_slash() {
        let client = ControlPlaneClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://rigs.example.com/").unwrap(),
        );
        assert_eq!(
            client.api_url("health").unwrap().as_str(),
            "https://rigs.example.com/api/health"
        );
    }

    #[test]
    fn device_url_is_scoped_by_id() {
        let client = ControlPlaneClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://rigs.example.com").unwrap(),
        );
        let device = DeviceCredentials::new("dev-42", SecretString::from("k".to_string()));
        assert_eq!(
            client.device_url(&device, "commands").unwrap().as_str(),
            "https://rigs.example.com/api/devices/dev-42/commands"
        );
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        assert_eq!(preview(&long).chars().count(), 200);
        assert_eq!(preview("short"), "short");
    }
}
