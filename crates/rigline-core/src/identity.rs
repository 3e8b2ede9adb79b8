// ── Device identity ──
//
// Owns the registration state machine:
//
//   Unregistered ──ensure_registered──▶ Registering ──ok──▶ Registered
//        ▲                                   │                  │
//        └───────────────err─────────────────┘                  │
//        └────────────────────────reset─────────────────────────┘
//
// Registration runs under an async mutex so concurrent callers serialize
// and all but the first observe the cached identity. A successful
// registration is never repeated within the process, even if persisting it
// fails. Under the lock the file is re-read first, so an identity written by
// another process is adopted instead of registering a second device.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell, watch};
use tracing::{error, info, warn};

use crate::error::CoreError;
use crate::fingerprint::{self, DEFAULT_PROBE_TIMEOUT};
use crate::store::JsonDocument;

// ── Types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityState {
    Unregistered,
    Registering,
    Registered,
}

/// On-disk form of `device.json`. `device_id` and `api_key` are either
/// both present or both absent; anything else loads as unregistered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
}

/// A registered device.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub fingerprint: String,
    pub device_id: String,
    pub api_key: SecretString,
    pub registered_at: Option<DateTime<Utc>>,
}

impl DeviceIdentity {
    fn from_record(record: DeviceRecord) -> Option<Self> {
        let device_id = record.device_id.filter(|id| !id.is_empty())?;
        let api_key = record.api_key.filter(|key| !key.is_empty())?;
        Some(Self {
            fingerprint: record.fingerprint,
            device_id,
            api_key: SecretString::from(api_key),
            registered_at: record.registered_at,
        })
    }

    fn to_record(&self) -> DeviceRecord {
        DeviceRecord {
            fingerprint: self.fingerprint.clone(),
            device_id: Some(self.device_id.clone()),
            api_key: Some(self.api_key.expose_secret().to_owned()),
            registered_at: self.registered_at,
        }
    }
}

/// Fingerprint plus local metadata sent with a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub fingerprint: String,
    pub hostname: String,
    pub ip_address: Option<String>,
    pub os: String,
    pub agent_version: String,
}

impl From<RegistrationRequest> for rigline_api::RegisterDeviceRequest {
    fn from(request: RegistrationRequest) -> Self {
        Self {
            fingerprint: request.fingerprint,
            hostname: request.hostname,
            ip_address: request.ip_address,
            os: request.os,
            agent_version: request.agent_version,
        }
    }
}

/// Credentials issued by the control plane for this device.
#[derive(Debug, Clone)]
pub struct Registration {
    pub device_id: String,
    pub api_key: SecretString,
}

// ── IdentityManager ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct IdentityManager {
    doc: JsonDocument<DeviceRecord>,
    agent_version: String,
    probe_timeout: Duration,
    fingerprint: OnceCell<String>,
    identity: RwLock<Option<DeviceIdentity>>,
    state: watch::Sender<IdentityState>,
    registration: Mutex<()>,
}

impl IdentityManager {
    /// Load the identity stored at `path`.
    pub fn open(path: impl Into<PathBuf>, agent_version: impl Into<String>) -> Self {
        let doc = JsonDocument::new(path);
        let identity = load_identity(&doc);
        let initial = if identity.is_some() {
            IdentityState::Registered
        } else {
            IdentityState::Unregistered
        };
        let (state, _) = watch::channel(initial);

        Self {
            doc,
            agent_version: agent_version.into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            fingerprint: OnceCell::new(),
            identity: RwLock::new(identity),
            state,
            registration: Mutex::new(()),
        }
    }

    /// Use a precomputed fingerprint instead of probing the host.
    #[must_use]
    pub fn with_fingerprint(self, fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: OnceCell::new_with(Some(fingerprint.into())),
            ..self
        }
    }

    #[must_use]
    pub fn with_probe_timeout(self, probe_timeout: Duration) -> Self {
        Self {
            probe_timeout,
            ..self
        }
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> IdentityState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }

    pub fn path(&self) -> &Path {
        self.doc.path()
    }

    /// This machine's fingerprint, computed once per process.
    pub async fn fingerprint(&self) -> &str {
        self.fingerprint
            .get_or_init(|| fingerprint::fingerprint_with(self.probe_timeout))
            .await
    }

    /// Return the stored identity, registering through `register` first if
    /// there is none.
    pub async fn ensure_registered<F, Fut>(&self, register: F) -> Result<DeviceIdentity, CoreError>
    where
        F: FnOnce(RegistrationRequest) -> Fut,
        Fut: Future<Output = Result<Registration, CoreError>>,
    {
        if let Some(identity) = self.identity() {
            return Ok(identity);
        }

        let _guard = self.registration.lock().await;
        if let Some(identity) = self.identity() {
            return Ok(identity);
        }
        if let Some(identity) = load_identity(&self.doc) {
            info!(device_id = %identity.device_id, "adopting identity stored by another process");
            *self.identity.write().unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());
            self.state.send_replace(IdentityState::Registered);
            return Ok(identity);
        }

        let mut attempt = Attempt::begin(&self.state);
        let request = self.registration_request().await;
        let fingerprint = request.fingerprint.clone();
        info!(hostname = %request.hostname, "registering device with control plane");

        let registration = match register(request).await {
            Ok(registration) => registration,
            Err(e) => {
                warn!(error = %e, "device registration failed");
                return Err(e);
            }
        };
        if registration.device_id.is_empty() || registration.api_key.expose_secret().is_empty() {
            return Err(CoreError::RegistrationFailed {
                message: "control plane returned an empty device id or api key".into(),
            });
        }

        let identity = DeviceIdentity {
            fingerprint,
            device_id: registration.device_id,
            api_key: registration.api_key,
            registered_at: Some(Utc::now()),
        };
        if let Err(e) = self.doc.save(&identity.to_record()) {
            error!(error = %e, "registered but could not persist identity; keeping it in memory");
        }

        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());
        attempt.commit();
        info!(device_id = %identity.device_id, "device registered");
        Ok(identity)
    }

    /// Forget the registration. Idempotent.
    pub async fn reset(&self) -> Result<(), CoreError> {
        let _guard = self.registration.lock().await;
        let removed = self.doc.remove()?;
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.state.send_replace(IdentityState::Unregistered);
        if removed {
            info!(path = %self.doc.path().display(), "device identity reset");
        }
        Ok(())
    }

    async fn registration_request(&self) -> RegistrationRequest {
        RegistrationRequest {
            fingerprint: self.fingerprint().await.to_owned(),
            hostname: fingerprint::hostname(),
            ip_address: fingerprint::local_ip().map(|ip| ip.to_string()),
            os: std::env::consts::OS.to_owned(),
            agent_version: self.agent_version.clone(),
        }
    }
}

fn load_identity(doc: &JsonDocument<DeviceRecord>) -> Option<DeviceIdentity> {
    let record = doc.load();
    let has_id = record.device_id.as_deref().is_some_and(|id| !id.is_empty());
    let has_key = record.api_key.as_deref().is_some_and(|key| !key.is_empty());
    if has_id != has_key {
        warn!(
            path = %doc.path().display(),
            "identity file has only one of device_id/api_key; treating device as unregistered"
        );
        return None;
    }
    DeviceIdentity::from_record(record)
}

/// Holds the `Registering` state; falls back to `Unregistered` unless
/// committed, including when the registering future is dropped.
struct Attempt<'a> {
    state: &'a watch::Sender<IdentityState>,
    committed: bool,
}

impl<'a> Attempt<'a> {
    fn begin(state: &'a watch::Sender<IdentityState>) -> Self {
        state.send_replace(IdentityState::Registering);
        Self {
            state,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
        self.state.send_replace(IdentityState::Registered);
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.state.send_replace(IdentityState::Unregistered);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn manager(dir: &tempfile::TempDir) -> IdentityManager {
        IdentityManager::open(dir.path().join("device.json"), "0.1.0").with_fingerprint("fp-1")
    }

    async fn issue(_request: RegistrationRequest) -> Result<Registration, CoreError> {
        Ok(Registration {
            device_id: "dev-1".into(),
            api_key: SecretString::from("key-1".to_string()),
        })
    }

    #[tokio::test]
    async fn registers_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let ids = manager(&dir);
        assert_eq!(ids.state(), IdentityState::Unregistered);

        let identity = ids.ensure_registered(issue).await.unwrap();
        assert_eq!(identity.device_id, "dev-1");
        assert_eq!(identity.fingerprint, "fp-1");
        assert_eq!(ids.state(), IdentityState::Registered);

        let reopened = manager(&dir);
        assert_eq!(reopened.state(), IdentityState::Registered);
        let stored = reopened.identity().unwrap();
        assert_eq!(stored.api_key.expose_secret(), "key-1");
        assert!(stored.registered_at.is_some());
    }

    #[tokio::test]
    async fn request_carries_fingerprint_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let ids = manager(&dir);
        let mut seen = None;

        ids.ensure_registered(|request| {
            seen = Some(request);
            issue(RegistrationRequest {
                fingerprint: String::new(),
                hostname: String::new(),
                ip_address: None,
                os: String::new(),
                agent_version: String::new(),
            })
        })
        .await
        .unwrap();

        let request = seen.unwrap();
        assert_eq!(request.fingerprint, "fp-1");
        assert_eq!(request.agent_version, "0.1.0");
        assert_eq!(request.os, std::env::consts::OS);
        assert!(!request.hostname.is_empty());
    }

    #[tokio::test]
    async fn failure_returns_to_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        let ids = manager(&dir);

        let err = ids
            .ensure_registered(|_| async {
                Err(CoreError::Timeout {
                    timeout: Duration::from_secs(5),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Timeout { .. }));
        assert_eq!(ids.state(), IdentityState::Unregistered);
        assert!(!ids.path().exists());
    }

    #[tokio::test]
    async fn identity_written_by_another_process_is_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let cli = manager(&dir);
        let agent = manager(&dir);
        assert_eq!(agent.state(), IdentityState::Unregistered);

        cli.ensure_registered(issue).await.unwrap();

        let mut calls = 0;
        let identity = agent
            .ensure_registered(|request| {
                calls += 1;
                issue(request)
            })
            .await
            .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(identity.device_id, "dev-1");
        assert_eq!(agent.state(), IdentityState::Registered);
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ids = manager(&dir);

        let err = ids
            .ensure_registered(|_| async {
                Ok(Registration {
                    device_id: String::new(),
                    api_key: SecretString::from("k".to_string()),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RegistrationFailed { .. }));
        assert_eq!(ids.state(), IdentityState::Unregistered);
    }

    #[tokio::test]
    async fn reset_twice_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let ids = manager(&dir);
        ids.ensure_registered(issue).await.unwrap();

        ids.reset().await.unwrap();
        assert_eq!(ids.state(), IdentityState::Unregistered);
        ids.reset().await.unwrap();
        assert_eq!(ids.state(), IdentityState::Unregistered);
        assert!(ids.identity().is_none());
        assert!(!ids.path().exists());
    }

    #[test]
    fn half_written_record_loads_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, r#"{"fingerprint":"fp","device_id":"dev-9"}"#).unwrap();

        let ids = IdentityManager::open(&path, "0.1.0");
        assert_eq!(ids.state(), IdentityState::Unregistered);
        assert!(ids.identity().is_none());
    }
}
