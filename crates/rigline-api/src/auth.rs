use secrecy::{ExposeSecret, SecretString};

/// Header carrying the per-device API key on device-scoped endpoints.
pub const DEVICE_KEY_HEADER: &str = "X-Device-Key";

/// Bearer token returned by `POST /api/auth/login`.
///
/// Only needed for registration: once a device holds its own API key,
/// every further call authenticates with [`DeviceCredentials`].
#[derive(Debug, Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub fn bearer(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Device-scoped credentials issued at registration.
#[derive(Debug, Clone)]
pub struct DeviceCredentials {
    pub device_id: String,
    pub api_key: SecretString,
}

impl DeviceCredentials {
    pub fn new(device_id: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            device_id: device_id.into(),
            api_key,
        }
    }

    pub(crate) fn key(&self) -> &str {
        self.api_key.expose_secret()
    }
}
