use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `rigline-api` crate.
///
/// Covers every failure mode of the control-plane HTTP surface:
/// authentication, transport, API status errors, and payload decoding.
/// `rigline-core` maps these into agent-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected, or a protected call answered 401/403.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request exceeded the client's configured timeout.
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── API ─────────────────────────────────────────────────────────
    /// Non-success HTTP status from the control plane.
    #[error("Control plane error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the control plane rejected our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next loop tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Api {
            status: 503,
            message: "maintenance".into(),
        };
        assert!(err.is_transient());
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = Error::Api {
            status: 400,
            message: "bad request".into(),
        };
        assert!(!err.is_transient());
        assert!(!err.is_not_found());
    }

    #[test]
    fn authentication_is_flagged() {
        let err = Error::Authentication {
            message: "bad key".into(),
        };
        assert!(err.is_auth_failure());
        assert!(!err.is_transient());
    }
}
