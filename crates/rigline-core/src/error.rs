// ── Core error types ──
//
// Agent-level errors from rigline-core. Consumers never see HTTP status
// codes or JSON parse failures directly; the `From<rigline_api::Error>`
// impl translates transport-layer errors into agent-appropriate variants.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure reading or writing a persisted JSON document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize document for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach control plane at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Control plane call timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    // ── Identity errors ──────────────────────────────────────────────
    #[error("No operator credentials configured; cannot register this device")]
    NoCredentials,

    #[error("Registration rejected: {message}")]
    RegistrationFailed { message: String },

    // ── Local resources ──────────────────────────────────────────────
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(
        "Another agent instance is already running ({}, lock {})",
        holder(*pid),
        path.display()
    )]
    AlreadyRunning {
        /// Read from the lock file; unavailable where locks block reads.
        pid: Option<u32>,
        path: PathBuf,
    },

    #[error("Cannot acquire instance lock {}: {reason}", path.display())]
    InstanceLock { path: PathBuf, reason: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for credential rejections that count towards the
    /// coordinator's fatal auth threshold.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// Returns `true` if retrying on the next loop tick may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => true,
            Self::Api { status, .. } => status.is_none_or(|s| s >= 500 || s == 429),
            _ => false,
        }
    }
}

fn holder(pid: Option<u32>) -> String {
    pid.map_or_else(|| "pid unknown".to_owned(), |pid| format!("pid {pid}"))
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<rigline_api::Error> for CoreError {
    fn from(err: rigline_api::Error) -> Self {
        match err {
            rigline_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            rigline_api::Error::Transport(ref e) => {
                if e.is_connect() || e.is_timeout() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            rigline_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            rigline_api::Error::Timeout { timeout } => CoreError::Timeout { timeout },
            rigline_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            rigline_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            rigline_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::CoreError;

    #[test]
    fn api_auth_maps_to_auth_failure() {
        let err: CoreError = rigline_api::Error::Authentication {
            message: "revoked".into(),
        }
        .into();
        assert!(err.is_auth_failure());
        assert!(!err.is_transient());
    }

    #[test]
    fn api_status_keeps_code() {
        let err: CoreError = rigline_api::Error::Api {
            status: 503,
            message: "busy".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Api { status: Some(503), .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn timeout_is_transient() {
        let err = CoreError::Timeout {
            timeout: Duration::from_secs(5),
        };
        assert!(err.is_transient());
        assert!(!CoreError::NoCredentials.is_transient());
    }

    #[test]
    fn sub_second_timeout_keeps_its_precision() {
        let err: CoreError = rigline_api::Error::Timeout {
            timeout: Duration::from_millis(250),
        }
        .into();
        assert!(matches!(err, CoreError::Timeout { timeout } if timeout == Duration::from_millis(250)));
        assert_eq!(err.to_string(), "Control plane call timed out after 250ms");
    }

    #[test]
    fn lock_holder_may_be_unknown() {
        let err = CoreError::AlreadyRunning {
            pid: None,
            path: PathBuf::from("/tmp/rigline.lock"),
        };
        assert!(err.to_string().contains("pid unknown"));
    }
}
