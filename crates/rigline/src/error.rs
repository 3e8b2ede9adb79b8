//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use rigline_config::ConfigError;
use rigline_core::{CoreError, StoreError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const ALREADY_RUNNING: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the control plane at {url}")]
    #[diagnostic(
        code(rigline::connection_failed),
        help(
            "Check that the control plane is running and reachable.\n\
             Reason: {reason}\n\
             Try: rigline --api-url <URL> device register"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out after {timeout:?}")]
    #[diagnostic(
        code(rigline::timeout),
        help("Raise request_timeout_secs in the config or check control plane responsiveness.")
    )]
    Timeout { timeout: Duration },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(rigline::auth_failed),
        help(
            "Verify the operator username and password.\n\
             If the device key was revoked, run: rigline device reset"
        )
    )]
    AuthFailed { message: String },

    #[error("No operator credentials configured")]
    #[diagnostic(
        code(rigline::no_credentials),
        help(
            "Configure credentials with: rigline config init\n\
             Or set RIGLINE_USERNAME and RIGLINE_PASSWORD."
        )
    )]
    NoCredentials,

    #[error("Registration rejected: {message}")]
    #[diagnostic(code(rigline::registration_failed))]
    RegistrationFailed { message: String },

    // ── Local state ──────────────────────────────────────────────────
    #[error("Another rigline process is already running ({holder})")]
    #[diagnostic(
        code(rigline::already_running),
        help("Stop the other instance first. Lock file: {lock}")
    )]
    AlreadyRunning { holder: String, lock: String },

    #[error("Unknown action '{action}'")]
    #[diagnostic(
        code(rigline::unknown_action),
        help("Mappable actions: {available}")
    )]
    UnknownAction { action: String, available: String },

    #[error("Local state error: {message}")]
    #[diagnostic(code(rigline::local_state))]
    LocalState { message: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error: {message}")]
    #[diagnostic(code(rigline::api_error))]
    ApiError { message: String },

    // ── Validation / configuration ───────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(rigline::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(rigline::config),
        help("Check the config file ({path}) or run: rigline config init")
    )]
    Config { message: String, path: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(rigline::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials | Self::RegistrationFailed { .. } => {
                exit_code::AUTH
            }
            Self::AlreadyRunning { .. } => exit_code::ALREADY_RUNNING,
            Self::UnknownAction { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Timeout { timeout } => Self::Timeout { timeout },
            CoreError::NoCredentials => Self::NoCredentials,
            CoreError::RegistrationFailed { message } => Self::RegistrationFailed { message },
            CoreError::Store(e) => e.into(),
            CoreError::AlreadyRunning { pid, path } => Self::AlreadyRunning {
                holder: pid.map_or_else(|| "pid unknown".into(), |pid| format!("pid {pid}")),
                lock: path.display().to_string(),
            },
            e @ CoreError::InstanceLock { .. } => Self::LocalState {
                message: e.to_string(),
            },
            CoreError::Api { message, .. } => Self::ApiError { message },
            CoreError::Config { message } => Self::Config {
                message,
                path: rigline_config::config_path().display().to_string(),
            },
            CoreError::Internal(message) => Self::ApiError { message },
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self::LocalState {
            message: err.to_string(),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials => Self::NoCredentials,
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config {
                message: other.to_string(),
                path: rigline_config::config_path().display().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn lock_conflict_has_its_own_exit_code() {
        let err = CliError::from(CoreError::AlreadyRunning {
            pid: Some(42),
            path: PathBuf::from("/tmp/rigline.lock"),
        });
        assert_eq!(err.exit_code(), exit_code::ALREADY_RUNNING);
        assert!(err.to_string().contains("pid 42"));
    }

    #[test]
    fn auth_and_connection_codes() {
        let auth = CliError::from(CoreError::AuthenticationFailed {
            message: "revoked".into(),
        });
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let conn = CliError::from(CoreError::ConnectionFailed {
            url: "http://control".into(),
            reason: "refused".into(),
        });
        assert_eq!(conn.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "api_url".into(),
            reason: "invalid URL".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
