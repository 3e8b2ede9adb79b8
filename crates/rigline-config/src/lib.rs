//! Configuration for the rigline agent.
//!
//! A single TOML file merged with `RIGLINE_*` environment variables,
//! operator credential resolution (env + keyring + plaintext), the data
//! directory layout, and translation to `rigline_core::AgentConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use rigline_core::config::{
    DEFAULT_LAP_QUEUE, DEFAULT_MAX_AUTH_FAILURES, DEFAULT_TELEMETRY_HZ, telemetry_interval,
};
use rigline_core::{AgentConfig, DataPaths, LoginCredentials, TlsMode, TransportConfig};

/// Keyring service name; entries are keyed `<username>/password`.
pub const KEYRING_SERVICE: &str = "rigline";

/// Environment variable consulted for the operator password.
pub const PASSWORD_ENV: &str = "RIGLINE_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no operator credentials configured")]
    NoCredentials,

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config struct ──────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Control plane base URL (e.g., "https://control.example.com").
    pub api_url: String,

    /// Operator account used for the first registration.
    pub username: Option<String>,

    /// Operator password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    pub password_env: Option<String>,

    pub heartbeat_secs: u64,
    pub command_poll_secs: u64,
    pub telemetry_hz: u32,
    pub request_timeout_secs: u64,
    pub max_auth_failures: u32,

    /// Override for the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Accept self-signed TLS certificates.
    pub insecure: bool,

    /// Path to a custom CA certificate (PEM).
    pub ca_cert: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            username: None,
            password: None,
            password_env: None,
            heartbeat_secs: 30,
            command_poll_secs: 2,
            telemetry_hz: DEFAULT_TELEMETRY_HZ,
            request_timeout_secs: 5,
            max_auth_failures: DEFAULT_MAX_AUTH_FAILURES,
            data_dir: None,
            insecure: false,
            ca_cert: None,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "rigline", "rigline")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", "rigline", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform default data directory.
pub fn default_data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".local", "share", "rigline"]),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

impl Config {
    /// The configured data directory, or the platform default.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn data_paths(&self) -> DataPaths {
        DataPaths::new(self.data_dir())
    }
}

// ── Loading ─────────────────────────────────────────────────────────

/// Defaults merged with the TOML file at `path` (missing file is fine).
pub fn file_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
}

/// File layer plus `RIGLINE_*` environment overrides.
pub fn figment(path: &Path) -> Figment {
    file_figment(path).merge(Env::prefixed("RIGLINE_").ignore(&["password", "config"]))
}

/// Load config from the canonical path and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from an explicit file path and the environment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    Ok(config)
}

// ── Saving ──────────────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Write config to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(username: &str) -> Result<keyring::Entry, ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{username}/password"))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

/// Password stored in the system keyring for `username`, if any.
pub fn keyring_password(username: &str) -> Option<String> {
    keyring_entry(username).ok()?.get_password().ok()
}

/// Store the operator password in the system keyring.
pub fn store_keyring_password(username: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(username)?
        .set_password(password)
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

/// Resolve operator credentials from the environment, keyring and config.
pub fn resolve_credentials(cfg: &Config) -> Result<LoginCredentials, ConfigError> {
    resolve_credentials_with(cfg, |name| std::env::var(name).ok(), keyring_password)
}

/// Password chain: `password_env` → `RIGLINE_PASSWORD` → keyring → plaintext.
pub fn resolve_credentials_with(
    cfg: &Config,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<LoginCredentials, ConfigError> {
    let username = cfg
        .username
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::NoCredentials)?;

    let password = cfg
        .password_env
        .as_deref()
        .and_then(&env)
        .or_else(|| env(PASSWORD_ENV))
        .or_else(|| keyring(&username))
        .or_else(|| cfg.password.clone())
        .filter(|p| !p.is_empty())
        .ok_or(ConfigError::NoCredentials)?;

    Ok(LoginCredentials {
        username,
        password: SecretString::from(password),
    })
}

// ── Translation ─────────────────────────────────────────────────────

fn positive(field: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_secs(value))
}

/// Parse `api_url`.
pub fn api_base_url(cfg: &Config) -> Result<Url, ConfigError> {
    cfg.api_url.parse().map_err(|_| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {}", cfg.api_url),
    })
}

/// HTTP transport settings (TLS mode and per-request timeout).
pub fn transport_config(cfg: &Config) -> Result<TransportConfig, ConfigError> {
    let tls = if cfg.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = cfg.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    Ok(TransportConfig {
        tls,
        timeout: positive("request_timeout_secs", cfg.request_timeout_secs)?,
    })
}

/// Build an `AgentConfig`, resolving credentials through `resolve`.
///
/// Missing credentials leave `credentials` empty; any other resolution
/// failure is returned.
pub fn to_agent_config_with(
    cfg: &Config,
    resolve: impl FnOnce(&Config) -> Result<LoginCredentials, ConfigError>,
) -> Result<AgentConfig, ConfigError> {
    if !(1..=1000).contains(&cfg.telemetry_hz) {
        return Err(ConfigError::Validation {
            field: "telemetry_hz".into(),
            reason: format!("expected 1..=1000, got {}", cfg.telemetry_hz),
        });
    }
    if cfg.max_auth_failures == 0 {
        return Err(ConfigError::Validation {
            field: "max_auth_failures".into(),
            reason: "must be greater than zero".into(),
        });
    }

    let credentials = match resolve(cfg) {
        Ok(creds) => Some(creds),
        Err(ConfigError::NoCredentials) => None,
        Err(e) => return Err(e),
    };

    Ok(AgentConfig {
        heartbeat_interval: positive("heartbeat_secs", cfg.heartbeat_secs)?,
        command_poll_interval: positive("command_poll_secs", cfg.command_poll_secs)?,
        telemetry_interval: telemetry_interval(cfg.telemetry_hz),
        request_timeout: positive("request_timeout_secs", cfg.request_timeout_secs)?,
        max_auth_failures: cfg.max_auth_failures,
        lap_queue_capacity: DEFAULT_LAP_QUEUE,
        credentials,
        ..AgentConfig::default()
    })
}

/// Build an `AgentConfig` using the real credential chain.
pub fn to_agent_config(cfg: &Config) -> Result<AgentConfig, ConfigError> {
    to_agent_config_with(cfg, resolve_credentials)
}
