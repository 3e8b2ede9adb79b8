// ── Runtime agent configuration ──
//
// These types describe *how* the agent runs: loop cadences, call bounds,
// credential material and where local files live. They never touch disk;
// the CLI builds an `AgentConfig` from rigline-config and hands it in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_COMMAND_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TELEMETRY_HZ: u32 = 60;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_AUTH_FAILURES: u32 = 3;
pub const DEFAULT_LAP_QUEUE: usize = 64;

/// Operator login used for the first registration only.
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub heartbeat_interval: Duration,
    pub command_poll_interval: Duration,
    pub telemetry_interval: Duration,
    /// Hard bound on every control-plane call.
    pub request_timeout: Duration,
    /// Consecutive authentication failures before the agent gives up.
    pub max_auth_failures: u32,
    pub lap_queue_capacity: usize,
    /// `None` leaves an unregistered agent idle.
    pub credentials: Option<LoginCredentials>,
    pub agent_version: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            command_poll_interval: DEFAULT_COMMAND_POLL_INTERVAL,
            telemetry_interval: telemetry_interval(DEFAULT_TELEMETRY_HZ),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_auth_failures: DEFAULT_MAX_AUTH_FAILURES,
            lap_queue_capacity: DEFAULT_LAP_QUEUE,
            credentials: None,
            agent_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// Sampling period for a telemetry rate in Hz (clamped to at least 1 Hz).
pub fn telemetry_interval(hz: u32) -> Duration {
    Duration::from_secs(1) / hz.max(1)
}

// ── Data directory layout ────────────────────────────────────────────

/// Files the agent keeps under its data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn device_file(&self) -> PathBuf {
        self.root.join("device.json")
    }

    pub fn joystick_file(&self) -> PathBuf {
        self.root.join("joystick.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join("rigline.lock")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_rate_to_period() {
        assert_eq!(telemetry_interval(60), Duration::from_nanos(16_666_666));
        assert_eq!(telemetry_interval(0), Duration::from_secs(1));
    }

    #[test]
    fn data_paths_layout() {
        let paths = DataPaths::new("/var/lib/rigline");
        assert_eq!(paths.device_file(), Path::new("/var/lib/rigline/device.json"));
        assert_eq!(paths.lock_file(), Path::new("/var/lib/rigline/rigline.lock"));
        assert_eq!(paths.log_dir(), Path::new("/var/lib/rigline/logs"));
    }
}
