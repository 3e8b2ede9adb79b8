// ── Rig-side collaborators ──
//
// The simulator telemetry feed and the virtual joystick sit behind these
// traits. The defaults do nothing useful on their own: `OfflineTelemetry`
// always reports a disconnected sim and `LoggingInputDevice` only traces
// button presses. Real adapters plug in through `AgentContext`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

// ── Telemetry ────────────────────────────────────────────────────────

/// One reading of live simulator state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySample {
    pub connected: bool,
    pub lap: u32,
}

/// Source of live simulator state. `sample` is called at the telemetry
/// rate and must not block on network I/O.
pub trait TelemetrySource: Send + Sync {
    fn sample(&self) -> TelemetrySample;
}

/// Telemetry source for rigs without a simulator attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTelemetry;

impl TelemetrySource for OfflineTelemetry {
    fn sample(&self) -> TelemetrySample {
        TelemetrySample::default()
    }
}

// ── Input injection ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("input device error: {0}")]
pub struct InputError(pub String);

/// Virtual controller used by command handlers to press buttons.
#[async_trait]
pub trait InputDevice: Send + Sync {
    /// Press `button`, hold it for `hold`, release it.
    async fn press(&self, button: u32, hold: Duration) -> Result<(), InputError>;

    /// Release everything currently held.
    async fn release_all(&self) -> Result<(), InputError>;
}

/// Input device that only records presses in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInputDevice;

#[async_trait]
impl InputDevice for LoggingInputDevice {
    async fn press(&self, button: u32, hold: Duration) -> Result<(), InputError> {
        info!(button, hold_ms = hold.as_millis(), "button press");
        tokio::time::sleep(hold).await;
        Ok(())
    }

    async fn release_all(&self) -> Result<(), InputError> {
        info!("released all buttons");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_telemetry_is_disconnected() {
        assert_eq!(OfflineTelemetry.sample(), TelemetrySample::default());
    }

    #[tokio::test(start_paused = true)]
    async fn logging_device_holds_for_duration() {
        let started = tokio::time::Instant::now();
        let result = LoggingInputDevice.press(4, Duration::from_millis(250)).await;
        assert_eq!(result, Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(LoggingInputDevice.release_all().await, Ok(()));
    }
}
