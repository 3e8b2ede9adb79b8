// rigline-api: Async Rust client for the rigline control-plane API

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use auth::{AccessToken, DeviceCredentials};
pub use client::ControlPlaneClient;
pub use error::Error;
pub use models::{
    CommandOutcome, HealthResponse, HeartbeatRequest, LapTelemetry, PendingCommand,
    RegisterDeviceRequest, RegisterDeviceResponse,
};
pub use transport::{TlsMode, TransportConfig};
