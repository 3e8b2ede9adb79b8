//! Agent coordination layer between `rigline-api` and the `rigline` binary.
//!
//! This crate owns what a rig agent *does*; the binary only wires it up:
//!
//! - **[`Agent`]**: Coordinator running the heartbeat, command-poll,
//!   telemetry and lap-upload loops as supervised tokio tasks. Publishes an
//!   [`AgentStatus`] snapshot and an [`AgentState`] through `watch` channels.
//!
//! - **[`IdentityManager`]**: Registration state machine over `device.json`.
//!   Registration is a mutex-guarded critical section that succeeds at most
//!   once per device.
//!
//! - **[`CommandRegistry`]**: Failure-contained dispatch from action names to
//!   async handlers with typed parameter descriptors.
//!
//! - **[`InputMapping`]**: Persisted joystick button assignments with the
//!   `enter_car` / `reset_car` alias.
//!
//! - **[`ControlPlane`]**: The collaborator trait the coordinator talks to;
//!   [`HttpControlPlane`] adapts `rigline_api::ControlPlaneClient` to it.
//!
//! - Leaves: [`fingerprint`] (machine identity hash), [`JsonDocument`]
//!   (forward-compatible JSON files), [`InstanceLock`] (single-instance guard).

pub mod agent;
pub mod command;
pub mod config;
pub mod control_plane;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod input;
pub mod instance;
pub mod rig;
pub mod status;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use agent::{Agent, AgentContext, AgentState};
pub use command::{
    CommandHandler, CommandInfo, CommandParams, CommandRegistry, CommandResult, CommandSpec,
    HandlerError, HandlerReply, ParamKind, ParamSpec, RegistryError, handler,
};
pub use config::{AgentConfig, DataPaths, LoginCredentials};
pub use control_plane::{
    ControlPlane, HeartbeatReport, HttpControlPlane, LapRecord, RemoteCommand, SessionToken,
};
pub use error::{CoreError, StoreError};
pub use fingerprint::{HardwareProbe, HostFacts};
pub use identity::{
    DeviceIdentity, DeviceRecord, IdentityManager, IdentityState, Registration,
    RegistrationRequest,
};
pub use input::{ButtonMapping, InputMapping};
pub use instance::InstanceLock;
pub use rig::{
    InputDevice, InputError, LoggingInputDevice, OfflineTelemetry, TelemetrySample,
    TelemetrySource,
};
pub use status::{AgentStatus, ApiStatus, SimStatus, StatusBoard};
pub use store::JsonDocument;

pub use rigline_api::{TlsMode, TransportConfig};
