// ── Agent coordinator ──
//
// Runs the rig's periodic work as independent tokio tasks:
//
//   heartbeat     ensure registered, report liveness, publish api.connected
//   command poll  fetch pending commands, execute in order, ack each result
//   telemetry     sample the sim, publish iracing status, queue finished laps
//   lap uploader  drain the lap queue into the control plane
//
// Each loop runs under a supervisor that restarts it after a panic. Every
// remote call is bounded by `request_timeout`, and every wait races the
// shared cancellation token so `stop()` returns promptly.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{CommandRegistry, CommandResult};
use crate::config::{AgentConfig, LoginCredentials};
use crate::control_plane::{ControlPlane, HeartbeatReport, LapRecord, SessionToken};
use crate::error::CoreError;
use crate::identity::{DeviceIdentity, IdentityManager, Registration, RegistrationRequest};
use crate::rig::{InputDevice, TelemetrySource};
use crate::status::{AgentStatus, SimStatus, StatusBoard};

const ACK_ATTEMPTS: u32 = 2;
const RESTART_DELAY: Duration = Duration::from_secs(1);

// ── AgentState ───────────────────────────────────────────────────────

/// Coordinator lifecycle, observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Running,
    Stopped,
    Failed { reason: String },
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed { .. })
    }
}

// ── AgentContext ─────────────────────────────────────────────────────

/// Everything the coordinator works with, built by the process entry
/// point and handed in.
pub struct AgentContext {
    pub config: AgentConfig,
    pub control_plane: Arc<dyn ControlPlane>,
    pub identity: Arc<IdentityManager>,
    pub registry: Arc<CommandRegistry>,
    pub telemetry: Arc<dyn TelemetrySource>,
    pub input: Arc<dyn InputDevice>,
}

// ── Agent ────────────────────────────────────────────────────────────

/// The coordinator.
///
/// Cheaply cloneable via `Arc<AgentInner>`. An agent runs once: `start()`
/// on a stopped agent does nothing.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    ctx: AgentContext,
    status: StatusBoard,
    state: watch::Sender<AgentState>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    session: AsyncMutex<Option<SessionToken>>,
    auth_failures: AtomicU32,
    warned_no_credentials: AtomicBool,
    lap_tx: mpsc::Sender<LapRecord>,
    lap_rx: AsyncMutex<mpsc::Receiver<LapRecord>>,
}

impl Agent {
    pub fn new(ctx: AgentContext) -> Self {
        let (state, _) = watch::channel(AgentState::Idle);
        let (lap_tx, lap_rx) = mpsc::channel(ctx.config.lap_queue_capacity.max(1));

        Self {
            inner: Arc::new(AgentInner {
                ctx,
                status: StatusBoard::new(),
                state,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                session: AsyncMutex::new(None),
                auth_failures: AtomicU32::new(0),
                warned_no_credentials: AtomicBool::new(false),
                lap_tx,
                lap_rx: AsyncMutex::new(lap_rx),
            }),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.ctx.config
    }

    pub fn identity(&self) -> &Arc<IdentityManager> {
        &self.inner.ctx.identity
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.inner.ctx.registry
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the loops. Must be called inside a tokio runtime; a second
    /// call is a no-op.
    pub fn start(&self) {
        let started = self.inner.state.send_if_modified(|state| {
            if *state == AgentState::Idle {
                *state = AgentState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(state = ?self.state(), "start ignored");
            return;
        }

        let handles = vec![
            self.supervise("heartbeat", Self::heartbeat_loop),
            self.supervise("command-poll", Self::command_loop),
            self.supervise("telemetry", Self::telemetry_loop),
            self.supervise("lap-upload", Self::lap_upload_loop),
        ];
        self.lock_handles().extend(handles);

        info!(
            heartbeat_secs = self.config().heartbeat_interval.as_secs_f64(),
            poll_secs = self.config().command_poll_interval.as_secs_f64(),
            commands = self.registry().len(),
            "agent started"
        );
    }

    /// Cancel every loop, wait for them to finish and release the input
    /// device. A failed agent keeps its `Failed` state.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<_> = self.lock_handles().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        if let Err(e) = self.inner.ctx.input.release_all().await {
            warn!(error = %e, "failed to release input device");
        }

        self.inner.status.set_api_connected(false);
        self.inner.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = AgentState::Stopped;
                true
            }
        });
        info!("agent stopped");
    }

    /// Resolve once the agent stops. Returns the fatal error if it failed.
    pub async fn wait(&self) -> Result<(), CoreError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(AgentState::is_terminal)
            .await
            .map_err(|_| CoreError::Internal("agent state channel closed".into()))?
            .clone();

        match state {
            AgentState::Failed { reason } => Err(CoreError::AuthenticationFailed { message: reason }),
            _ => Ok(()),
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn status(&self) -> AgentStatus {
        self.inner.status.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AgentStatus> {
        self.inner.status.subscribe()
    }

    pub fn state(&self) -> AgentState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AgentState> {
        self.inner.state.subscribe()
    }

    // ── Supervision ──────────────────────────────────────────────────

    fn supervise<F, Fut>(&self, name: &'static str, run: F) -> JoinHandle<()>
    where
        F: Fn(Agent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let agent = self.clone();
        tokio::spawn(async move {
            let cancel = agent.inner.cancel.clone();
            loop {
                match tokio::spawn(run(agent.clone())).await {
                    Ok(()) => break,
                    Err(e) if e.is_panic() && !cancel.is_cancelled() => {
                        error!(task = name, "loop panicked; restarting");
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(RESTART_DELAY) => {}
                        }
                    }
                    Err(_) => break,
                }
            }
            debug!(task = name, "loop exited");
        })
    }

    // ── Loops ────────────────────────────────────────────────────────

    async fn heartbeat_loop(self) {
        let cancel = self.inner.cancel.clone();
        let mut interval = ticker(self.config().heartbeat_interval);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if until_cancelled(&cancel, self.heartbeat_once()).await.is_none() {
                        break;
                    }
                }
            }
        }
    }

    async fn command_loop(self) {
        let cancel = self.inner.cancel.clone();
        let mut interval = ticker(self.config().command_poll_interval);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if until_cancelled(&cancel, self.poll_once()).await.is_none() {
                        break;
                    }
                }
            }
        }
    }

    async fn telemetry_loop(self) {
        let cancel = self.inner.cancel.clone();
        let mut interval = ticker(self.config().telemetry_interval);
        let mut laps = LapTracker::default();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => self.sample_once(&mut laps),
            }
        }
    }

    async fn lap_upload_loop(self) {
        let cancel = self.inner.cancel.clone();
        let mut rx = self.inner.lap_rx.lock().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                lap = rx.recv() => {
                    let Some(lap) = lap else { break };
                    if until_cancelled(&cancel, self.upload_lap(lap)).await.is_none() {
                        break;
                    }
                }
            }
        }
    }

    // ── Loop bodies ──────────────────────────────────────────────────

    async fn heartbeat_once(&self) {
        let identity = match self.ensure_identity().await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                self.inner.status.set_api_connected(false);
                return;
            }
            Err(e) => {
                self.note_failure("registration", &e);
                self.inner.status.set_api_connected(false);
                return;
            }
        };

        let status = self.status();
        let report = HeartbeatReport {
            agent_version: self.config().agent_version.clone(),
            sim_connected: status.iracing.connected,
            current_lap: status.iracing.lap,
            laps_recorded: status.api.laps_recorded,
        };

        match self.remote(self.cp().heartbeat(&identity, &report)).await {
            Ok(()) => {
                self.note_success();
                self.inner.status.set_api_connected(true);
                debug!("heartbeat sent");
            }
            Err(e) => {
                self.note_failure("heartbeat", &e);
                self.inner.status.set_api_connected(false);
            }
        }
    }

    async fn poll_once(&self) {
        let Some(identity) = self.identity().identity() else {
            return;
        };

        let commands = match self.remote(self.cp().poll_commands(&identity)).await {
            Ok(commands) => {
                self.note_success();
                commands
            }
            Err(e) => {
                self.note_failure("command poll", &e);
                return;
            }
        };
        if !commands.is_empty() {
            debug!(count = commands.len(), "received commands");
        }

        for command in commands {
            let result = self.registry().execute(&command.action, command.params).await;
            self.ack(&identity, &command.id, &result).await;
        }
    }

    fn sample_once(&self, laps: &mut LapTracker) {
        let sample = self.inner.ctx.telemetry.sample();
        self.inner.status.set_sim(SimStatus {
            connected: sample.connected,
            lap: sample.lap,
        });

        let Some(completed) = laps.observe(sample.connected, sample.lap) else {
            return;
        };
        let record = LapRecord {
            lap: completed,
            recorded_at: Utc::now(),
        };
        match self.inner.lap_tx.try_send(record) {
            Ok(()) => debug!(lap = completed, "lap queued for upload"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(lap = completed, "lap queue full; dropping lap");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    async fn upload_lap(&self, lap: LapRecord) {
        let Some(identity) = self.identity().identity() else {
            warn!(lap = lap.lap, "device not registered; dropping lap");
            return;
        };

        match self.remote(self.cp().submit_lap(&identity, &lap)).await {
            Ok(()) => {
                self.note_success();
                self.inner.status.record_lap_uploaded();
                info!(lap = lap.lap, "lap uploaded");
            }
            Err(e) => self.note_failure("lap upload", &e),
        }
    }

    /// Report a command result; one retry, then give up and move on.
    async fn ack(&self, identity: &DeviceIdentity, command_id: &str, result: &CommandResult) {
        let mut last_error = None;
        for attempt in 1..=ACK_ATTEMPTS {
            match self
                .remote(self.cp().ack_command(identity, command_id, result))
                .await
            {
                Ok(()) => {
                    self.note_success();
                    return;
                }
                Err(e) => {
                    warn!(command_id, attempt, error = %e, "failed to report command result");
                    last_error = Some(e);
                }
            }
        }
        if let Some(e) = last_error {
            self.note_failure("command ack", &e);
        }
    }

    // ── Registration & session ───────────────────────────────────────

    /// The registered identity, registering first if needed. `Ok(None)`
    /// means there is nothing to register with.
    async fn ensure_identity(&self) -> Result<Option<DeviceIdentity>, CoreError> {
        if let Some(identity) = self.identity().identity() {
            return Ok(Some(identity));
        }

        let Some(credentials) = self.config().credentials.as_ref() else {
            if !self.inner.warned_no_credentials.swap(true, Ordering::Relaxed) {
                warn!("device is not registered and no operator credentials are configured; agent is idle");
            }
            return Ok(None);
        };

        self.identity()
            .ensure_registered(|request| async move { self.register(credentials, &request).await })
            .await
            .map(Some)
    }

    async fn register(
        &self,
        credentials: &LoginCredentials,
        request: &RegistrationRequest,
    ) -> Result<Registration, CoreError> {
        self.remote(self.cp().health()).await?;
        let session = self.session(credentials).await?;
        let result = self
            .remote(self.cp().register_device(&session, request))
            .await;
        if matches!(&result, Err(e) if e.is_auth_failure()) {
            *self.inner.session.lock().await = None;
        }
        result
    }

    async fn session(&self, credentials: &LoginCredentials) -> Result<SessionToken, CoreError> {
        let mut session = self.inner.session.lock().await;
        if let Some(token) = session.as_ref() {
            return Ok(token.clone());
        }

        let token = self
            .remote(self.cp().login(&credentials.username, &credentials.password))
            .await?;
        debug!(username = %credentials.username, "operator login succeeded");
        *session = Some(token.clone());
        Ok(token)
    }

    // ── Failure accounting ───────────────────────────────────────────

    fn note_success(&self) {
        self.inner.auth_failures.store(0, Ordering::Relaxed);
    }

    fn note_failure(&self, operation: &str, err: &CoreError) {
        if !err.is_auth_failure() {
            warn!(operation, error = %err, "control plane call failed; retrying next cycle");
            return;
        }

        let failures = self.inner.auth_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let limit = self.config().max_auth_failures.max(1);
        warn!(operation, failures, limit, error = %err, "control plane rejected credentials");
        if failures >= limit {
            self.fail(&format!(
                "{failures} consecutive authentication failures (last during {operation}: {err})"
            ));
        }
    }

    fn fail(&self, reason: &str) {
        let failed = self.inner.state.send_if_modified(|state| {
            if *state == AgentState::Running {
                *state = AgentState::Failed {
                    reason: reason.to_owned(),
                };
                true
            } else {
                false
            }
        });
        if failed {
            error!(%reason, "agent failed");
            self.inner.cancel.cancel();
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn cp(&self) -> &dyn ControlPlane {
        self.inner.ctx.control_plane.as_ref()
    }

    /// Bound a control-plane call by the request timeout.
    async fn remote<T>(&self, call: impl Future<Output = Result<T, CoreError>>) -> Result<T, CoreError> {
        let limit = self.config().request_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(CoreError::Timeout { timeout: limit }))
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner
            .task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Interval that fires immediately, then every `period`, skipping ticks
/// missed while a body overran.
fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Detects lap completions from the sim's running lap counter.
#[derive(Debug, Default)]
struct LapTracker {
    last: Option<u32>,
}

impl LapTracker {
    /// Returns the lap just completed, if the counter advanced.
    fn observe(&mut self, connected: bool, lap: u32) -> Option<u32> {
        if !connected {
            self.last = None;
            return None;
        }
        let previous = self.last.replace(lap)?;
        (lap > previous && previous > 0).then_some(previous)
    }
}
