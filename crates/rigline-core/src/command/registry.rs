// ── Command registry ──
//
// Single failure-contained entry point for every inbound command. Unknown
// actions, bad parameters, handler errors, panics and malformed replies all
// collapse into a failed `CommandResult`; nothing escapes `execute`.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{CommandHandler, CommandParams, CommandResult, CommandSpec, HandlerReply, ParamSpec};

const INVALID_RESULT_FORMAT: &str = "Handler returned invalid result format";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command action name must not be empty")]
    EmptyAction,

    #[error("example params for `{action}` do not match its parameters: {reason}")]
    InvalidExample { action: String, reason: String },
}

/// Introspection view of a registered command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandInfo {
    pub action: String,
    pub description: Option<String>,
    pub params: Vec<ParamSpec>,
    pub example_params: Option<CommandParams>,
}

impl From<&CommandSpec> for CommandInfo {
    fn from(spec: &CommandSpec) -> Self {
        Self {
            action: spec.action.clone(),
            description: spec.description.clone(),
            params: spec.params.clone(),
            example_params: spec.example_params.clone(),
        }
    }
}

struct Registration {
    spec: CommandSpec,
    handler: CommandHandler,
}

/// Maps action names to handlers, in registration order.
#[derive(Default)]
pub struct CommandRegistry {
    commands: IndexMap<String, Registration>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `spec.action`.
    ///
    /// Re-registering an action replaces its handler and keeps its original
    /// position in the listing.
    pub fn register(&mut self, spec: CommandSpec, handler: CommandHandler) -> Result<(), RegistryError> {
        if spec.action.trim().is_empty() {
            return Err(RegistryError::EmptyAction);
        }
        if let Some(example) = &spec.example_params {
            spec.validate(example)
                .map_err(|reason| RegistryError::InvalidExample {
                    action: spec.action.clone(),
                    reason,
                })?;
        }

        let action = spec.action.clone();
        let replaced = self
            .commands
            .insert(action.clone(), Registration { spec, handler })
            .is_some();
        if replaced {
            warn!(%action, "command handler replaced");
        } else {
            debug!(%action, "command registered");
        }
        Ok(())
    }

    /// Run `action` and always come back with a `CommandResult`.
    pub async fn execute(&self, action: &str, params: Option<CommandParams>) -> CommandResult {
        let Some(registration) = self.commands.get(action) else {
            warn!(%action, "unknown command");
            return CommandResult::failure(format!(
                "Unknown command: {action}. Available commands: {}",
                self.list_commands().join(", ")
            ));
        };

        let params = params.unwrap_or_default();
        if let Err(reason) = registration.spec.validate(&params) {
            warn!(%action, %reason, "rejected command parameters");
            return CommandResult::failure(format!("Invalid parameters for {action}: {reason}"));
        }

        let handler = &registration.handler;
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        let result = match outcome {
            Ok(Ok(reply)) => normalize(reply),
            Ok(Err(e)) => CommandResult::failure(format!("Command execution error: {e}")),
            Err(panic) => CommandResult::failure(format!(
                "Command execution error: {}",
                panic_message(panic.as_ref())
            )),
        };

        if result.success {
            info!(%action, "command executed");
        } else {
            warn!(%action, message = ?result.message, "command failed");
        }
        result
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn list_commands(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    pub fn get_info(&self, action: &str) -> Option<CommandInfo> {
        self.commands.get(action).map(|r| CommandInfo::from(&r.spec))
    }

    pub fn get_all_info(&self) -> IndexMap<String, CommandInfo> {
        self.commands
            .iter()
            .map(|(action, r)| (action.clone(), CommandInfo::from(&r.spec)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.list_commands())
            .finish()
    }
}

fn normalize(reply: HandlerReply) -> CommandResult {
    match reply {
        HandlerReply::Result(result) => result,
        HandlerReply::Raw(Value::Object(map)) => match map.get("success") {
            Some(Value::Bool(success)) => CommandResult {
                success: *success,
                message: map.get("message").and_then(Value::as_str).map(str::to_owned),
            },
            _ => CommandResult::failure(INVALID_RESULT_FORMAT),
        },
        HandlerReply::Raw(_) => CommandResult::failure(INVALID_RESULT_FORMAT),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned())
}
