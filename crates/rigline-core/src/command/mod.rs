// ── Remote command model ──
//
// Commands arrive from the control plane as an action name plus a loose
// JSON object. Each registered action carries typed parameter descriptors
// that are checked before its handler runs; dispatch stays keyed by name.

pub mod builtin;
mod registry;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use registry::{CommandInfo, CommandRegistry, RegistryError};

/// Parameters of one command invocation.
pub type CommandParams = Map<String, Value>;

// ── Results ──────────────────────────────────────────────────────────

/// Outcome of a command, reported back to the control plane verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

impl From<CommandResult> for rigline_api::CommandOutcome {
    fn from(result: CommandResult) -> Self {
        Self {
            success: result.success,
            message: result.message,
        }
    }
}

/// What a handler hands back: a typed result, or a raw JSON value that the
/// registry checks for a boolean `success` field.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerReply {
    Result(CommandResult),
    Raw(Value),
}

impl From<CommandResult> for HandlerReply {
    fn from(result: CommandResult) -> Self {
        Self::Result(result)
    }
}

impl From<Value> for HandlerReply {
    fn from(value: Value) -> Self {
        Self::Raw(value)
    }
}

/// Error raised by a handler; rendered into a failed [`CommandResult`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

pub type HandlerFuture = BoxFuture<'static, Result<HandlerReply, HandlerError>>;

/// A registered command handler.
pub type CommandHandler = Arc<dyn Fn(CommandParams) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`CommandHandler`].
pub fn handler<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(CommandParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerReply, HandlerError>> + Send + 'static,
{
    Arc::new(move |params| f(params).boxed())
}

// ── Parameter descriptors ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Integer,
    Number,
    Bool,
    String,
    Object,
}

impl ParamKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::String => value.is_string(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Bool => "a boolean",
            Self::String => "a string",
            Self::Object => "an object",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Declaration of one action: name, help text, parameters, example payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub action: String,
    pub description: Option<String>,
    pub params: Vec<ParamSpec>,
    pub example_params: Option<CommandParams>,
}

impl CommandSpec {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            description: None,
            params: Vec::new(),
            example_params: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn example(mut self, example: CommandParams) -> Self {
        self.example_params = Some(example);
        self
    }

    /// Check `params` against the descriptors. Unknown keys are allowed;
    /// `null` counts as absent.
    pub fn validate(&self, params: &CommandParams) -> Result<(), String> {
        for spec in &self.params {
            match params.get(&spec.name).filter(|v| !v.is_null()) {
                None if spec.required => {
                    return Err(format!("missing required parameter `{}`", spec.name));
                }
                Some(value) if !spec.kind.matches(value) => {
                    return Err(format!(
                        "parameter `{}` must be {}, got {}",
                        spec.name,
                        spec.kind,
                        json_type(value)
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a number",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> CommandParams {
        match value {
            Value::Object(map) => map,
            _ => CommandParams::new(),
        }
    }

    #[test]
    fn result_serializes_with_exact_field_names() {
        let ok = serde_json::to_value(CommandResult::ok()).ok();
        assert_eq!(ok, Some(json!({ "success": true })));

        let failed = serde_json::to_value(CommandResult::failure("boom")).ok();
        assert_eq!(failed, Some(json!({ "success": false, "message": "boom" })));
    }

    #[test]
    fn validate_reports_missing_and_mistyped() {
        let spec = CommandSpec::new("seat")
            .param(ParamSpec::required("slot", ParamKind::Integer))
            .param(ParamSpec::optional("label", ParamKind::String));

        assert!(spec.validate(&params(json!({ "slot": 2 }))).is_ok());
        assert!(spec.validate(&params(json!({ "slot": 2, "label": null }))).is_ok());

        let missing = spec.validate(&CommandParams::new());
        assert_eq!(missing, Err("missing required parameter `slot`".into()));

        let mistyped = spec.validate(&params(json!({ "slot": 1.5 })));
        assert_eq!(
            mistyped,
            Err("parameter `slot` must be an integer, got a number".into())
        );
    }

    #[test]
    fn number_accepts_integers() {
        assert!(ParamKind::Number.matches(&json!(3)));
        assert!(ParamKind::Number.matches(&json!(3.5)));
        assert!(!ParamKind::Integer.matches(&json!("3")));
    }
}
