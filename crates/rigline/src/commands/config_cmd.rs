//! Config subcommand handlers.

use std::fmt::Write as _;
use std::path::Path;

use dialoguer::{Input, Select};

use rigline_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::util::prompt_err;
use crate::config::{Settings, config_path};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking the password.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "api_url = \"{}\"", cfg.api_url);
    if let Some(ref u) = cfg.username {
        let _ = writeln!(out, "username = \"{u}\"");
    }
    if cfg.password.is_some() {
        let _ = writeln!(out, "password = \"****\"");
    }
    if let Some(ref env) = cfg.password_env {
        let _ = writeln!(out, "password_env = \"{env}\"");
    }
    let _ = writeln!(out, "heartbeat_secs = {}", cfg.heartbeat_secs);
    let _ = writeln!(out, "command_poll_secs = {}", cfg.command_poll_secs);
    let _ = writeln!(out, "telemetry_hz = {}", cfg.telemetry_hz);
    let _ = writeln!(out, "request_timeout_secs = {}", cfg.request_timeout_secs);
    let _ = writeln!(out, "max_auth_failures = {}", cfg.max_auth_failures);
    let _ = writeln!(out, "data_dir = \"{}\"", cfg.data_dir().display());
    let _ = writeln!(out, "insecure = {}", cfg.insecure);
    if let Some(ref ca) = cfg.ca_cert {
        let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
    }
    out.trim_end().to_owned()
}

/// Copy of `cfg` safe to print as JSON.
fn redacted(cfg: &Config) -> Config {
    Config {
        password: cfg.password.as_ref().map(|_| "****".into()),
        ..cfg.clone()
    }
}

/// Prompt for the operator password and offer keyring storage.
///
/// Returns `Some(password)` when the user chose plaintext config storage.
fn prompt_password(username: &str) -> Result<Option<String>, CliError> {
    let password = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }

    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the password?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        rigline_config::store_keyring_password(username, &password)?;
        eprintln!("   ✓ password stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(password))
    }
}

fn init(path: &Path) -> Result<(), CliError> {
    eprintln!("rigline configuration wizard");
    eprintln!("   Config path: {}\n", path.display());

    let defaults = Config::default();
    let api_url: String = Input::new()
        .with_prompt("Control plane URL")
        .default(defaults.api_url.clone())
        .interact_text()
        .map_err(prompt_err)?;
    url::Url::parse(&api_url).map_err(|e| CliError::Validation {
        field: "api_url".into(),
        reason: e.to_string(),
    })?;

    let username: String = Input::new()
        .with_prompt("Operator username (empty to skip)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    let (username, password) = if username.is_empty() {
        (None, None)
    } else {
        let password = prompt_password(&username)?;
        (Some(username), password)
    };

    let cfg = Config {
        api_url,
        username,
        password,
        ..defaults
    };
    rigline_config::save_config_to(&cfg, path)?;
    eprintln!("   ✓ wrote {}", path.display());
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config.clone().unwrap_or_else(config_path);

    match args.command {
        ConfigCommand::Path => output::print_output(&path.display().to_string(), global.quiet),
        ConfigCommand::Show => {
            let cfg = Settings::load(global)?.config;
            let out = output::render_single(
                global.output,
                &redacted(&cfg),
                format_config_redacted,
                |c| c.api_url.clone(),
            );
            output::print_output(&out, global.quiet);
        }
        ConfigCommand::Init => init(&path)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_never_shown() {
        let cfg = Config {
            username: Some("ops".into()),
            password: Some("hunter2".into()),
            ..Config::default()
        };
        let text = format_config_redacted(&cfg);
        assert!(text.contains("username = \"ops\""));
        assert!(!text.contains("hunter2"));
        assert_eq!(redacted(&cfg).password.as_deref(), Some("****"));
    }
}
