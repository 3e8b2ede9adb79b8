//! `rigline status`: local registration and button mapping.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use rigline_core::IdentityState;

use crate::cli::GlobalOpts;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct LocalStatus {
    state: IdentityState,
    fingerprint: String,
    device_id: Option<String>,
    registered_at: Option<String>,
    api_url: String,
    data_dir: String,
    buttons: BTreeMap<String, Option<u32>>,
}

fn detail(s: &LocalStatus, color: bool) -> String {
    let mut out = String::new();
    let value = |v: Option<&str>| v.map_or_else(|| output::missing(color), str::to_owned);

    let _ = writeln!(
        out,
        "Registered:    {}",
        output::flag(s.state == IdentityState::Registered, color)
    );
    let _ = writeln!(out, "Fingerprint:   {}", s.fingerprint);
    let _ = writeln!(out, "Device ID:     {}", value(s.device_id.as_deref()));
    let _ = writeln!(out, "Registered at: {}", value(s.registered_at.as_deref()));
    let _ = writeln!(out, "Control plane: {}", s.api_url);
    let _ = writeln!(out, "Data dir:      {}", s.data_dir);
    for (key, button) in &s.buttons {
        let shown = button.map_or_else(|| output::missing(color), |b| b.to_string());
        let _ = writeln!(out, "{key}: {shown}");
    }
    out.trim_end().to_owned()
}

pub async fn handle(settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let identity = settings.identity();
    let mapping = settings.input_mapping();
    let registered = identity.identity();

    let status = LocalStatus {
        state: identity.state(),
        fingerprint: registered.as_ref().map_or_else(String::new, |id| id.fingerprint.clone()),
        device_id: registered.as_ref().map(|id| id.device_id.clone()),
        registered_at: registered
            .as_ref()
            .and_then(|id| id.registered_at)
            .map(|t| t.to_rfc3339()),
        api_url: settings.config.api_url.clone(),
        data_dir: settings.paths().root().display().to_string(),
        buttons: mapping.get_all(),
    };
    // Unregistered machines show the freshly computed fingerprint.
    let status = if status.fingerprint.is_empty() {
        LocalStatus {
            fingerprint: identity.fingerprint().await.to_owned(),
            ..status
        }
    } else {
        status
    };

    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        &status,
        |s| detail(s, color),
        |s| s.device_id.clone().unwrap_or_default(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
