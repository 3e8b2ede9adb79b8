//! Device subcommand handlers.

use serde::Serialize;

use rigline_core::{
    ControlPlane, CoreError, DeviceIdentity, HttpControlPlane, IdentityManager, LoginCredentials,
    Registration, RegistrationRequest,
};

use crate::cli::{DeviceArgs, DeviceCommand, GlobalOpts};
use crate::commands::util;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Registered {
    device_id: String,
    fingerprint: String,
    registered_at: Option<String>,
}

impl From<&DeviceIdentity> for Registered {
    fn from(id: &DeviceIdentity) -> Self {
        Self {
            device_id: id.device_id.clone(),
            fingerprint: id.fingerprint.clone(),
            registered_at: id.registered_at.map(|t| t.to_rfc3339()),
        }
    }
}

async fn register(settings: &Settings, identity: &IdentityManager) -> Result<DeviceIdentity, CliError> {
    if let Some(existing) = identity.identity() {
        return Ok(existing);
    }

    let creds = rigline_config::resolve_credentials(&settings.config)?;
    let control_plane = settings.control_plane()?;
    let (control_plane, creds) = (&control_plane, &creds);
    let registered = identity
        .ensure_registered(|request| async move {
            login_and_register(control_plane, creds, &request).await
        })
        .await?;
    Ok(registered)
}

async fn login_and_register(
    control_plane: &HttpControlPlane,
    creds: &LoginCredentials,
    request: &RegistrationRequest,
) -> Result<Registration, CoreError> {
    control_plane.health().await?;
    let session = control_plane.login(&creds.username, &creds.password).await?;
    control_plane.register_device(&session, request).await
}

pub async fn handle(
    args: &DeviceArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let identity = settings.identity();

    match &args.command {
        DeviceCommand::Fingerprint => {
            let fp = identity.fingerprint().await.to_owned();
            output::print_output(&fp, global.quiet);
        }
        DeviceCommand::Register => {
            let _lock = settings.instance_lock()?;
            let registered = Registered::from(&register(settings, &identity).await?);
            let out = output::render_single(
                global.output,
                &registered,
                |r| format!("Registered as {} (fingerprint {})", r.device_id, r.fingerprint),
                |r| r.device_id.clone(),
            );
            output::print_output(&out, global.quiet);
        }
        DeviceCommand::Reset { yes } => {
            if identity.identity().is_none() {
                if !global.quiet {
                    eprintln!("Device is not registered; nothing to reset");
                }
                return Ok(());
            }
            let prompt = "Forget this device's registration? It will register again on next run";
            if !util::confirm(prompt, "device reset", *yes)? {
                return Ok(());
            }
            let _lock = settings.instance_lock()?;
            identity.reset().await?;
            if !global.quiet {
                eprintln!("Device registration removed");
            }
        }
    }
    Ok(())
}
