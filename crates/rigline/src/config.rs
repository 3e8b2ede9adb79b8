//! CLI configuration: thin wrapper around `rigline_config`.
//!
//! Applies `GlobalOpts` overrides (--config, --api-url, --data-dir) on top
//! of the loaded file and builds the pieces every agent-facing command needs.

use std::path::PathBuf;
use std::sync::Arc;

use rigline_core::command::builtin::register_builtin;
use rigline_core::{
    CommandRegistry, DataPaths, HttpControlPlane, IdentityManager, InputDevice, InputMapping,
    InstanceLock,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use rigline_config::{Config, config_path};

/// Loaded configuration plus where it came from.
#[derive(Debug)]
pub struct Settings {
    pub config: Config,
    pub path: PathBuf,
}

impl Settings {
    /// Load the config file and apply global flag overrides.
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let path = global.config.clone().unwrap_or_else(config_path);
        let mut config = rigline_config::load_config_from(&path)?;

        if let Some(ref url) = global.api_url {
            config.api_url.clone_from(url);
        }
        if let Some(ref dir) = global.data_dir {
            config.data_dir = Some(dir.clone());
        }

        Ok(Self { config, path })
    }

    pub fn paths(&self) -> DataPaths {
        self.config.data_paths()
    }

    /// Exclusive lock over the data directory, shared by every command that
    /// may change the device identity.
    pub fn instance_lock(&self) -> Result<InstanceLock, CliError> {
        Ok(InstanceLock::acquire(self.paths().lock_file())?)
    }

    pub fn identity(&self) -> IdentityManager {
        IdentityManager::open(self.paths().device_file(), env!("CARGO_PKG_VERSION"))
    }

    pub fn input_mapping(&self) -> InputMapping {
        InputMapping::open(self.paths().joystick_file())
    }

    pub fn control_plane(&self) -> Result<HttpControlPlane, CliError> {
        let url = rigline_config::api_base_url(&self.config)?;
        let transport = rigline_config::transport_config(&self.config)?;
        Ok(HttpControlPlane::connect(url, &transport)?)
    }
}

/// Registry with the built-in input commands wired to `device`.
pub fn command_registry(
    mapping: &Arc<InputMapping>,
    device: &Arc<dyn InputDevice>,
) -> Result<CommandRegistry, CliError> {
    let mut registry = CommandRegistry::new();
    register_builtin(&mut registry, mapping, device).map_err(|e| CliError::LocalState {
        message: e.to_string(),
    })?;
    Ok(registry)
}
