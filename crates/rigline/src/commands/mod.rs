//! Command dispatch.

pub mod buttons;
pub mod config_cmd;
pub mod device;
pub mod registered;
pub mod run;
pub mod status;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::config::Settings;
use crate::error::CliError;

/// Route a parsed command to its handler.
pub async fn dispatch(
    cmd: Command,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(&args, settings, global).await,
        Command::Status => status::handle(settings, global).await,
        Command::Device(args) => device::handle(&args, settings, global).await,
        Command::Buttons(args) => buttons::handle(args, settings, global),
        Command::Commands => registered::handle(settings, global),
        Command::Config(args) => config_cmd::handle(&args, global),
    }
}
