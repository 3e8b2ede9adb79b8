//! Clap derive structures for the `rigline` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// rigline -- rig-side agent for remotely operated sim rigs
#[derive(Debug, Parser)]
#[command(
    name = "rigline",
    version,
    about = "Register this rig with the control plane and execute its commands",
    long_about = "Identifies this machine, registers it with the control plane once,\n\
        then heartbeats, polls for commands (enter car, reset car) and uploads\n\
        lap telemetry until stopped.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "RIGLINE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding device.json, joystick.json and logs
    #[arg(long, env = "RIGLINE_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Control plane URL (overrides config)
    #[arg(long, env = "RIGLINE_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the agent until Ctrl-C
    Run(RunArgs),

    /// Show local registration and button mapping
    Status,

    /// Inspect or reset this machine's identity
    #[command(alias = "dev")]
    Device(DeviceArgs),

    /// Manage joystick button assignments
    #[command(alias = "btn")]
    Buttons(ButtonsArgs),

    /// List the commands this agent accepts
    #[command(alias = "cmds")]
    Commands,

    /// Manage configuration
    Config(ConfigArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds between status lines (0 disables them)
    #[arg(long, default_value = "5")]
    pub status_interval: u64,
}

// ── Device ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DeviceArgs {
    #[command(subcommand)]
    pub command: DeviceCommand,
}

#[derive(Debug, Subcommand)]
pub enum DeviceCommand {
    /// Print this machine's fingerprint
    Fingerprint,

    /// Register with the control plane now (no-op if already registered)
    Register,

    /// Forget the stored registration
    Reset {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

// ── Buttons ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ButtonsArgs {
    #[command(subcommand)]
    pub command: ButtonsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ButtonsCommand {
    /// Show every action and its assigned button
    #[command(alias = "ls")]
    List,

    /// Assign a joystick button index to an action
    Set {
        /// Action name (enter_car or reset_car)
        action: String,
        /// Joystick button index
        index: u32,
    },

    /// Remove the button assigned to an action
    Clear {
        /// Action name (enter_car or reset_car)
        action: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// Create the config file with guided setup
    Init,
}
