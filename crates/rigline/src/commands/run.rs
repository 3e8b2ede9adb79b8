//! `rigline run`: the headless agent.
//!
//! Holds the instance lock for the whole run, prints a status line on an
//! interval, and stops on Ctrl-C or when the agent gives up.

use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::info;

use rigline_core::{
    Agent, AgentContext, AgentStatus, ControlPlane, InputDevice, LoggingInputDevice,
    OfflineTelemetry, TelemetrySource,
};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::config::{self, Settings};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &RunArgs, settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let lock = settings.instance_lock()?;

    let agent_config = rigline_config::to_agent_config(&settings.config)?;
    let mapping = Arc::new(settings.input_mapping());
    let input: Arc<dyn InputDevice> = Arc::new(LoggingInputDevice);
    let registry = config::command_registry(&mapping, &input)?;
    let control_plane: Arc<dyn ControlPlane> = Arc::new(settings.control_plane()?);
    let telemetry: Arc<dyn TelemetrySource> = Arc::new(OfflineTelemetry);

    let agent = Agent::new(AgentContext {
        config: agent_config,
        control_plane,
        identity: Arc::new(settings.identity()),
        registry: Arc::new(registry),
        telemetry,
        input,
    });

    info!(api_url = %settings.config.api_url, "starting agent");
    agent.start();
    let outcome = supervise(&agent, args.status_interval, global).await;
    agent.stop().await;

    drop(lock);
    outcome
}

async fn supervise(agent: &Agent, status_secs: u64, global: &GlobalOpts) -> Result<(), CliError> {
    let mut ticker = (status_secs > 0).then(|| {
        let mut interval = tokio::time::interval(Duration::from_secs(status_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });
    let color = output::should_color(global.color);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupt received, shutting down");
                return Ok(());
            }
            result = agent.wait() => return result.map_err(CliError::from),
            () = tick(ticker.as_mut()) => {
                let line = status_line(&agent.status(), agent, global.output, color);
                output::print_output(&line, global.quiet);
            }
        }
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn status_line(status: &AgentStatus, agent: &Agent, format: OutputFormat, color: bool) -> String {
    if matches!(format, OutputFormat::Json) {
        return serde_json::to_string(status).unwrap_or_default();
    }

    let device = agent
        .identity()
        .identity()
        .map_or_else(|| output::missing(color), |id| id.device_id);
    let lap = if status.iracing.connected {
        format!("lap {}", status.iracing.lap)
    } else {
        "offline".into()
    };
    let label = |s: &str| if color { s.bold().to_string() } else { s.to_owned() };

    format!(
        "{} {} ({lap})  {} {}  {} {}  {} {device}",
        label("sim:"),
        output::flag(status.iracing.connected, color),
        label("api:"),
        output::flag(status.api.connected, color),
        label("laps uploaded:"),
        status.api.laps_recorded,
        label("device:"),
    )
}
