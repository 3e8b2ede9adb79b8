//! `rigline commands`: actions this agent accepts from the control plane.

use std::sync::Arc;

use tabled::Tabled;

use rigline_core::{CommandInfo, InputDevice, LoggingInputDevice};

use crate::cli::GlobalOpts;
use crate::config::{self, Settings};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct CommandRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Parameters")]
    params: String,
    #[tabled(rename = "Example")]
    example: String,
    #[tabled(rename = "Description")]
    description: String,
}

fn to_row(info: &CommandInfo) -> CommandRow {
    let params = info
        .params
        .iter()
        .map(|p| {
            let marker = if p.required { "" } else { "?" };
            format!("{}{marker}: {}", p.name, p.kind)
        })
        .collect::<Vec<_>>()
        .join(", ");

    CommandRow {
        action: info.action.clone(),
        params,
        example: info
            .example_params
            .as_ref()
            .map_or_else(String::new, |e| serde_json::Value::Object(e.clone()).to_string()),
        description: info.description.clone().unwrap_or_default(),
    }
}

pub fn handle(settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let mapping = Arc::new(settings.input_mapping());
    let device: Arc<dyn InputDevice> = Arc::new(LoggingInputDevice);
    let registry = config::command_registry(&mapping, &device)?;

    let infos: Vec<CommandInfo> = registry.get_all_info().into_values().collect();
    let out = output::render_list(global.output, &infos, to_row, |i| i.action.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}
