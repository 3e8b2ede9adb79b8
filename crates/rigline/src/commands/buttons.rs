//! Buttons subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use rigline_core::InputMapping;
use rigline_core::input::physical_key;

use crate::cli::{ButtonsArgs, ButtonsCommand, GlobalOpts};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct Assignment {
    action: &'static str,
    key: &'static str,
    button: Option<u32>,
}

#[derive(Tabled)]
struct AssignmentRow {
    #[tabled(rename = "Action")]
    action: &'static str,
    #[tabled(rename = "Stored as")]
    key: &'static str,
    #[tabled(rename = "Button")]
    button: String,
}

fn assignments(mapping: &InputMapping) -> Vec<Assignment> {
    InputMapping::actions()
        .map(|action| Assignment {
            action,
            key: physical_key(action).unwrap_or(action),
            button: mapping.get_button(action),
        })
        .collect()
}

fn unknown_action(action: String) -> CliError {
    CliError::UnknownAction {
        action,
        available: InputMapping::actions().collect::<Vec<_>>().join(", "),
    }
}

pub fn handle(args: ButtonsArgs, settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let mapping = settings.input_mapping();
    let color = output::should_color(global.color);

    match args.command {
        ButtonsCommand::List => {
            let rows = assignments(&mapping);
            let out = output::render_list(
                global.output,
                &rows,
                |a| AssignmentRow {
                    action: a.action,
                    key: a.key,
                    button: a
                        .button
                        .map_or_else(|| output::missing(color), |b| b.to_string()),
                },
                |a| format!("{}={}", a.action, a.button.map_or_else(String::new, |b| b.to_string())),
            );
            output::print_output(&out, global.quiet);
        }
        ButtonsCommand::Set { action, index } => {
            if !mapping.set_button(&action, Some(index))? {
                return Err(unknown_action(action));
            }
            if !global.quiet {
                eprintln!("{action} -> button {index}");
            }
        }
        ButtonsCommand::Clear { action } => {
            if !mapping.set_button(&action, None)? {
                return Err(unknown_action(action));
            }
            if !global.quiet {
                eprintln!("{action} cleared");
            }
        }
    }
    Ok(())
}
