//! Command groups exposed by the `pincer` binary.
//!
//! Each group builds a JSON envelope for its result and renders it either
//! verbatim (`--format json`) or as short colored text for a terminal.

pub mod agent;
pub mod evidence;
pub mod task;
pub mod workflow;

use crate::core::model::{AgentStatus, TaskStatus};
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde_json::Value as JsonValue;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print `out` as pretty JSON, or hand it to `text` for human output.
pub(crate) fn emit(format: OutputFormat, out: &JsonValue, text: impl FnOnce(&JsonValue)) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(out) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("failed to render output: {}", e),
        },
        OutputFormat::Text => text(out),
    }
}

pub(crate) fn paint_task_status(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Pending => status.as_str().dimmed(),
        TaskStatus::Running => status.as_str().bright_cyan().bold(),
        TaskStatus::Completed => status.as_str().green().bold(),
        TaskStatus::Failed => status.as_str().red().bold(),
    }
}

pub(crate) fn paint_agent_status(status: AgentStatus) -> ColoredString {
    match status {
        AgentStatus::Idle => status.as_str().green(),
        AgentStatus::Working => status.as_str().yellow().bold(),
    }
}

/// Schemas of every command group, for `pincer schema`.
pub fn schemas() -> JsonValue {
    serde_json::json!({
        "workflow": workflow::schema(),
        "task": task::schema(),
        "agent": agent::schema(),
        "evidence": evidence::schema(),
    })
}
