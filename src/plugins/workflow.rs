use crate::core::error::PincerError;
use crate::core::journal::Journal;
use crate::core::model::{Priority, TaskDef};
use crate::core::orchestrator::Orchestrator;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::{OutputFormat, emit, paint_agent_status, paint_task_status};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(name = "workflow", about = "Start and inspect workflows.")]
pub struct WorkflowCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: WorkflowCommand,
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    /// Register a workflow from a JSON definition file.
    Start {
        #[clap(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Show task and agent state for one workflow.
    Status { id: String },
    /// List workflow ids.
    List,
    /// Pending tasks whose dependencies are complete.
    Ready { id: String },
    /// Show the most recent transition journal entries.
    Journal {
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },
}

/// On-disk workflow definition accepted by `workflow start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub priority: Priority,
    pub tasks: Vec<TaskDef>,
}

pub fn load_definition(path: &Path) -> Result<WorkflowDefinition, PincerError> {
    let raw = fs::read_to_string(path).map_err(PincerError::IoError)?;
    serde_json::from_str(&raw).map_err(|e| {
        PincerError::ValidationError(format!(
            "invalid workflow definition {}: {}",
            path.display(),
            e
        ))
    })
}

pub fn run_workflow_cli(
    orchestrator: &Orchestrator,
    store: &Store,
    cli: WorkflowCli,
) -> Result<(), PincerError> {
    match cli.command {
        WorkflowCommand::Start { file } => {
            let def = load_definition(&file)?;
            let wf = orchestrator.start_workflow(&def.id, &def.domain, def.priority, def.tasks)?;
            let out = time::command_envelope(
                "workflow.start",
                "ok",
                serde_json::json!({ "workflow": wf }),
            );
            emit(cli.format, &out, |_| {
                println!(
                    "{} workflow {} ({} tasks, {} priority)",
                    "started".green().bold(),
                    wf.id.bright_white().bold(),
                    wf.tasks.len(),
                    wf.priority
                );
            });
        }
        WorkflowCommand::Status { id } => {
            let snapshot = orchestrator.get_status(&id)?;
            let out = time::command_envelope(
                "workflow.status",
                "ok",
                serde_json::json!({ "snapshot": snapshot }),
            );
            emit(cli.format, &out, |_| {
                let c = snapshot.counts;
                println!(
                    "{} [{}|{}] {}/{} completed, {} running, {} failed",
                    snapshot.workflow_id.bright_white().bold(),
                    snapshot.domain,
                    snapshot.priority,
                    c.completed,
                    c.total,
                    c.running,
                    c.failed
                );
                for t in &snapshot.tasks {
                    println!(
                        "  {:<8} {:<10} {:<28} {}",
                        t.id,
                        paint_task_status(t.status),
                        t.name,
                        t.assigned_agent.as_deref().unwrap_or("-")
                    );
                }
                println!("Agents:");
                for a in &snapshot.agents {
                    let on = a
                        .current_task
                        .as_ref()
                        .map(|r| r.to_string())
                        .unwrap_or_default();
                    println!(
                        "  {:<12} {:<10} {:<8} {}",
                        a.id,
                        a.capability,
                        paint_agent_status(a.status),
                        on
                    );
                }
            });
        }
        WorkflowCommand::List => {
            let ids = orchestrator.list_workflows()?;
            let out = time::command_envelope(
                "workflow.list",
                "ok",
                serde_json::json!({ "workflows": ids }),
            );
            emit(cli.format, &out, |_| {
                if ids.is_empty() {
                    println!("No workflows found.");
                }
                for id in &ids {
                    println!("- {}", id);
                }
            });
        }
        WorkflowCommand::Ready { id } => {
            let ready = orchestrator.ready_tasks(&id)?;
            let out = time::command_envelope(
                "workflow.ready",
                "ok",
                serde_json::json!({ "workflow_id": id, "ready": ready }),
            );
            emit(cli.format, &out, |_| {
                if ready.is_empty() {
                    println!("No tasks ready in {}.", id);
                }
                for task_id in &ready {
                    println!("- {}", task_id);
                }
            });
        }
        WorkflowCommand::Journal { limit } => {
            let events = Journal::new(store.journal_path()).tail(limit)?;
            let out = time::command_envelope(
                "workflow.journal",
                "ok",
                serde_json::json!({ "events": events }),
            );
            emit(cli.format, &out, |_| {
                for e in &events {
                    println!(
                        "{} {:<16} {}/{} {} {}",
                        e.ts.dimmed(),
                        e.op,
                        e.workflow_id,
                        e.task_id.as_deref().unwrap_or("-"),
                        e.agent_id.as_deref().unwrap_or(""),
                        e.detail.as_deref().unwrap_or("")
                    );
                }
            });
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "workflow",
        "version": "0.1.0",
        "description": "Workflow registration and read-only projections",
        "commands": [
            { "name": "start", "parameters": ["file"] },
            { "name": "status", "parameters": ["id"] },
            { "name": "list", "parameters": [] },
            { "name": "ready", "parameters": ["id"] },
            { "name": "journal", "parameters": ["limit"] }
        ],
        "definition": {
            "id": "string",
            "domain": "string",
            "priority": "high|medium|low",
            "tasks": [{ "id": "string", "name": "string", "capability": "string", "depends_on": ["string"] }]
        },
        "storage": ["data/workflows.json", "data/orchestrator.events.jsonl"]
    })
}
