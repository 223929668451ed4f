use crate::core::error::PincerError;
use crate::core::model::Task;
use crate::core::orchestrator::{AdvanceOutcome, Orchestrator};
use crate::core::time;
use crate::plugins::{OutputFormat, emit, paint_task_status};
use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser, Debug)]
#[clap(name = "task", about = "Drive individual tasks through their lifecycle.")]
pub struct TaskCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Report whether every dependency of a task is completed.
    Check {
        #[clap(long)]
        workflow: String,
        #[clap(long)]
        task: String,
    },
    /// Try to move a pending task to running on an idle agent.
    Advance {
        #[clap(long)]
        workflow: String,
        #[clap(long)]
        task: String,
    },
    /// Mark a running task completed and release its agent.
    Complete {
        #[clap(long)]
        workflow: String,
        #[clap(long)]
        task: String,
        /// Deliverable label (repeatable).
        #[clap(long = "deliverable")]
        deliverables: Vec<String>,
    },
    /// Mark a running task failed and release its agent.
    Fail {
        #[clap(long)]
        workflow: String,
        #[clap(long)]
        task: String,
        #[clap(long)]
        reason: String,
    },
    /// Put a failed task back to pending.
    Retry {
        #[clap(long)]
        workflow: String,
        #[clap(long)]
        task: String,
    },
}

fn print_task(verb: colored::ColoredString, workflow_id: &str, task: &Task) {
    println!(
        "{} {}/{} -> {}",
        verb,
        workflow_id,
        task.id.bright_white().bold(),
        paint_task_status(task.status)
    );
}

pub fn run_task_cli(orchestrator: &Orchestrator, cli: TaskCli) -> Result<(), PincerError> {
    match cli.command {
        TaskCommand::Check { workflow, task } => {
            let readiness = orchestrator.validate_dependencies(&workflow, &task)?;
            let out = time::command_envelope(
                "task.check",
                "ok",
                serde_json::json!({
                    "workflow_id": workflow,
                    "task_id": task,
                    "ready": readiness.ready,
                    "reason": readiness.reason,
                }),
            );
            emit(cli.format, &out, |_| {
                if readiness.ready {
                    println!("{} {}/{}", "ready".green().bold(), workflow, task);
                } else {
                    println!(
                        "{} {}/{}: {}",
                        "blocked".yellow().bold(),
                        workflow,
                        task,
                        readiness.reason
                    );
                }
            });
        }
        TaskCommand::Advance { workflow, task } => {
            let outcome = orchestrator.advance(&workflow, &task)?;
            let out = time::command_envelope(
                "task.advance",
                "ok",
                serde_json::json!({
                    "workflow_id": workflow,
                    "task_id": task,
                    "result": outcome,
                }),
            );
            emit(cli.format, &out, |_| match &outcome {
                AdvanceOutcome::Dispatched { agent_id } => println!(
                    "{} {}/{} to {}",
                    "dispatched".green().bold(),
                    workflow,
                    task,
                    agent_id.bright_white().bold()
                ),
                AdvanceOutcome::NotReady { reason } => println!(
                    "{} {}/{}: {}",
                    "not ready".yellow().bold(),
                    workflow,
                    task,
                    reason
                ),
                AdvanceOutcome::NoAgentAvailable { capability } => println!(
                    "{} {}/{}: no idle '{}' agent",
                    "waiting".yellow().bold(),
                    workflow,
                    task,
                    capability
                ),
            });
        }
        TaskCommand::Complete {
            workflow,
            task,
            deliverables,
        } => {
            let updated = orchestrator.complete_task(&workflow, &task, deliverables)?;
            let out = time::command_envelope(
                "task.complete",
                "ok",
                serde_json::json!({ "workflow_id": workflow, "task": updated }),
            );
            emit(cli.format, &out, |_| {
                print_task("completed".green().bold(), &workflow, &updated)
            });
        }
        TaskCommand::Fail {
            workflow,
            task,
            reason,
        } => {
            let updated = orchestrator.fail_task(&workflow, &task, &reason)?;
            let out = time::command_envelope(
                "task.fail",
                "ok",
                serde_json::json!({ "workflow_id": workflow, "task": updated }),
            );
            emit(cli.format, &out, |_| {
                print_task("failed".red().bold(), &workflow, &updated)
            });
        }
        TaskCommand::Retry { workflow, task } => {
            let updated = orchestrator.retry_task(&workflow, &task)?;
            let out = time::command_envelope(
                "task.retry",
                "ok",
                serde_json::json!({ "workflow_id": workflow, "task": updated }),
            );
            emit(cli.format, &out, |_| {
                print_task("reset".cyan().bold(), &workflow, &updated)
            });
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "task",
        "version": "0.1.0",
        "description": "Task lifecycle: PENDING -> RUNNING -> COMPLETED | FAILED, FAILED -> PENDING on retry",
        "commands": [
            { "name": "check", "parameters": ["workflow", "task"] },
            { "name": "advance", "parameters": ["workflow", "task"], "results": ["dispatched", "not_ready", "no_agent_available"] },
            { "name": "complete", "parameters": ["workflow", "task", "deliverable*"] },
            { "name": "fail", "parameters": ["workflow", "task", "reason"] },
            { "name": "retry", "parameters": ["workflow", "task"] }
        ]
    })
}
