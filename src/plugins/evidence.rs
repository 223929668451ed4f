use crate::core::error::PincerError;
use crate::core::evidence::{self, EvidenceRecord};
use crate::core::orchestrator::Orchestrator;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::{OutputFormat, emit, paint_task_status};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "evidence", about = "Produce and check evidence records.")]
pub struct EvidenceCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: EvidenceCommand,
}

#[derive(Subcommand, Debug)]
pub enum EvidenceCommand {
    /// Snapshot task outcomes into a new record.
    Generate {
        #[clap(long)]
        workflow: String,
        /// Dotted task-id prefix, e.g. `2` selects `2.1`, `2.2`.
        #[clap(long)]
        wave: Option<String>,
        /// Explicit task id (repeatable). Overrides `--wave`.
        #[clap(long = "task")]
        tasks: Vec<String>,
        /// Directory for the record file. Defaults to `<root>/evidence`.
        #[clap(long)]
        out: Option<PathBuf>,
        /// Print the record without writing it.
        #[clap(long)]
        no_write: bool,
    },
    /// Recompute a record's digest and compare it with the stored one.
    Verify { path: PathBuf },
}

fn print_record(record: &EvidenceRecord) {
    let m = &record.metrics;
    println!(
        "{} {}{}",
        "evidence".bright_white().bold(),
        record.workflow_id,
        record
            .wave
            .as_deref()
            .map(|w| format!(" wave {}", w))
            .unwrap_or_default()
    );
    for t in &record.tasks {
        println!(
            "  {:<8} {:<10} {:<24} {:<14} {}",
            t.task_id,
            paint_task_status(t.status),
            t.name,
            t.agent_name.as_deref().or(t.agent_id.as_deref()).unwrap_or("-"),
            t.deliverables.join(", ")
        );
    }
    println!(
        "  {}/{} completed, elapsed {}s, sequential {}s, saved {}s",
        m.counts.completed, m.counts.total, m.elapsed_secs, m.sequential_secs, m.saved_secs
    );
    println!("  digest {}", record.digest.dimmed());
}

pub fn run_evidence_cli(
    orchestrator: &Orchestrator,
    store: &Store,
    cli: EvidenceCli,
) -> Result<(), PincerError> {
    match cli.command {
        EvidenceCommand::Generate {
            workflow,
            wave,
            tasks,
            out,
            no_write,
        } => {
            let record = orchestrator.generate_evidence(&workflow, &tasks, wave.as_deref())?;
            let path = if no_write {
                None
            } else {
                let dir = out.unwrap_or_else(|| store.evidence_dir());
                Some(evidence::write_evidence(&dir, &record)?)
            };
            let out = time::command_envelope(
                "evidence.generate",
                "ok",
                serde_json::json!({
                    "record": record,
                    "path": path.as_ref().map(|p| p.to_string_lossy().to_string()),
                }),
            );
            emit(cli.format, &out, |_| {
                print_record(&record);
                if let Some(p) = &path {
                    println!("  written to {}", p.display());
                }
            });
        }
        EvidenceCommand::Verify { path } => {
            let record = evidence::read_evidence(&path)?;
            let valid = record.verify()?;
            let out = time::command_envelope(
                "evidence.verify",
                if valid { "ok" } else { "mismatch" },
                serde_json::json!({
                    "path": path.to_string_lossy(),
                    "record_id": record.record_id,
                    "valid": valid,
                }),
            );
            emit(cli.format, &out, |_| {
                if valid {
                    println!("{} {}", "valid".green().bold(), path.display());
                } else {
                    println!("{} {}", "digest mismatch".red().bold(), path.display());
                }
            });
            if !valid {
                return Err(PincerError::ValidationError(format!(
                    "evidence record {} does not match its digest",
                    path.display()
                )));
            }
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "evidence",
        "version": "0.1.0",
        "description": "Point-in-time task outcome records with a SHA-256 digest",
        "commands": [
            { "name": "generate", "parameters": ["workflow", "wave?", "task*", "out?", "no_write"] },
            { "name": "verify", "parameters": ["path"] }
        ],
        "storage": ["evidence/<workflow>-<record_id>.json"]
    })
}
