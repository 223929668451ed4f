//! Pincer: a local workflow orchestrator for capability-matched agents.
//!
//! A workflow is a set of tasks with declared dependencies. Each task needs
//! an agent of a given capability. Pincer dispatches ready tasks to idle
//! agents from a fixed roster, records every transition, and produces
//! evidence records summarizing what ran, who ran it, and how long it took.
//!
//! # State directory
//!
//! - `config.toml`: agent roster and pool capacity
//! - `data/workflows.json`: the whole persisted state, rewritten atomically
//! - `data/workflows.lock`: held by the process that owns the state for one command
//! - `data/orchestrator.events.jsonl`: append-only transition journal
//! - `evidence/`: generated evidence records
//!
//! The directory is `--root`, else `$PINCER_DIR`, else `./.pincer`.
//!
//! # Examples
//!
//! ```bash
//! pincer init
//! pincer workflow start --file checkout.json
//! pincer task advance --workflow CHK-1 --task 1
//! pincer task complete --workflow CHK-1 --task 1 --deliverable schema.sql
//! pincer evidence generate --workflow CHK-1 --wave 2
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: data model, dependency resolution, agent pool, persistence, orchestrator
//! - [`plugins`]: the command groups of the `pincer` binary

pub mod core;
pub mod plugins;

use crate::core::config;
use crate::core::error::PincerError;
use crate::core::orchestrator::Orchestrator;
use crate::core::store::Store;
use crate::core::time;
use clap::{Parser, Subcommand};
use colored::Colorize;
use plugins::{agent, evidence, task, workflow};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const ROOT_ENV: &str = "PINCER_DIR";
const AGENT_ENV: &str = "PINCER_AGENT_ID";
const LOG_ENV: &str = "PINCER_LOG";
const DEFAULT_ROOT: &str = ".pincer";

#[derive(Parser, Debug)]
#[clap(
    name = "pincer",
    version = env!("CARGO_PKG_VERSION"),
    about = "Dependency-aware workflow orchestration for agent pools"
)]
struct Cli {
    /// State directory (overrides $PINCER_DIR).
    #[clap(long, global = true)]
    root: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the state directory and a default config.toml
    #[clap(name = "init")]
    Init,

    /// Start and inspect workflows
    #[clap(name = "workflow", visible_alias = "w")]
    Workflow(workflow::WorkflowCli),

    /// Check, advance, complete, fail and retry tasks
    #[clap(name = "task", visible_alias = "t")]
    Task(task::TaskCli),

    /// Inspect the agent pool
    #[clap(name = "agent", visible_alias = "a")]
    Agent(agent::AgentCli),

    /// Generate and verify evidence records
    #[clap(name = "evidence", visible_alias = "e")]
    Evidence(evidence::EvidenceCli),

    /// Print the command schemas as JSON
    #[clap(name = "schema")]
    Schema,

    /// Show version information
    #[clap(name = "version")]
    Version,
}

fn resolve_root(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var_os(ROOT_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
}

/// Logs go to stderr so JSON on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_orchestrator(store: &Store) -> Result<Orchestrator, PincerError> {
    let config = config::load_config(&store.root)?;
    let actor = env::var(AGENT_ENV).unwrap_or_else(|_| "unknown".to_string());
    Ok(Orchestrator::for_store(store, &config)?.with_actor(&actor))
}

pub fn run() -> Result<(), PincerError> {
    init_tracing();
    let cli = Cli::parse();
    let store = Store::new(resolve_root(cli.root));
    tracing::debug!(root = %store.root.display(), "using state directory");

    match cli.command {
        Command::Init => {
            let created = config::write_default_config(&store.root)?;
            std::fs::create_dir_all(store.data_dir()).map_err(PincerError::IoError)?;
            std::fs::create_dir_all(store.evidence_dir()).map_err(PincerError::IoError)?;
            if created {
                println!(
                    "{} {}",
                    "initialized".green().bold(),
                    store.root.display().to_string().bright_white()
                );
            } else {
                println!(
                    "{} already initialized ({} kept)",
                    store.root.display(),
                    config::CONFIG_FILE_NAME
                );
            }
        }
        Command::Workflow(c) => workflow::run_workflow_cli(&open_orchestrator(&store)?, &store, c)?,
        Command::Task(c) => task::run_task_cli(&open_orchestrator(&store)?, c)?,
        Command::Agent(c) => agent::run_agent_cli(&open_orchestrator(&store)?, c)?,
        Command::Evidence(c) => {
            evidence::run_evidence_cli(&open_orchestrator(&store)?, &store, c)?
        }
        Command::Schema => {
            let out = time::command_envelope(
                "schema",
                "ok",
                serde_json::json!({ "groups": plugins::schemas() }),
            );
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Version => println!("pincer {}", env!("CARGO_PKG_VERSION")),
    }
    Ok(())
}
