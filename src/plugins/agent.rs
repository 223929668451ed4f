use crate::core::error::PincerError;
use crate::core::orchestrator::Orchestrator;
use crate::core::time;
use crate::plugins::{OutputFormat, emit, paint_agent_status};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(name = "agent", about = "Inspect the agent pool.")]
pub struct AgentCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: AgentCommand,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    /// List agents with their capability, status and counters.
    List {
        /// Only agents with this capability.
        #[clap(long)]
        capability: Option<String>,
    },
}

pub fn run_agent_cli(orchestrator: &Orchestrator, cli: AgentCli) -> Result<(), PincerError> {
    match cli.command {
        AgentCommand::List { capability } => {
            let agents: Vec<_> = orchestrator
                .agents()?
                .into_iter()
                .filter(|a| capability.as_deref().is_none_or(|c| a.capability == c))
                .collect();
            let capacity = orchestrator.capacity()?;
            let out = time::command_envelope(
                "agent.list",
                "ok",
                serde_json::json!({ "capacity": capacity, "agents": agents }),
            );
            emit(cli.format, &out, |_| {
                if agents.is_empty() {
                    println!("No agents found.");
                    return;
                }
                println!("Agents (capacity {}):", capacity);
                for a in &agents {
                    println!(
                        "- {:<12} {:<10} {:<8} trust={:.2} done={} failed={} {}",
                        a.id,
                        a.capability,
                        paint_agent_status(a.status),
                        a.trust_score,
                        a.completed_count,
                        a.failed_count,
                        a.current_task
                            .as_ref()
                            .map(|r| r.to_string())
                            .unwrap_or_default()
                    );
                }
            });
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "agent",
        "version": "0.1.0",
        "description": "Fixed agent roster loaded from config.toml",
        "commands": [
            { "name": "list", "parameters": ["capability?"] }
        ]
    })
}
