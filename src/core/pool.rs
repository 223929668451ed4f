//! Fixed-size agent roster.
//!
//! The pool is the concurrency bound of the whole system: it is built once
//! from the configured roster, never grows, and a task can only run while it
//! holds one of these slots. Lookups are registration-order scans so the
//! same request always lands on the same agent.
//!
//! The pool itself is plain data. Callers that share it across threads keep
//! it behind the orchestrator's lock; `claim` exists so that find-and-assign
//! happens in a single call under that lock.

use crate::core::config::PoolConfig;
use crate::core::error::PincerError;
use crate::core::model::{Agent, AgentStatus, TaskRef};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct AgentPool {
    agents: Vec<Agent>,
    capacity: usize,
}

impl AgentPool {
    pub fn new(capacity: usize, agents: Vec<Agent>) -> Result<Self, PincerError> {
        if agents.len() > capacity {
            return Err(PincerError::ConfigError(format!(
                "roster has {} agents but max_concurrency is {}",
                agents.len(),
                capacity
            )));
        }
        let mut ids = HashSet::new();
        for agent in &agents {
            if !ids.insert(agent.id.as_str()) {
                return Err(PincerError::ConfigError(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
            if !agent.trust_score.is_finite() || agent.trust_score < 0.0 {
                return Err(PincerError::ConfigError(format!(
                    "agent '{}' has invalid trust score {}",
                    agent.id, agent.trust_score
                )));
            }
        }
        Ok(Self { agents, capacity })
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, PincerError> {
        let agents = config
            .agents
            .iter()
            .map(|spec| Agent::new(&spec.id, &spec.name, &spec.capability, spec.trust_score))
            .collect();
        Self::new(config.max_concurrency, agents)
    }

    /// Re-applies persisted runtime state (status, current task, counters) to
    /// the configured roster, matched by agent id. Identity fields stay as
    /// configured.
    pub fn restore(&mut self, persisted: &[Agent]) -> Result<(), PincerError> {
        for saved in persisted {
            match self.agents.iter_mut().find(|a| a.id == saved.id) {
                Some(agent) => {
                    agent.status = saved.status;
                    agent.current_task = saved.current_task.clone();
                    agent.completed_count = saved.completed_count;
                    agent.failed_count = saved.failed_count;
                }
                None if saved.status == AgentStatus::Working => {
                    return Err(PincerError::ConfigError(format!(
                        "agent '{}' is working on {} but is missing from the roster",
                        saved.id,
                        saved
                            .current_task
                            .as_ref()
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| "?".to_string())
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    pub fn find_available(&self, capability: &str) -> Option<&Agent> {
        self.agents
            .iter()
            .find(|a| a.is_idle() && a.capability == capability)
    }

    pub fn assign(&mut self, agent_id: &str, task: TaskRef) -> Result<(), PincerError> {
        let agent = self.agent_mut(agent_id)?;
        if let Some(current) = &agent.current_task {
            return Err(PincerError::AgentBusy {
                agent_id: agent.id.clone(),
                task_id: current.to_string(),
            });
        }
        agent.status = AgentStatus::Working;
        agent.current_task = Some(task);
        Ok(())
    }

    /// Find-and-assign in one step. `None` means no idle agent of that
    /// capability right now; the caller decides whether to retry.
    pub fn claim(&mut self, capability: &str, task: TaskRef) -> Option<String> {
        let agent_id = self.find_available(capability)?.id.clone();
        self.assign(&agent_id, task).ok()?;
        Some(agent_id)
    }

    pub fn release(&mut self, agent_id: &str) -> Result<TaskRef, PincerError> {
        let agent = self.agent_mut(agent_id)?;
        let Some(task) = agent.current_task.take() else {
            return Err(PincerError::AgentNotWorking(agent.id.clone()));
        };
        agent.status = AgentStatus::Idle;
        agent.completed_count += 1;
        Ok(task)
    }

    /// `release` for an assignment that ended in failure.
    pub fn release_failed(&mut self, agent_id: &str) -> Result<TaskRef, PincerError> {
        let task = self.release(agent_id)?;
        if let Some(agent) = self.agents.iter_mut().find(|a| a.id == agent_id) {
            agent.failed_count += 1;
        }
        Ok(task)
    }

    fn agent_mut(&mut self, agent_id: &str) -> Result<&mut Agent, PincerError> {
        self.agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| PincerError::UnknownAgent(agent_id.to_string()))
    }
}
