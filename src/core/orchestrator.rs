//! The orchestrator: single owner of workflow and agent state.
//!
//! All state lives in one `OrchestratorState` behind a mutex. Every
//! operation is a short critical section:
//!
//! 1. validate the request against the current state,
//! 2. apply the transition to a copy,
//! 3. persist the copy through the `WorkflowStore`,
//! 4. swap the copy in and append a journal event.
//!
//! Because the swap happens only after a successful save, a failed write
//! leaves both memory and disk at the last committed state. Requests that
//! change nothing (not ready, no agent free) are answered from the current
//! state without copying it and skip steps 3 and 4.
//!
//! Concurrent `advance` calls are serialized by the mutex, so two callers are
//! never handed the same idle agent. Across processes the same holds because
//! a file-backed store keeps the state file locked while it is open.

use crate::core::config::PincerConfig;
use crate::core::error::PincerError;
use crate::core::evidence::{self, EvidenceRecord};
use crate::core::journal::{Journal, JournalEvent};
use crate::core::model::{
    Agent, AgentStatus, Priority, StatusCounts, StatusSnapshot, Task, TaskDef, TaskRef,
    TaskStatus, TaskView, Workflow, validate_id,
};
use crate::core::pool::AgentPool;
use crate::core::resolver::{self, Readiness};
use crate::core::store::{JsonFileStore, MemoryStore, StateSnapshot, Store, WorkflowStore};
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Result of `advance`. Only `Dispatched` changes state; the other two tell
/// the caller to poll again later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Dispatched { agent_id: String },
    NotReady { reason: String },
    NoAgentAvailable { capability: String },
}

impl AdvanceOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, AdvanceOutcome::Dispatched { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdvanceOutcome::Dispatched { .. } => "dispatched",
            AdvanceOutcome::NotReady { .. } => "not_ready",
            AdvanceOutcome::NoAgentAvailable { .. } => "no_agent_available",
        }
    }
}

#[derive(Debug, Clone)]
struct OrchestratorState {
    workflows: BTreeMap<String, Workflow>,
    pool: AgentPool,
}

impl OrchestratorState {
    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            workflows: self.workflows.clone(),
            agents: self.pool.agents().to_vec(),
        }
    }

    fn workflow(&self, workflow_id: &str) -> Result<&Workflow, PincerError> {
        self.workflows
            .get(workflow_id)
            .ok_or_else(|| PincerError::UnknownWorkflow(workflow_id.to_string()))
    }

    fn task_mut(&mut self, workflow_id: &str, task_id: &str) -> Result<&mut Task, PincerError> {
        self.workflows
            .get_mut(workflow_id)
            .ok_or_else(|| PincerError::UnknownWorkflow(workflow_id.to_string()))?
            .require_task_mut(task_id)
    }

    /// Running tasks and working agents must point at each other.
    fn check_consistency(&self) -> Result<(), PincerError> {
        for wf in self.workflows.values() {
            for task in wf.tasks.iter().filter(|t| t.status == TaskStatus::Running) {
                let task_ref = TaskRef::new(&wf.id, &task.id);
                let bound = task
                    .assigned_agent
                    .as_deref()
                    .and_then(|id| self.pool.agent(id))
                    .is_some_and(|a| a.current_task.as_ref() == Some(&task_ref));
                if !bound {
                    return Err(PincerError::ValidationError(format!(
                        "running task {} is not bound to a working agent",
                        task_ref
                    )));
                }
            }
        }
        for agent in self.pool.agents() {
            if let Some(task_ref) = &agent.current_task {
                let running = self
                    .workflows
                    .get(&task_ref.workflow_id)
                    .and_then(|wf| wf.task(&task_ref.task_id))
                    .is_some_and(|t| {
                        t.status == TaskStatus::Running
                            && t.assigned_agent.as_deref() == Some(agent.id.as_str())
                    });
                if !running {
                    return Err(PincerError::ValidationError(format!(
                        "agent '{}' is working on {} which is not running",
                        agent.id, task_ref
                    )));
                }
            } else if agent.status == AgentStatus::Working {
                return Err(PincerError::ValidationError(format!(
                    "agent '{}' is working without a task",
                    agent.id
                )));
            }
        }
        Ok(())
    }
}

fn ensure_transition(task: &Task, to: TaskStatus) -> Result<(), PincerError> {
    if task.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(PincerError::InvalidTransition {
            task_id: task.id.clone(),
            from: task.status,
            to,
        })
    }
}

pub struct Orchestrator {
    state: Mutex<OrchestratorState>,
    store: Box<dyn WorkflowStore>,
    journal: Option<Journal>,
    actor: String,
}

impl Orchestrator {
    /// Loads persisted state from `store` and re-applies agent runtime state
    /// to `pool`.
    pub fn open(store: Box<dyn WorkflowStore>, mut pool: AgentPool) -> Result<Self, PincerError> {
        let snapshot = store.load()?;
        pool.restore(&snapshot.agents)?;
        let state = OrchestratorState {
            workflows: snapshot.workflows,
            pool,
        };
        state.check_consistency()?;
        tracing::debug!(
            workflows = state.workflows.len(),
            agents = state.pool.agents().len(),
            "orchestrator state loaded"
        );
        Ok(Self {
            state: Mutex::new(state),
            store,
            journal: None,
            actor: "pincer".to_string(),
        })
    }

    /// File-backed orchestrator for a state directory. Blocks until no other
    /// owner holds the state lock; the lock is held until `self` is dropped.
    pub fn for_store(store: &Store, config: &PincerConfig) -> Result<Self, PincerError> {
        let pool = AgentPool::from_config(&config.pool)?;
        let file_store = JsonFileStore::open(store.state_path())?;
        Ok(Self::open(Box::new(file_store), pool)?.with_journal(Journal::new(store.journal_path())))
    }

    pub fn in_memory(pool: AgentPool) -> Result<Self, PincerError> {
        Self::open(Box::new(MemoryStore::new()), pool)
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, OrchestratorState>, PincerError> {
        self.state
            .lock()
            .map_err(|_| PincerError::LockPoisoned("orchestrator state".to_string()))
    }

    /// Runs `f` against a copy-on-write view of the state. The state is only
    /// copied once `f` calls `to_mut`. If `f` returns an event, the copy is
    /// persisted and becomes the current state; otherwise it is dropped.
    fn commit<R>(
        &self,
        f: impl FnOnce(&mut Cow<'_, OrchestratorState>) -> Result<(R, Option<JournalEvent>), PincerError>,
    ) -> Result<R, PincerError> {
        let mut guard = self.lock()?;
        let (out, event, next) = {
            let mut view = Cow::Borrowed(&*guard);
            let (out, event) = f(&mut view)?;
            let next = match view {
                Cow::Owned(next) => Some(next),
                Cow::Borrowed(_) => None,
            };
            (out, event, next)
        };
        let Some(event) = event else {
            return Ok(out);
        };
        if let Some(next) = next {
            if let Err(e) = self.store.save(&next.snapshot()) {
                tracing::error!(op = %event.op, workflow = %event.workflow_id, error = %e, "state save failed; transition discarded");
                return Err(e);
            }
            *guard = next;
        }
        drop(guard);

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&event) {
                tracing::warn!(op = %event.op, error = %e, "journal append failed");
            }
        }
        Ok(out)
    }

    fn event(&self, op: &str, workflow_id: &str) -> JournalEvent {
        JournalEvent::new(&self.actor, op, workflow_id, "ok")
    }

    pub fn start_workflow(
        &self,
        id: &str,
        domain: &str,
        priority: Priority,
        tasks: Vec<TaskDef>,
    ) -> Result<Workflow, PincerError> {
        validate_id("workflow", id)?;
        for def in &tasks {
            validate_id("task", &def.id)?;
            if def.capability.trim().is_empty() {
                return Err(PincerError::ValidationError(format!(
                    "task '{}' has no capability",
                    def.id
                )));
            }
        }
        resolver::validate_definition(&tasks)?;

        self.commit(|state| {
            if state.workflows.contains_key(id) {
                return Err(PincerError::DuplicateWorkflow(id.to_string()));
            }
            for def in &tasks {
                if !state.pool.agents().iter().any(|a| a.capability == def.capability) {
                    tracing::warn!(
                        workflow = id,
                        task = %def.id,
                        capability = %def.capability,
                        "no agent in the roster has this capability; task can never be dispatched"
                    );
                }
            }
            let workflow = Workflow {
                id: id.to_string(),
                domain: domain.to_string(),
                priority,
                created_at: time::now_epoch_z(),
                tasks: tasks.iter().cloned().map(Task::from_def).collect(),
            };
            state.to_mut().workflows.insert(id.to_string(), workflow.clone());
            tracing::info!(workflow = id, tasks = workflow.tasks.len(), "workflow started");
            let event = self
                .event("workflow.start", id)
                .detail(format!("{} tasks", workflow.tasks.len()));
            Ok((workflow, Some(event)))
        })
    }

    pub fn get_status(&self, workflow_id: &str) -> Result<StatusSnapshot, PincerError> {
        let state = self.lock()?;
        let wf = state.workflow(workflow_id)?;
        Ok(StatusSnapshot {
            workflow_id: wf.id.clone(),
            domain: wf.domain.clone(),
            priority: wf.priority,
            created_at: wf.created_at.clone(),
            counts: StatusCounts::tally(&wf.tasks),
            tasks: wf.tasks.iter().map(TaskView::from).collect(),
            agents: state.pool.agents().to_vec(),
        })
    }

    pub fn validate_dependencies(
        &self,
        workflow_id: &str,
        task_id: &str,
    ) -> Result<Readiness, PincerError> {
        let state = self.lock()?;
        resolver::is_ready(state.workflow(workflow_id)?, task_id)
    }

    /// Attempts PENDING -> RUNNING for one task.
    pub fn advance(&self, workflow_id: &str, task_id: &str) -> Result<AdvanceOutcome, PincerError> {
        self.commit(|state| {
            let capability = {
                let wf = state.workflow(workflow_id)?;
                let task = wf.require_task(task_id)?;
                ensure_transition(task, TaskStatus::Running)?;
                let readiness = resolver::is_ready(wf, task_id)?;
                if !readiness.ready {
                    tracing::debug!(workflow = workflow_id, task = task_id, reason = %readiness.reason, "task not ready");
                    return Ok((AdvanceOutcome::NotReady { reason: readiness.reason }, None));
                }
                task.capability.clone()
            };

            if state.pool.find_available(&capability).is_none() {
                tracing::debug!(workflow = workflow_id, task = task_id, capability = %capability, "no agent available");
                return Ok((AdvanceOutcome::NoAgentAvailable { capability }, None));
            }
            let state = state.to_mut();
            let Some(agent_id) = state
                .pool
                .claim(&capability, TaskRef::new(workflow_id, task_id))
            else {
                return Ok((AdvanceOutcome::NoAgentAvailable { capability }, None));
            };

            let task = state.task_mut(workflow_id, task_id)?;
            task.status = TaskStatus::Running;
            task.assigned_agent = Some(agent_id.clone());
            task.started_at = Some(time::now_epoch_z());
            task.completed_at = None;
            task.attempts += 1;

            tracing::info!(workflow = workflow_id, task = task_id, agent = %agent_id, "task dispatched");
            let event = self
                .event("task.advance", workflow_id)
                .task(task_id)
                .agent(Some(&agent_id));
            Ok((AdvanceOutcome::Dispatched { agent_id }, Some(event)))
        })
    }

    /// RUNNING -> COMPLETED. `deliverables` are labels reported by the agent
    /// and carried into evidence records.
    pub fn complete_task(
        &self,
        workflow_id: &str,
        task_id: &str,
        deliverables: Vec<String>,
    ) -> Result<Task, PincerError> {
        self.commit(|state| {
            let agent_id = Self::release_running(state, workflow_id, task_id, TaskStatus::Completed)?;
            let task = state.to_mut().task_mut(workflow_id, task_id)?;
            task.status = TaskStatus::Completed;
            task.completed_at = Some(time::now_epoch_z());
            task.deliverables = deliverables;
            let task = task.clone();

            tracing::info!(workflow = workflow_id, task = task_id, agent = %agent_id, "task completed");
            let event = self
                .event("task.complete", workflow_id)
                .task(task_id)
                .agent(Some(&agent_id));
            Ok((task, Some(event)))
        })
    }

    /// RUNNING -> FAILED. The agent is released; dependents stay blocked until
    /// the task is retried and completed.
    pub fn fail_task(
        &self,
        workflow_id: &str,
        task_id: &str,
        reason: &str,
    ) -> Result<Task, PincerError> {
        self.commit(|state| {
            let agent_id = Self::release_running(state, workflow_id, task_id, TaskStatus::Failed)?;
            let task = state.to_mut().task_mut(workflow_id, task_id)?;
            task.status = TaskStatus::Failed;
            task.failure_reason = Some(reason.to_string());
            let task = task.clone();

            tracing::warn!(workflow = workflow_id, task = task_id, agent = %agent_id, reason, "task failed");
            let event = self
                .event("task.fail", workflow_id)
                .task(task_id)
                .agent(Some(&agent_id))
                .detail(reason);
            Ok((task, Some(event)))
        })
    }

    /// FAILED -> PENDING. Never automatic.
    pub fn retry_task(&self, workflow_id: &str, task_id: &str) -> Result<Task, PincerError> {
        self.commit(|state| {
            ensure_transition(
                state.workflow(workflow_id)?.require_task(task_id)?,
                TaskStatus::Pending,
            )?;
            let task = state.to_mut().task_mut(workflow_id, task_id)?;
            task.status = TaskStatus::Pending;
            task.assigned_agent = None;
            task.started_at = None;
            task.completed_at = None;
            task.failure_reason = None;
            task.deliverables.clear();
            let task = task.clone();

            tracing::info!(workflow = workflow_id, task = task_id, attempts = task.attempts, "task reset for retry");
            let event = self.event("task.retry", workflow_id).task(task_id);
            Ok((task, Some(event)))
        })
    }

    /// Checks the RUNNING -> `to` edge and frees the bound agent.
    fn release_running(
        state: &mut Cow<'_, OrchestratorState>,
        workflow_id: &str,
        task_id: &str,
        to: TaskStatus,
    ) -> Result<String, PincerError> {
        let task = state.workflow(workflow_id)?.require_task(task_id)?;
        ensure_transition(task, to)?;
        let agent_id = task.assigned_agent.clone().ok_or_else(|| {
            PincerError::ValidationError(format!("running task '{}' has no agent", task_id))
        })?;
        let expected = TaskRef::new(workflow_id, task_id);
        let bound = state.pool.agent(&agent_id).and_then(|a| a.current_task.as_ref());
        if bound != Some(&expected) {
            return Err(PincerError::ValidationError(format!(
                "agent '{}' is not bound to {}",
                agent_id, expected
            )));
        }
        let pool = &mut state.to_mut().pool;
        if to == TaskStatus::Failed {
            pool.release_failed(&agent_id)?;
        } else {
            pool.release(&agent_id)?;
        }
        Ok(agent_id)
    }

    /// PENDING tasks whose dependencies are all completed, in declaration order.
    pub fn ready_tasks(&self, workflow_id: &str) -> Result<Vec<String>, PincerError> {
        let state = self.lock()?;
        let wf = state.workflow(workflow_id)?;
        let mut ready = Vec::new();
        for task in wf.tasks.iter().filter(|t| t.status == TaskStatus::Pending) {
            if resolver::is_ready(wf, &task.id)?.ready {
                ready.push(task.id.clone());
            }
        }
        Ok(ready)
    }

    pub fn list_workflows(&self) -> Result<Vec<String>, PincerError> {
        Ok(self.lock()?.workflows.keys().cloned().collect())
    }

    pub fn workflow(&self, workflow_id: &str) -> Result<Workflow, PincerError> {
        Ok(self.lock()?.workflow(workflow_id)?.clone())
    }

    pub fn agents(&self) -> Result<Vec<Agent>, PincerError> {
        Ok(self.lock()?.pool.agents().to_vec())
    }

    pub fn capacity(&self) -> Result<usize, PincerError> {
        Ok(self.lock()?.pool.capacity())
    }

    /// Evidence for explicit task ids, or a wave prefix, or the whole workflow.
    pub fn generate_evidence(
        &self,
        workflow_id: &str,
        task_ids: &[String],
        wave: Option<&str>,
    ) -> Result<EvidenceRecord, PincerError> {
        let state = self.lock()?;
        let wf = state.workflow(workflow_id)?;
        evidence::generate(wf, state.pool.agents(), task_ids, wave)
    }
}
