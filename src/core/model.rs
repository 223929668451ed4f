//! Workflow, task and agent records.
//!
//! Status fields are closed enums with a single canonical spelling
//! (`PENDING`, `RUNNING`, ...). Every external string goes through
//! `FromStr`, which normalizes case and the `-`/`_`/space variants seen in
//! hand-written state files, so nothing downstream compares raw strings.

use crate::core::error::PincerError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("valid id pattern"));

/// Workflow and task IDs: non-empty, `[A-Za-z0-9_.-]`, starting alphanumeric.
pub fn validate_id(kind: &str, id: &str) -> Result<(), PincerError> {
    if ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(PincerError::ValidationError(format!(
            "invalid {} id '{}': allowed characters are [A-Za-z0-9_.-]",
            kind, id
        )))
    }
}

fn normalize_token(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The only edges of the task state machine. `Failed -> Pending` is the
    /// explicit retry; nothing else leaves a terminal state.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = PincerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "pending" | "todo" | "open" | "queued" => Ok(Self::Pending),
            "running" | "in_progress" | "inprogress" | "active" => Ok(Self::Running),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            "failed" | "failure" | "error" => Ok(Self::Failed),
            _ => Err(PincerError::ValidationError(format!(
                "unknown task status '{}'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = PincerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AgentStatus {
    Idle,
    Working,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Working => "WORKING",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = PincerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "idle" | "available" => Ok(Self::Idle),
            "working" | "busy" => Ok(Self::Working),
            _ => Err(PincerError::ValidationError(format!(
                "unknown agent status '{}'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for AgentStatus {
    type Error = PincerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgentStatus> for String {
    fn from(value: AgentStatus) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = PincerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "high" | "p0" | "p1" => Ok(Self::High),
            "medium" | "normal" | "p2" => Ok(Self::Medium),
            "low" | "p3" => Ok(Self::Low),
            _ => Err(PincerError::ValidationError(format!(
                "Invalid priority: {}. Must be one of: high, medium, low",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Priority {
    type Error = PincerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.as_str().to_string()
    }
}

/// Points an agent at the task it is working on. Agents are shared across
/// workflows, so the workflow is part of the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub workflow_id: String,
    pub task_id: String,
}

impl TaskRef {
    pub fn new(workflow_id: &str, task_id: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            task_id: task_id.to_string(),
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workflow_id, self.task_id)
    }
}

/// A task as declared by the caller when the workflow is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub capability: String,
}

impl TaskDef {
    pub fn new(id: &str, name: &str, capability: &str, depends_on: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            capability: capability.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub depends_on: Vec<String>,
    pub capability: String,
    pub status: TaskStatus,
    pub assigned_agent: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    #[serde(default)]
    pub deliverables: Vec<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub attempts: u32,
}

impl Task {
    pub fn from_def(def: TaskDef) -> Self {
        Self {
            id: def.id,
            name: def.name,
            depends_on: def.depends_on,
            capability: def.capability,
            status: TaskStatus::Pending,
            assigned_agent: None,
            started_at: None,
            completed_at: None,
            deliverables: Vec::new(),
            failure_reason: None,
            attempts: 0,
        }
    }

    /// Start/finish span in seconds, when both ends are recorded.
    pub fn duration_secs(&self) -> Option<u64> {
        let start = crate::core::time::parse_epoch_z(self.started_at.as_deref()?)?;
        let end = crate::core::time::parse_epoch_z(self.completed_at.as_deref()?)?;
        Some(end.saturating_sub(start))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub domain: String,
    pub priority: Priority,
    pub created_at: String,
    /// Declaration order is kept for deterministic reporting.
    pub tasks: Vec<Task>,
}

impl Workflow {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    pub fn require_task(&self, task_id: &str) -> Result<&Task, PincerError> {
        self.task(task_id).ok_or_else(|| PincerError::UnknownTask {
            workflow_id: self.id.clone(),
            task_id: task_id.to_string(),
        })
    }

    pub fn require_task_mut(&mut self, task_id: &str) -> Result<&mut Task, PincerError> {
        let workflow_id = self.id.clone();
        self.task_mut(task_id)
            .ok_or_else(|| PincerError::UnknownTask {
                workflow_id,
                task_id: task_id.to_string(),
            })
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    /// Tasks grouped under a dotted prefix: `"2"` matches `2`, `2.1`, `2.1.3`
    /// but not `20`.
    pub fn wave(&self, prefix: &str) -> Vec<&Task> {
        let dotted = format!("{}.", prefix);
        self.tasks
            .iter()
            .filter(|t| t.id == prefix || t.id.starts_with(&dotted))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub capability: String,
    pub trust_score: f64,
    pub status: AgentStatus,
    pub current_task: Option<TaskRef>,
    pub completed_count: u64,
    #[serde(default)]
    pub failed_count: u64,
}

impl Agent {
    pub fn new(id: &str, name: &str, capability: &str, trust_score: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            capability: capability.to_string(),
            trust_score,
            status: AgentStatus::Idle,
            current_task: None,
            completed_count: 0,
            failed_count: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }
}

/// Per-task row of the status projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub assigned_agent: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            status: task.status,
            assigned_agent: task.assigned_agent.clone(),
            started_at: task.started_at.clone(),
            completed_at: task.completed_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn tally<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            counts.total += 1;
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Read-only projection consumed by renderers (console, markdown, dashboards).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub workflow_id: String,
    pub domain: String,
    pub priority: Priority,
    pub created_at: String,
    pub counts: StatusCounts,
    pub tasks: Vec<TaskView>,
    pub agents: Vec<Agent>,
}
