use std::io;
use thiserror::Error;

use crate::core::model::TaskStatus;

#[derive(Error, Debug)]
pub enum PincerError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Workflow already exists: {0}")]
    DuplicateWorkflow(String),
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),
    #[error("Unknown task '{task_id}' in workflow '{workflow_id}'")]
    UnknownTask {
        workflow_id: String,
        task_id: String,
    },
    #[error("Task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency { task_id: String, dependency: String },
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),
    #[error("Dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),
    #[error("Agent '{agent_id}' is busy with task '{task_id}'")]
    AgentBusy { agent_id: String, task_id: String },
    #[error("Agent '{0}' is not working")]
    AgentNotWorking(String),
    #[error("Task '{task_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("State is locked by another owner: {0}")]
    StateLocked(String),
}

impl PincerError {
    /// Configuration errors are the caller's fault and never touch persisted state.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PincerError::DuplicateWorkflow(_)
                | PincerError::UnknownWorkflow(_)
                | PincerError::UnknownTask { .. }
                | PincerError::UnknownDependency { .. }
                | PincerError::DuplicateTask(_)
                | PincerError::DependencyCycle(_)
        )
    }

    /// Stable machine-readable code used in JSON envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            PincerError::IoError(_) => "IO_ERROR",
            PincerError::JsonError(_) => "JSON_ERROR",
            PincerError::DuplicateWorkflow(_) => "DUPLICATE_WORKFLOW",
            PincerError::UnknownWorkflow(_) => "UNKNOWN_WORKFLOW",
            PincerError::UnknownTask { .. } => "UNKNOWN_TASK",
            PincerError::UnknownDependency { .. } => "UNKNOWN_DEPENDENCY",
            PincerError::DuplicateTask(_) => "DUPLICATE_TASK",
            PincerError::DependencyCycle(_) => "DEPENDENCY_CYCLE",
            PincerError::UnknownAgent(_) => "UNKNOWN_AGENT",
            PincerError::AgentBusy { .. } => "AGENT_BUSY",
            PincerError::AgentNotWorking(_) => "AGENT_NOT_WORKING",
            PincerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PincerError::ConfigError(_) => "CONFIG_ERROR",
            PincerError::ValidationError(_) => "VALIDATION_ERROR",
            PincerError::LockPoisoned(_) => "LOCK_POISONED",
            PincerError::StateLocked(_) => "STATE_LOCKED",
        }
    }
}
