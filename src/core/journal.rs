//! Append-only transition journal.
//!
//! One JSON object per committed transition, written after the state
//! document has been saved. The journal is an audit trail, not the source of
//! truth: replaying it is never required to recover state.

use crate::core::error::PincerError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JournalEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub workflow_id: String,
    pub task_id: Option<String>,
    pub agent_id: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JournalEvent {
    pub fn new(actor: &str, op: &str, workflow_id: &str, status: &str) -> Self {
        Self {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            workflow_id: workflow_id.to_string(),
            task_id: None,
            agent_id: None,
            status: status.to_string(),
            detail: None,
        }
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn agent(mut self, agent_id: Option<&str>) -> Self {
        self.agent_id = agent_id.map(|s| s.to_string());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &JournalEvent) -> Result<(), PincerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(PincerError::IoError)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(PincerError::IoError)?;
        writeln!(f, "{}", serde_json::to_string(event)?).map_err(PincerError::IoError)?;
        Ok(())
    }

    /// The last `n` events, oldest first. Unparseable lines are skipped.
    pub fn tail(&self, n: usize) -> Result<Vec<JournalEvent>, PincerError> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let content = fs::read_to_string(&self.path).map_err(PincerError::IoError)?;
        let events: Vec<JournalEvent> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let start = events.len().saturating_sub(n);
        Ok(events[start..].to_vec())
    }
}
