//! Evidence records: point-in-time reports of task outcomes.
//!
//! A record is a pure projection of in-memory state. Statuses are reported
//! verbatim, so asking for evidence on a wave that is still running is fine;
//! the metrics will simply show it. Each record carries a SHA-256 digest of
//! its canonical body so a consumer can detect edits after the fact.

use crate::core::error::PincerError;
use crate::core::model::{Agent, StatusCounts, Task, TaskStatus, Workflow};
use crate::core::time;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub name: String,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub status: TaskStatus,
    pub deliverables: Vec<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMetrics {
    pub counts: StatusCounts,
    /// Wall clock from the earliest start to the latest completion.
    pub elapsed_secs: u64,
    /// What the same tasks would have taken back to back.
    pub sequential_secs: u64,
    pub saved_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub record_id: String,
    pub generated_at: String,
    pub workflow_id: String,
    pub wave: Option<String>,
    pub tasks: Vec<TaskOutcome>,
    pub metrics: EvidenceMetrics,
    pub digest: String,
}

#[derive(Serialize)]
struct CanonicalBody<'a> {
    workflow_id: &'a str,
    wave: Option<&'a str>,
    tasks: &'a [TaskOutcome],
    metrics: &'a EvidenceMetrics,
}

fn digest_of(
    workflow_id: &str,
    wave: Option<&str>,
    tasks: &[TaskOutcome],
    metrics: &EvidenceMetrics,
) -> Result<String, PincerError> {
    let bytes = serde_json::to_vec(&CanonicalBody {
        workflow_id,
        wave,
        tasks,
        metrics,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

impl EvidenceRecord {
    /// Recomputes the digest and compares it with the stored one.
    pub fn verify(&self) -> Result<bool, PincerError> {
        let expected = digest_of(
            &self.workflow_id,
            self.wave.as_deref(),
            &self.tasks,
            &self.metrics,
        )?;
        Ok(expected == self.digest)
    }
}

/// Selects the tasks to report: explicit ids win, then the wave prefix,
/// then the whole workflow. Output follows declaration order for wave and
/// whole-workflow selection, and first-mention caller order for explicit
/// ids. The returned label is the wave that actually chose the tasks.
fn select<'a, 'w>(
    workflow: &'a Workflow,
    task_ids: &[String],
    wave: Option<&'w str>,
) -> Result<(Vec<&'a Task>, Option<&'w str>), PincerError> {
    if !task_ids.is_empty() {
        let mut seen = HashSet::new();
        let tasks = task_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| workflow.require_task(id))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok((tasks, None));
    }
    Ok(match wave {
        Some(prefix) => (workflow.wave(prefix), Some(prefix)),
        None => (workflow.tasks.iter().collect(), None),
    })
}

pub fn generate(
    workflow: &Workflow,
    agents: &[Agent],
    task_ids: &[String],
    wave: Option<&str>,
) -> Result<EvidenceRecord, PincerError> {
    let (selected, wave) = select(workflow, task_ids, wave)?;

    let tasks: Vec<TaskOutcome> = selected
        .iter()
        .map(|task| {
            let agent_name = task
                .assigned_agent
                .as_deref()
                .and_then(|id| agents.iter().find(|a| a.id == id))
                .map(|a| a.name.clone());
            TaskOutcome {
                task_id: task.id.clone(),
                name: task.name.clone(),
                agent_id: task.assigned_agent.clone(),
                agent_name,
                status: task.status,
                deliverables: task.deliverables.clone(),
                started_at: task.started_at.clone(),
                completed_at: task.completed_at.clone(),
                duration_secs: task.duration_secs(),
            }
        })
        .collect();

    let first_start = selected
        .iter()
        .filter_map(|t| t.started_at.as_deref().and_then(time::parse_epoch_z))
        .min();
    let last_end = selected
        .iter()
        .filter_map(|t| t.completed_at.as_deref().and_then(time::parse_epoch_z))
        .max();
    let elapsed_secs = match (first_start, last_end) {
        (Some(start), Some(end)) => end.saturating_sub(start),
        _ => 0,
    };
    let sequential_secs: u64 = selected.iter().filter_map(|t| t.duration_secs()).sum();

    let metrics = EvidenceMetrics {
        counts: StatusCounts::tally(selected.iter().copied()),
        elapsed_secs,
        sequential_secs,
        saved_secs: sequential_secs.saturating_sub(elapsed_secs),
    };
    let digest = digest_of(&workflow.id, wave, &tasks, &metrics)?;

    Ok(EvidenceRecord {
        record_id: Ulid::new().to_string(),
        generated_at: time::now_epoch_z(),
        workflow_id: workflow.id.clone(),
        wave: wave.map(|w| w.to_string()),
        tasks,
        metrics,
        digest,
    })
}

/// Writes `<dir>/<workflow>-<record_id>.json` and returns the path.
pub fn write_evidence(dir: &Path, record: &EvidenceRecord) -> Result<PathBuf, PincerError> {
    fs::create_dir_all(dir).map_err(PincerError::IoError)?;
    let path = dir.join(format!("{}-{}.json", record.workflow_id, record.record_id));
    let bytes = serde_json::to_vec_pretty(record)?;
    fs::write(&path, bytes).map_err(PincerError::IoError)?;
    Ok(path)
}

pub fn read_evidence(path: &Path) -> Result<EvidenceRecord, PincerError> {
    let raw = fs::read_to_string(path).map_err(PincerError::IoError)?;
    serde_json::from_str(&raw).map_err(|e| {
        PincerError::ValidationError(format!("invalid evidence record {}: {}", path.display(), e))
    })
}
