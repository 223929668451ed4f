//! Durable workflow state.
//!
//! State is persisted as one whole document: every committed transition
//! rewrites it in full. `JsonFileStore` writes to a sibling temp file and
//! renames it over the target, so a crash mid-write leaves the previous
//! document intact instead of a torn one.
//!
//! A `JsonFileStore` also holds an exclusive lock on `<state>.lock` for as
//! long as it lives. Every process (or in-process owner) therefore sees
//! load, mutate and save as one unit: a second opener waits for the first
//! to drop its store, then loads the state the first one saved.

use crate::core::error::PincerError;
use crate::core::model::{Agent, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const STATE_FILE_NAME: &str = "workflows.json";
pub const JOURNAL_FILE_NAME: &str = "orchestrator.events.jsonl";
pub const EVIDENCE_DIR_NAME: &str = "evidence";
pub const LOCK_FILE_NAME: &str = "workflows.lock";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle on a pincer state directory.
///
/// Layout:
/// - `<root>/config.toml`
/// - `<root>/data/workflows.json`
/// - `<root>/data/orchestrator.events.jsonl`
/// - `<root>/evidence/`
#[derive(Debug, Clone)]
pub struct Store {
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir().join(STATE_FILE_NAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir().join(LOCK_FILE_NAME)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir().join(JOURNAL_FILE_NAME)
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.root.join(EVIDENCE_DIR_NAME)
    }
}

/// Everything that is persisted: workflows keyed by id, plus the runtime
/// state of the agent roster so a reload reproduces assignments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub workflows: BTreeMap<String, Workflow>,
    #[serde(default)]
    pub agents: Vec<Agent>,
}

pub trait WorkflowStore: Send + Sync {
    /// An absent store loads as an empty snapshot.
    fn load(&self) -> Result<StateSnapshot, PincerError>;
    fn save(&self, snapshot: &StateSnapshot) -> Result<(), PincerError>;
}

fn jitter_ms(max_exclusive: u64) -> u64 {
    if max_exclusive <= 1 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    nanos % max_exclusive
}

/// Exclusive advisory lock on a file, released on drop. The OS drops it
/// when the holding process exits, so a crash never leaves a stale lock.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    _file: File,
}

impl StateLock {
    /// Polls until the lock is free or `timeout` has passed.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, PincerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(PincerError::IoError)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(PincerError::IoError)?;
        let started = Instant::now();
        loop {
            match file.try_lock() {
                Ok(()) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                        _file: file,
                    });
                }
                Err(TryLockError::WouldBlock) => {
                    if started.elapsed() >= timeout {
                        return Err(PincerError::StateLocked(path.display().to_string()));
                    }
                    thread::sleep(Duration::from_millis(10 + jitter_ms(30)));
                }
                Err(TryLockError::Error(e)) => return Err(PincerError::IoError(e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: StateLock,
}

impl JsonFileStore {
    /// Opens the store at `path`, waiting up to `DEFAULT_LOCK_TIMEOUT` for
    /// exclusive access.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PincerError> {
        Self::open_with_timeout(path, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn open_with_timeout(
        path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, PincerError> {
        let path = path.into();
        let lock = StateLock::acquire(&path.with_extension("lock"), timeout)?;
        tracing::debug!(lock = %lock.path().display(), "state lock acquired");
        Ok(Self { path, lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| STATE_FILE_NAME.to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

impl WorkflowStore for JsonFileStore {
    fn load(&self) -> Result<StateSnapshot, PincerError> {
        if !self.path.exists() {
            return Ok(StateSnapshot::default());
        }
        let raw = fs::read_to_string(&self.path).map_err(PincerError::IoError)?;
        if raw.trim().is_empty() {
            return Ok(StateSnapshot::default());
        }
        serde_json::from_str(&raw).map_err(|e| {
            PincerError::ValidationError(format!(
                "invalid state document {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<(), PincerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(PincerError::IoError)?;
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.tmp_path();
        {
            let mut f = File::create(&tmp).map_err(PincerError::IoError)?;
            f.write_all(&bytes).map_err(PincerError::IoError)?;
            f.sync_all().map_err(PincerError::IoError)?;
        }
        fs::rename(&tmp, &self.path).map_err(PincerError::IoError)?;
        Ok(())
    }
}

/// In-process store; keeps the last saved snapshot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<StateSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }
}

impl WorkflowStore for MemoryStore {
    fn load(&self) -> Result<StateSnapshot, PincerError> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| PincerError::LockPoisoned("memory store".to_string()))?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<(), PincerError> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| PincerError::LockPoisoned("memory store".to_string()))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }
}
