//! Persistence adapter for backgrounded tasks
//!
//! Two stores sit behind one trait:
//! - a durable set of [`PersistedTask`]s that survives process restarts
//! - a volatile session flag that survives re-creating the manager inside
//!   the same process but not a restart

use crate::log::LogEntry;
use crate::state::TaskStatus;
use crate::task::{ExecutionId, ScriptDescriptor, TaskInstance, TaskInstanceId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scriptdeck_foundation::{Error, JsonStore, Result, SessionMarkers, TaskSettings};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Key-value access used by the task manager
pub trait PersistenceAdapter: Send + Sync {
    /// Read the durable task set
    fn read_all(&self) -> Result<Vec<PersistedTask>>;

    /// Replace the durable task set
    fn write_all(&self, tasks: &[PersistedTask]) -> Result<()>;

    /// Whether the volatile session marker is present
    fn read_flag(&self) -> Result<bool>;

    /// Set the volatile session marker
    fn write_flag(&self) -> Result<()>;
}

/// Durable payload for one task. The cancel handle is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTask {
    pub task_instance_id: TaskInstanceId,
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    pub script: ScriptDescriptor,
    pub started_at: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub log_snapshot: Vec<LogEntry>,
}

impl PersistedTask {
    /// Rebuild a live-map entry after an in-process reload.
    ///
    /// The original cancel handle did not survive, so the instance is marked
    /// detached and has no handle.
    pub(crate) fn into_instance(self) -> TaskInstance {
        TaskInstance {
            id: self.task_instance_id,
            execution_id: self.execution_id,
            script: self.script,
            status: TaskStatus::Backgrounded,
            started_at: self.started_at,
            log_snapshot: self.log_snapshot,
            cancel_handle: None,
            live: false,
            detached: true,
        }
    }
}

impl From<&TaskInstance> for PersistedTask {
    fn from(task: &TaskInstance) -> Self {
        Self {
            task_instance_id: task.id.clone(),
            execution_id: task.execution_id.clone(),
            script: task.script.clone(),
            started_at: task.started_at,
            status: task.status,
            log_snapshot: task.log_snapshot.clone(),
        }
    }
}

// ============================================================================
// File-backed adapter
// ============================================================================

/// Durable set in a JSON file, session flag in the process-global markers
#[derive(Debug, Clone)]
pub struct FilePersistence {
    store: JsonStore,
    file: String,
    marker: SessionMarkers,
}

impl FilePersistence {
    pub fn new(store: JsonStore, file: impl Into<String>) -> Self {
        let file = file.into();
        // one marker per durable file
        let marker = SessionMarkers::new(format!(
            "scriptdeck-session:{}",
            store.file_path(&file).display()
        ));
        Self {
            store,
            file,
            marker,
        }
    }

    pub fn from_settings(store: JsonStore, settings: &TaskSettings) -> Self {
        Self::new(store, settings.state_file.clone())
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn marker(&self) -> &SessionMarkers {
        &self.marker
    }
}

impl PersistenceAdapter for FilePersistence {
    fn read_all(&self) -> Result<Vec<PersistedTask>> {
        let tasks = self
            .store
            .load_optional::<Vec<PersistedTask>>(&self.file)?
            .unwrap_or_default();
        debug!(file = %self.file, count = tasks.len(), "Read background task set");
        Ok(tasks)
    }

    fn write_all(&self, tasks: &[PersistedTask]) -> Result<()> {
        self.store.save(&self.file, &tasks)?;
        debug!(file = %self.file, count = tasks.len(), "Wrote background task set");
        Ok(())
    }

    fn read_flag(&self) -> Result<bool> {
        Ok(self.marker.is_set())
    }

    fn write_flag(&self) -> Result<()> {
        self.marker.set();
        Ok(())
    }
}

// ============================================================================
// In-memory adapter
// ============================================================================

/// In-memory adapter for tests and embedders without a filesystem
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    tasks: Mutex<Vec<PersistedTask>>,
    flag: AtomicBool,
    corrupt: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the durable set
    pub fn with_tasks(tasks: Vec<PersistedTask>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Self::default()
        }
    }

    /// Forget the session marker, as a process restart would
    pub fn simulate_restart(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Make every following read fail until `repair` is called
    pub fn corrupt(&self) {
        self.corrupt.store(true, Ordering::SeqCst);
    }

    pub fn repair(&self) {
        self.corrupt.store(false, Ordering::SeqCst);
    }

    /// Current durable set
    pub fn stored(&self) -> Vec<PersistedTask> {
        self.tasks.lock().clone()
    }

    pub fn has_flag(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Number of successful `write_all` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(Error::storage("stored task data is corrupt"));
        }
        Ok(())
    }
}

impl PersistenceAdapter for MemoryPersistence {
    fn read_all(&self) -> Result<Vec<PersistedTask>> {
        self.check()?;
        Ok(self.tasks.lock().clone())
    }

    fn write_all(&self, tasks: &[PersistedTask]) -> Result<()> {
        *self.tasks.lock() = tasks.to_vec();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_flag(&self) -> Result<bool> {
        self.check()?;
        Ok(self.flag.load(Ordering::SeqCst))
    }

    fn write_flag(&self) -> Result<()> {
        self.flag.store(true, Ordering::SeqCst);
        Ok(())
    }
}
