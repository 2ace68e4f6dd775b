//! Startup recovery
//!
//! Decides whether persisted background tasks can be trusted. A missing
//! session marker means the process restarted, so every persisted task is a
//! zombie: its execution died with the old process.

use crate::persistence::{PersistedTask, PersistenceAdapter};
use crate::state::TaskStatus;
use crate::task::{TaskInstance, TaskInstanceId};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// What the startup protocol did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    /// The session marker was absent
    pub process_restart: bool,
    /// Persisted tasks discarded as zombies
    pub zombies_discarded: Vec<TaskInstanceId>,
    /// Tasks loaded back into the live map
    pub restored: usize,
    /// Persisted entries skipped as duplicates
    pub duplicates_skipped: usize,
    /// A persistence read failed and was treated as empty
    pub read_failed: bool,
}

impl std::fmt::Display for RecoveryReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "restart: {}, zombies: {}, restored: {}, duplicates: {}",
            self.process_restart,
            self.zombies_discarded.len(),
            self.restored,
            self.duplicates_skipped
        )
    }
}

/// Run the restart protocol once, before the manager accepts any operation.
///
/// Returns the instances to seed the live map with.
pub(crate) fn run_startup_protocol(
    persistence: &dyn PersistenceAdapter,
) -> (Vec<TaskInstance>, RecoveryReport) {
    let mut report = RecoveryReport::default();

    let marker_present = persistence.read_flag().unwrap_or_else(|e| {
        // fail open: an unreadable marker is treated as a restart
        warn!(error = %e, "Failed to read session marker, assuming process restart");
        report.read_failed = true;
        false
    });

    let persisted = persistence.read_all().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to read persisted tasks, treating as empty");
        report.read_failed = true;
        Vec::new()
    });

    let instances = if marker_present {
        restore_persisted(persisted, &mut report)
    } else {
        report.process_restart = true;
        discard_zombies(persistence, persisted, &mut report);
        Vec::new()
    };

    if !marker_present {
        if let Err(e) = persistence.write_flag() {
            warn!(error = %e, "Failed to write session marker");
        }
    }

    info!(%report, "Task recovery finished");
    (instances, report)
}

fn discard_zombies(
    persistence: &dyn PersistenceAdapter,
    persisted: Vec<PersistedTask>,
    report: &mut RecoveryReport,
) {
    for task in &persisted {
        warn!(
            task_instance_id = %task.task_instance_id,
            execution_id = ?task.execution_id.as_ref().map(|e| e.as_str()),
            script = %task.script.name,
            "Discarding zombie task from previous process"
        );
        report.zombies_discarded.push(task.task_instance_id.clone());
    }

    if persisted.is_empty() && !report.read_failed {
        return;
    }
    if let Err(e) = persistence.write_all(&[]) {
        warn!(error = %e, "Failed to clear persisted tasks");
    }
}

fn restore_persisted(
    persisted: Vec<PersistedTask>,
    report: &mut RecoveryReport,
) -> Vec<TaskInstance> {
    let mut seen_ids = HashSet::new();
    let mut seen_executions = HashSet::new();
    let mut instances = Vec::with_capacity(persisted.len());

    for task in persisted {
        if task.status.is_terminal() {
            debug!(task_instance_id = %task.task_instance_id, "Skipping terminal persisted task");
            continue;
        }
        let duplicate_exec = task
            .execution_id
            .as_ref()
            .map_or(false, |e| !seen_executions.insert(e.clone()));
        if !seen_ids.insert(task.task_instance_id.clone()) || duplicate_exec {
            warn!(task_instance_id = %task.task_instance_id, "Skipping duplicate persisted task");
            report.duplicates_skipped += 1;
            continue;
        }

        debug!(task_instance_id = %task.task_instance_id, "Reloading background task");
        let instance = task.into_instance();
        debug_assert_eq!(instance.status, TaskStatus::Backgrounded);
        instances.push(instance);
    }

    report.restored = instances.len();
    instances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;
    use crate::task::{ExecutionId, ScriptDescriptor};
    use chrono::Utc;

    fn persisted(id: &str, exec: &str) -> PersistedTask {
        PersistedTask {
            task_instance_id: TaskInstanceId::new(id),
            execution_id: Some(ExecutionId::new(exec)),
            script: ScriptDescriptor::new("daily-claim"),
            started_at: Utc::now(),
            status: TaskStatus::Backgrounded,
            log_snapshot: Vec::new(),
        }
    }

    #[test]
    fn test_restart_discards_zombies() {
        let store = MemoryPersistence::with_tasks(vec![persisted("a", "ea"), persisted("b", "eb")]);

        let (instances, report) = run_startup_protocol(&store);

        assert!(instances.is_empty());
        assert!(report.process_restart);
        assert_eq!(report.zombies_discarded.len(), 2);
        assert!(store.stored().is_empty());
        assert!(store.has_flag());
    }

    #[test]
    fn test_same_session_reloads() {
        let store = MemoryPersistence::with_tasks(vec![persisted("a", "ea")]);
        store.write_flag().unwrap();

        let (instances, report) = run_startup_protocol(&store);

        assert!(!report.process_restart);
        assert_eq!(report.restored, 1);
        assert_eq!(instances[0].status, TaskStatus::Backgrounded);
        assert!(instances[0].is_detached());
        // durable set untouched
        assert_eq!(store.stored().len(), 1);
    }

    #[test]
    fn test_empty_store_still_sets_marker() {
        let store = MemoryPersistence::new();
        let (instances, report) = run_startup_protocol(&store);
        assert!(instances.is_empty());
        assert!(report.process_restart);
        assert!(store.has_flag());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_duplicates_are_skipped() {
        let store = MemoryPersistence::with_tasks(vec![
            persisted("a", "e1"),
            persisted("a", "e2"),
            persisted("b", "e1"),
        ]);
        store.write_flag().unwrap();

        let (instances, report) = run_startup_protocol(&store);
        assert_eq!(instances.len(), 1);
        assert_eq!(report.duplicates_skipped, 2);
    }

    #[test]
    fn test_corrupt_store_fails_open() {
        let store = MemoryPersistence::with_tasks(vec![persisted("a", "ea")]);
        store.write_flag().unwrap();
        store.corrupt();

        let (instances, report) = run_startup_protocol(&store);
        assert!(instances.is_empty());
        assert!(report.read_failed);
        // the unreadable durable set is overwritten with a clean one
        store.repair();
        assert!(store.stored().is_empty());
    }
}
