//! Task Manager - owns the live task map
//!
//! Features:
//! - Foreground/background transitions with log snapshots
//! - Explicit stop and natural completion through one removal path
//! - Durable persistence of backgrounded tasks
//! - Zombie detection across process restarts (see [`crate::recovery`])

use crate::log::LogStore;
use crate::persistence::{PersistedTask, PersistenceAdapter};
use crate::recovery::{run_startup_protocol, RecoveryReport};
use crate::state::TaskStatus;
use crate::task::{
    CancelHandle, ExecutionId, RestoredTask, ScriptDescriptor, TaskInstance, TaskInstanceId,
    TaskSummary, TaskView,
};
use scriptdeck_foundation::TaskSettings;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for task manager
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Log entries kept in a background snapshot
    pub snapshot_limit: usize,

    /// Start the log store's periodic cleanup loop on init
    pub auto_cleanup: bool,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self::from(&TaskSettings::default())
    }
}

impl From<&TaskSettings> for TaskManagerConfig {
    fn from(settings: &TaskSettings) -> Self {
        Self {
            snapshot_limit: settings.snapshot_limit,
            auto_cleanup: true,
        }
    }
}

/// Task Manager - handles task lifecycle and background bookkeeping
///
/// `move_to_background`, `restore` and `stop` on one task id run as a
/// critical section; operations on different ids proceed independently.
pub struct TaskManager {
    /// Live tasks by ID
    tasks: RwLock<HashMap<TaskInstanceId, TaskInstance>>,

    /// Per-id critical sections
    id_locks: IdLocks,

    /// Serializes durable writes
    persist_lock: Mutex<()>,

    /// Shared log store
    log_store: Arc<LogStore>,

    persistence: Arc<dyn PersistenceAdapter>,

    /// Outcome of the startup protocol
    report: RecoveryReport,

    cleanup_task: parking_lot::Mutex<Option<JoinHandle<()>>>,

    /// Configuration
    config: TaskManagerConfig,
}

impl TaskManager {
    /// Run the restart protocol and return a ready manager.
    ///
    /// Nothing can call into the manager before recovery has finished, since
    /// the value does not exist until then.
    pub async fn init(
        config: TaskManagerConfig,
        log_store: Arc<LogStore>,
        persistence: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        let (instances, report) = run_startup_protocol(persistence.as_ref());

        let tasks: HashMap<TaskInstanceId, TaskInstance> = instances
            .into_iter()
            .map(|task| (task.id.clone(), task))
            .collect();

        let cleanup_task = config.auto_cleanup.then(|| log_store.start_auto_cleanup());

        info!(
            restored = tasks.len(),
            zombies = report.zombies_discarded.len(),
            "Task manager ready"
        );

        Self {
            tasks: RwLock::new(tasks),
            id_locks: parking_lot::Mutex::new(HashMap::new()),
            persist_lock: Mutex::new(()),
            log_store,
            persistence,
            report,
            cleanup_task: parking_lot::Mutex::new(cleanup_task),
            config,
        }
    }

    /// Get log store
    pub fn log_store(&self) -> Arc<LogStore> {
        Arc::clone(&self.log_store)
    }

    /// What recovery did at startup
    pub fn startup_report(&self) -> &RecoveryReport {
        &self.report
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    // ========== Registration ==========

    /// Register a job the execution engine just started.
    ///
    /// Returns `false` if the id is already live or the execution id is
    /// already owned by another live task.
    pub async fn register_running(
        &self,
        id: TaskInstanceId,
        execution_id: Option<ExecutionId>,
        script: ScriptDescriptor,
        cancel_handle: Option<CancelHandle>,
    ) -> bool {
        let _guard = self.lock_id(&id).await;

        {
            let mut tasks = self.tasks.write().await;
            if tasks.contains_key(&id) {
                warn!(task_instance_id = %id, "Task already registered");
                return false;
            }
            if let Some(exec) = &execution_id {
                if Self::execution_in_use(&tasks, exec) {
                    warn!(task_instance_id = %id, execution_id = %exec, "Execution already owned by another task");
                    return false;
                }
                self.log_store.track(exec);
            }

            info!(task_instance_id = %id, script = %script.name, "Registered running task");
            let task = TaskInstance::running(id.clone(), execution_id, script, cancel_handle);
            tasks.insert(id, task);
        }

        true
    }

    /// Record the execution id of a task that started producing output
    pub async fn attach_execution(&self, id: &TaskInstanceId, execution_id: ExecutionId) -> bool {
        let _guard = self.lock_id(id).await;
        let mut tasks = self.tasks.write().await;

        if Self::execution_in_use(&tasks, &execution_id) {
            warn!(task_instance_id = %id, execution_id = %execution_id, "Execution already owned by another task");
            return false;
        }
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };

        self.log_store.track(&execution_id);
        debug!(task_instance_id = %id, execution_id = %execution_id, "Attached execution");
        task.execution_id = Some(execution_id);
        true
    }

    /// Mark whether an active timer/handle keeps the job alive
    pub async fn set_liveness(&self, id: &TaskInstanceId, live: bool) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(id) {
            Some(task) => {
                task.live = live;
                true
            }
            None => false,
        }
    }

    fn execution_in_use(tasks: &HashMap<TaskInstanceId, TaskInstance>, exec: &ExecutionId) -> bool {
        tasks
            .values()
            .any(|t| t.status.is_live() && t.execution_id.as_ref() == Some(exec))
    }

    // ========== Transitions ==========

    /// Detach a running task from the foreground.
    ///
    /// Captures the recent log history, marks the task `Backgrounded` and
    /// persists it. Returns `false` (no-op) if the task is unknown, already
    /// backgrounded, or nothing is plausibly running.
    pub async fn move_to_background(&self, id: &TaskInstanceId) -> bool {
        let _guard = self.lock_id(id).await;

        {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(id) else {
                warn!(task_instance_id = %id, "Nothing to background: unknown task");
                return false;
            };

            if task.status == TaskStatus::Backgrounded {
                debug!(task_instance_id = %id, "Task already backgrounded");
                return false;
            }
            if !task.is_plausibly_running() {
                warn!(task_instance_id = %id, "Nothing to background: no execution or live handle");
                return false;
            }

            task.log_snapshot = task
                .execution_id
                .as_ref()
                .map(|exec| self.log_store.tail(exec, self.config.snapshot_limit))
                .unwrap_or_default();
            task.status = TaskStatus::Backgrounded;

            info!(
                task_instance_id = %id,
                snapshot = task.log_snapshot.len(),
                "Moved task to background"
            );
        }

        self.persist().await;
        true
    }

    /// Re-attach a backgrounded task to the foreground.
    ///
    /// `None` means there was nothing to restore (already resumed, stopped,
    /// or never existed); callers should not treat it as an error.
    pub async fn restore(&self, id: &TaskInstanceId) -> Option<RestoredTask> {
        let _guard = self.lock_id(id).await;

        let restored = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(id)?;
            if task.status != TaskStatus::Backgrounded {
                debug!(task_instance_id = %id, status = %task.status, "Nothing to restore");
                return None;
            }

            task.status = TaskStatus::Running;
            if task.detached {
                warn!(task_instance_id = %id, "Restoring reloaded task without a cancel handle");
            }
            info!(task_instance_id = %id, "Restored task to foreground");

            RestoredTask {
                id: task.id.clone(),
                execution_id: task.execution_id.clone(),
                script: task.script.clone(),
                cancel_handle: task.cancel_handle.clone(),
                log_snapshot: task.log_snapshot.clone(),
            }
        };

        self.persist().await;
        Some(restored)
    }

    /// Stop a task: invoke its cancel handle, then drop all bookkeeping.
    ///
    /// Returns `false` if no such task exists.
    pub async fn stop(&self, id: &TaskInstanceId) -> bool {
        self.finish(id, TaskStatus::Stopped).await
    }

    /// Natural completion, reported by the execution engine.
    ///
    /// Same removal path as [`TaskManager::stop`]; only the log line differs.
    pub async fn complete(&self, id: &TaskInstanceId) -> bool {
        self.finish(id, TaskStatus::Completed).await
    }

    async fn finish(&self, id: &TaskInstanceId, outcome: TaskStatus) -> bool {
        debug_assert!(outcome.is_terminal());
        let guard = self.lock_id(id).await;

        let removed = self.tasks.write().await.remove(id);
        let Some(mut task) = removed else {
            debug!(task_instance_id = %id, "Nothing to stop: unknown task");
            return false;
        };

        // bookkeeping proceeds whatever the handle does
        if let Some(handle) = task.cancel_handle.take() {
            match handle.cancel() {
                Ok(true) => debug!(task_instance_id = %id, "Cancel handle invoked"),
                Ok(false) => debug!(task_instance_id = %id, "Cancel handle already fired"),
                Err(e) => error!(task_instance_id = %id, error = %e, "Cancel handle failed"),
            }
        }
        task.live = false;
        task.status = outcome;

        self.persist().await;
        drop(guard);

        info!(
            task_instance_id = %id,
            status = %outcome,
            was_detached = task.detached,
            "Task removed"
        );
        true
    }

    // ========== Queries ==========

    /// Snapshot of the live map, oldest first
    pub async fn list(&self) -> Vec<TaskSummary> {
        let tasks = self.tasks.read().await;
        let mut summaries: Vec<TaskSummary> = tasks.values().map(TaskInstance::summary).collect();
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Get a task by ID
    pub async fn get(&self, id: &TaskInstanceId) -> Option<TaskView> {
        self.tasks.read().await.get(id).map(TaskInstance::view)
    }

    pub async fn contains(&self, id: &TaskInstanceId) -> bool {
        self.tasks.read().await.contains_key(id)
    }

    /// Get count of live tasks
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Get count of backgrounded tasks
    pub async fn background_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.status.is_backgrounded())
            .count()
    }

    // ========== Lifecycle ==========

    /// Stop the cleanup loop and flush the background set.
    ///
    /// Live tasks stay in the map; their jobs are owned by the engine.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.cleanup_task.lock().take() {
            handle.abort();
            debug!("Stopped log cleanup loop");
        }
        self.persist().await;
        info!("Task manager shut down");
    }

    /// Rewrite the durable set from the backgrounded tasks in the live map
    async fn persist(&self) {
        let _persist = self.persist_lock.lock().await;

        let mut snapshot: Vec<PersistedTask> = {
            let tasks = self.tasks.read().await;
            tasks
                .values()
                .filter(|t| t.status.is_backgrounded())
                .map(PersistedTask::from)
                .collect()
        };
        snapshot.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        if let Err(e) = self.persistence.write_all(&snapshot) {
            warn!(error = %e, count = snapshot.len(), "Failed to persist background tasks");
        }
    }

    async fn lock_id(&self, id: &TaskInstanceId) -> IdGuard<'_> {
        let lock = {
            let mut locks = self.id_locks.lock();
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        let held = Arc::clone(&lock).lock_owned().await;
        IdGuard {
            locks: &self.id_locks,
            id: id.clone(),
            lock,
            _held: held,
        }
    }
}

type IdLocks = parking_lot::Mutex<HashMap<TaskInstanceId, Arc<Mutex<()>>>>;

/// One per-id critical section. Dropping it forgets the id's lock once
/// nobody else is waiting on it.
struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: TaskInstanceId,
    lock: Arc<Mutex<()>>,
    _held: OwnedMutexGuard<()>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // the map, `lock` and `_held` account for three references
        let idle = locks
            .get(&self.id)
            .map_or(false, |l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) <= 3);
        if idle {
            locks.remove(&self.id);
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_task.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("config", &self.config)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogLevel;
    use crate::persistence::MemoryPersistence;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn manager_with(store: Arc<MemoryPersistence>) -> TaskManager {
        let config = TaskManagerConfig {
            auto_cleanup: false,
            ..Default::default()
        };
        TaskManager::init(config, Arc::new(LogStore::new()), store).await
    }

    fn tid(id: &str) -> TaskInstanceId {
        TaskInstanceId::new(id)
    }

    fn counting_handle() -> (CancelHandle, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = CancelHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (handle, calls)
    }

    #[tokio::test]
    async fn test_task_manager_creation() {
        let manager = manager_with(Arc::new(MemoryPersistence::new())).await;
        assert!(manager.is_empty().await);
        assert!(manager.startup_report().process_restart);
    }

    #[test]
    fn test_config_defaults_follow_settings() {
        let config = TaskManagerConfig::default();
        assert_eq!(config.snapshot_limit, TaskSettings::default().snapshot_limit);
        assert!(config.auto_cleanup);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let manager = manager_with(Arc::new(MemoryPersistence::new())).await;
        let script = ScriptDescriptor::new("bridge");

        assert!(
            manager
                .register_running(tid("t1"), Some("e1".into()), script.clone(), None)
                .await
        );
        assert!(
            !manager
                .register_running(tid("t1"), Some("e2".into()), script.clone(), None)
                .await
        );
        // e1 belongs to t1 already
        assert!(
            !manager
                .register_running(tid("t2"), Some("e1".into()), script, None)
                .await
        );
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_background_requires_running_job() {
        let store = Arc::new(MemoryPersistence::new());
        let manager = manager_with(store.clone()).await;
        manager
            .register_running(tid("idle"), None, ScriptDescriptor::new("noop"), None)
            .await;

        assert!(!manager.move_to_background(&tid("idle")).await);
        assert_eq!(manager.get(&tid("idle")).await.unwrap().status, TaskStatus::Running);
        assert!(store.stored().is_empty());

        // a live timer is enough
        assert!(manager.set_liveness(&tid("idle"), true).await);
        assert!(manager.move_to_background(&tid("idle")).await);
    }

    #[tokio::test]
    async fn test_background_is_idempotent() {
        let store = Arc::new(MemoryPersistence::new());
        let manager = manager_with(store.clone()).await;
        manager
            .register_running(tid("t"), Some("e".into()), ScriptDescriptor::new("s"), None)
            .await;

        assert!(manager.move_to_background(&tid("t")).await);
        let writes = store.write_count();
        assert!(!manager.move_to_background(&tid("t")).await);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_snapshot_is_bounded() {
        let store = Arc::new(MemoryPersistence::new());
        let logs = Arc::new(LogStore::new());
        let config = TaskManagerConfig {
            snapshot_limit: 3,
            auto_cleanup: false,
        };
        let manager = TaskManager::init(config, logs.clone(), store.clone()).await;
        let exec = ExecutionId::new("e");
        manager
            .register_running(tid("t"), Some(exec.clone()), ScriptDescriptor::new("s"), None)
            .await;
        for i in 0..10 {
            logs.add_log(&exec, LogLevel::Info, &format!("step {}", i), None);
        }

        manager.move_to_background(&tid("t")).await;

        let view = manager.get(&tid("t")).await.unwrap();
        let messages: Vec<&str> = view.log_snapshot.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["step 7", "step 8", "step 9"]);
        assert_eq!(store.stored()[0].log_snapshot.len(), 3);
    }

    #[tokio::test]
    async fn test_restore_hands_back_handle() {
        let store = Arc::new(MemoryPersistence::new());
        let manager = manager_with(store.clone()).await;
        let (handle, calls) = counting_handle();
        manager
            .register_running(tid("t"), Some("e".into()), ScriptDescriptor::new("s"), Some(handle))
            .await;

        manager.move_to_background(&tid("t")).await;
        let restored = manager.restore(&tid("t")).await.unwrap();
        assert_eq!(restored.execution_id, Some(ExecutionId::new("e")));
        assert!(store.stored().is_empty());

        // second restore has nothing to do
        assert!(manager.restore(&tid("t")).await.is_none());

        // the foreground copy and the manager share one handle
        restored.cancel_handle.unwrap().cancel().unwrap();
        assert!(manager.stop(&tid("t")).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restore_running_task_is_noop() {
        let manager = manager_with(Arc::new(MemoryPersistence::new())).await;
        manager
            .register_running(tid("t"), Some("e".into()), ScriptDescriptor::new("s"), None)
            .await;
        assert!(manager.restore(&tid("t")).await.is_none());
        assert!(manager.restore(&tid("nope")).await.is_none());
    }

    #[tokio::test]
    async fn test_stop_invokes_handle_once_and_removes() {
        let store = Arc::new(MemoryPersistence::new());
        let manager = manager_with(store.clone()).await;
        let (handle, calls) = counting_handle();
        manager
            .register_running(tid("t"), Some("e".into()), ScriptDescriptor::new("s"), Some(handle))
            .await;
        manager.move_to_background(&tid("t")).await;

        assert!(manager.stop(&tid("t")).await);
        assert!(!manager.stop(&tid("t")).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.list().await.is_empty());
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn test_stop_survives_failing_handle() {
        let manager = manager_with(Arc::new(MemoryPersistence::new())).await;
        let handle = CancelHandle::new(|| panic!("engine gone"));
        manager
            .register_running(tid("t"), Some("e".into()), ScriptDescriptor::new("s"), Some(handle))
            .await;

        assert!(manager.stop(&tid("t")).await);
        assert!(!manager.contains(&tid("t")).await);
    }

    #[tokio::test]
    async fn test_complete_uses_removal_path() {
        let manager = manager_with(Arc::new(MemoryPersistence::new())).await;
        manager
            .register_running(tid("t"), Some("e".into()), ScriptDescriptor::new("s"), None)
            .await;
        assert!(manager.complete(&tid("t")).await);
        assert!(!manager.complete(&tid("t")).await);
        assert!(manager.restore(&tid("t")).await.is_none());
    }

    #[tokio::test]
    async fn test_execution_id_reusable_after_stop() {
        let manager = manager_with(Arc::new(MemoryPersistence::new())).await;
        let script = ScriptDescriptor::new("s");
        manager
            .register_running(tid("a"), Some("e".into()), script.clone(), None)
            .await;
        manager.stop(&tid("a")).await;
        assert!(
            manager
                .register_running(tid("b"), Some("e".into()), script, None)
                .await
        );
    }

    #[tokio::test]
    async fn test_attach_execution() {
        let manager = manager_with(Arc::new(MemoryPersistence::new())).await;
        let script = ScriptDescriptor::new("s");
        manager.register_running(tid("a"), None, script.clone(), None).await;
        manager
            .register_running(tid("b"), Some("taken".into()), script, None)
            .await;

        assert!(!manager.attach_execution(&tid("a"), "taken".into()).await);
        assert!(manager.attach_execution(&tid("a"), "fresh".into()).await);
        assert!(!manager.attach_execution(&tid("ghost"), "other".into()).await);
        assert_eq!(
            manager.get(&tid("a")).await.unwrap().execution_id,
            Some(ExecutionId::new("fresh"))
        );
        assert!(manager.move_to_background(&tid("a")).await);
    }

    #[tokio::test]
    async fn test_list_reflects_live_map() {
        let manager = manager_with(Arc::new(MemoryPersistence::new())).await;
        let script = ScriptDescriptor::new("s");
        manager
            .register_running(tid("a"), Some("ea".into()), script.clone(), None)
            .await;
        manager
            .register_running(tid("b"), Some("eb".into()), script, None)
            .await;
        manager.move_to_background(&tid("b")).await;

        let list = manager.list().await;
        assert_eq!(list.len(), 2);
        let b = list.iter().find(|t| t.id == tid("b")).unwrap();
        assert_eq!(b.status, TaskStatus::Backgrounded);
        assert_eq!(manager.background_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_ops_on_one_id() {
        let store = Arc::new(MemoryPersistence::new());
        let manager = Arc::new(manager_with(store.clone()).await);
        let (handle, calls) = counting_handle();
        manager
            .register_running(tid("t"), Some("e".into()), ScriptDescriptor::new("s"), Some(handle))
            .await;

        let mut joins = Vec::new();
        for i in 0..16 {
            let m = manager.clone();
            joins.push(tokio::spawn(async move {
                match i % 3 {
                    0 => {
                        m.move_to_background(&tid("t")).await;
                    }
                    1 => {
                        m.restore(&tid("t")).await;
                    }
                    _ => {
                        m.stop(&tid("t")).await;
                    }
                }
            }));
        }
        for j in joins {
            j.await.unwrap();
        }

        // at least one stop ran, so the task is gone everywhere
        assert!(manager.list().await.is_empty());
        assert!(store.stored().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.id_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_locks() {
        let manager = manager_with(Arc::new(MemoryPersistence::new())).await;

        for i in 0..100 {
            let ghost = tid(&format!("ghost-{}", i));
            assert!(manager.restore(&ghost).await.is_none());
            assert!(!manager.move_to_background(&ghost).await);
            assert!(!manager.stop(&ghost).await);
            assert!(!manager.attach_execution(&ghost, format!("e-{}", i).into()).await);
        }
        assert!(manager.id_locks.lock().is_empty());

        // a full lifecycle releases its entry too
        let script = ScriptDescriptor::new("s");
        manager
            .register_running(tid("t"), Some("e".into()), script.clone(), None)
            .await;
        assert!(!manager.register_running(tid("t"), None, script, None).await);
        manager.move_to_background(&tid("t")).await;
        manager.restore(&tid("t")).await;
        assert!(manager.id_locks.lock().is_empty());
        manager.stop(&tid("t")).await;
        assert!(manager.id_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_flushes() {
        let store = Arc::new(MemoryPersistence::new());
        let manager = TaskManager::init(
            TaskManagerConfig::default(),
            Arc::new(LogStore::new()),
            store.clone(),
        )
        .await;
        manager
            .register_running(tid("t"), Some("e".into()), ScriptDescriptor::new("s"), None)
            .await;
        manager.move_to_background(&tid("t")).await;

        assert!(manager.cleanup_task.lock().is_some());

        let writes = store.write_count();
        manager.shutdown().await;
        assert_eq!(store.write_count(), writes + 1);
        assert_eq!(store.stored().len(), 1);
        assert!(manager.cleanup_task.lock().is_none());
    }
}
