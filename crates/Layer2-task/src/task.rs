//! Task instance definition and types

use crate::log::LogEntry;
use crate::state::TaskStatus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scriptdeck_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Caller-assigned handle for one user-visible job
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskInstanceId(String);

impl TaskInstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskInstanceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskInstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of the underlying execution, shared with the log store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ExecutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which job type an instance runs. Immutable for the life of the instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDescriptor {
    /// Script name
    pub name: String,

    /// Arbitrary metadata (script version, target account, ...)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl ScriptDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

type CancelFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// Opaque "stop the underlying job" capability.
///
/// Clones share one underlying callback, which runs at most once no matter
/// how many clones call [`CancelHandle::cancel`].
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Mutex<Option<CancelFn>>>,
}

impl CancelHandle {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// Handle that signals cancellation by sending on a oneshot channel
    pub fn from_oneshot(tx: oneshot::Sender<()>) -> Self {
        Self::new(move || {
            tx.send(())
                .map_err(|_| Error::Cancel("execution already dropped its receiver".to_string()))
        })
    }

    /// Handle that does nothing when invoked
    pub fn noop() -> Self {
        Self::new(|| Ok(()))
    }

    /// Invoke the callback.
    ///
    /// Returns `Ok(true)` if this call fired it, `Ok(false)` if it had already
    /// fired. A panic inside the callback is caught and reported as an error.
    pub fn cancel(&self) -> Result<bool> {
        let Some(f) = self.inner.lock().take() else {
            return Ok(false);
        };

        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result.map(|()| true),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "cancel handle panicked".to_string());
                Err(Error::Cancel(message))
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The task manager's record of one job
#[derive(Debug)]
pub struct TaskInstance {
    pub id: TaskInstanceId,

    /// Known once the job starts producing output
    pub execution_id: Option<ExecutionId>,

    pub script: ScriptDescriptor,

    pub status: TaskStatus,

    /// Set once, at registration
    pub started_at: DateTime<Utc>,

    /// Captured when entering `Backgrounded`, most recent last
    pub log_snapshot: Vec<LogEntry>,

    /// Never inspected, only forwarded and invoked
    pub(crate) cancel_handle: Option<CancelHandle>,

    /// Active timer/handle indicator
    pub(crate) live: bool,

    /// Reloaded from durable storage; the original handle is gone
    pub(crate) detached: bool,
}

impl TaskInstance {
    pub(crate) fn running(
        id: TaskInstanceId,
        execution_id: Option<ExecutionId>,
        script: ScriptDescriptor,
        cancel_handle: Option<CancelHandle>,
    ) -> Self {
        let live = cancel_handle.is_some();
        Self {
            id,
            execution_id,
            script,
            status: TaskStatus::Running,
            started_at: Utc::now(),
            log_snapshot: Vec::new(),
            cancel_handle,
            live,
            detached: false,
        }
    }

    /// A job is plausibly running if output is flowing or a handle is active
    pub fn is_plausibly_running(&self) -> bool {
        self.execution_id.is_some() || self.live
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            execution_id: self.execution_id.clone(),
            script: self.script.clone(),
            status: self.status,
            started_at: self.started_at,
            log_snapshot: self.log_snapshot.clone(),
            detached: self.detached,
        }
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            execution_id: self.execution_id.clone(),
            script: self.script.clone(),
            status: self.status,
            started_at: self.started_at,
            detached: self.detached,
        }
    }
}

/// Read-only copy of one instance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: TaskInstanceId,
    pub execution_id: Option<ExecutionId>,
    pub script: ScriptDescriptor,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub log_snapshot: Vec<LogEntry>,
    pub detached: bool,
}

/// One row of [`crate::TaskManager::list`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: TaskInstanceId,
    pub execution_id: Option<ExecutionId>,
    pub script: ScriptDescriptor,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    /// No cancel handle survived the reload; stopping only clears bookkeeping
    pub detached: bool,
}

/// What `restore` hands back to the foreground
#[derive(Debug, Clone)]
pub struct RestoredTask {
    pub id: TaskInstanceId,
    pub execution_id: Option<ExecutionId>,
    pub script: ScriptDescriptor,
    pub cancel_handle: Option<CancelHandle>,
    pub log_snapshot: Vec<LogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cancel_handle_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = CancelHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let clone = handle.clone();

        assert!(handle.cancel().unwrap());
        assert!(!clone.cancel().unwrap());
        assert!(clone.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_handle_error_and_panic() {
        let failing = CancelHandle::new(|| Err(Error::Cancel("engine offline".into())));
        assert!(matches!(failing.cancel(), Err(Error::Cancel(_))));

        let panicking = CancelHandle::new(|| panic!("handle exploded"));
        match panicking.cancel() {
            Err(Error::Cancel(msg)) => assert_eq!(msg, "handle exploded"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(panicking.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_handle_from_oneshot() {
        let (tx, rx) = oneshot::channel();
        let handle = CancelHandle::from_oneshot(tx);
        assert!(handle.cancel().unwrap());
        assert!(rx.await.is_ok());

        let (tx, rx) = oneshot::channel::<()>();
        drop(rx);
        assert!(CancelHandle::from_oneshot(tx).cancel().is_err());
    }

    #[test]
    fn test_plausibly_running() {
        let id = TaskInstanceId::new("t1");
        let script = ScriptDescriptor::new("faucet");

        let idle = TaskInstance::running(id.clone(), None, script.clone(), None);
        assert!(!idle.is_plausibly_running());

        let with_exec =
            TaskInstance::running(id.clone(), Some(ExecutionId::new("e1")), script.clone(), None);
        assert!(with_exec.is_plausibly_running());

        let with_handle = TaskInstance::running(id, None, script, Some(CancelHandle::noop()));
        assert!(with_handle.is_plausibly_running());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = TaskInstanceId::new("task-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"task-7\"");
        assert_eq!(id.to_string(), "task-7");
        assert_ne!(TaskInstanceId::generate(), TaskInstanceId::generate());
    }
}
