//! Task Panel - UI 계층용 façade
//!
//! Wraps the task manager and log store behind the actions a task list UI
//! offers. Not-found and no-op results come back as [`PanelOutcome::NothingToDo`]
//! with a neutral message; they are usually benign races between a click and
//! a job finishing on its own.

use crate::log::{ExportFormat, LogEntry, LogQuery, LogStore, LogSubscription};
use crate::manager::TaskManager;
use crate::state::TaskStatus;
use crate::task::{ExecutionId, RestoredTask, TaskInstanceId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Outcome
// ============================================================================

/// Result of one panel action
#[derive(Debug, Clone)]
pub enum PanelOutcome {
    /// The action changed state
    Done(String),

    /// A backgrounded task came back to the foreground
    Resumed(RestoredTask),

    /// Nothing to do; not an error
    NothingToDo(String),
}

impl PanelOutcome {
    /// Text for a toast or status line
    pub fn message(&self) -> String {
        match self {
            Self::Done(msg) | Self::NothingToDo(msg) => msg.clone(),
            Self::Resumed(task) => format!("Resumed {}", task.script.name),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NothingToDo(_))
    }

    pub fn into_restored(self) -> Option<RestoredTask> {
        match self {
            Self::Resumed(task) => Some(task),
            _ => None,
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

/// One line of the task list
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRow {
    pub id: TaskInstanceId,
    pub script: String,
    pub status: TaskStatus,
    pub status_label: &'static str,
    pub symbol: &'static str,
    pub started_at: DateTime<Utc>,
    /// Entries currently retained for the execution
    pub log_count: usize,
    pub detached: bool,
}

impl TaskRow {
    pub fn format_line(&self) -> String {
        let mut line = format!(
            "{} {:<12} {:<24} {} ({} logs)",
            self.symbol,
            self.status_label,
            self.script,
            self.started_at.format("%H:%M:%S"),
            self.log_count
        );
        if self.detached {
            line.push_str(" [detached]");
        }
        line
    }
}

// ============================================================================
// Panel
// ============================================================================

#[derive(Debug, Clone)]
pub struct TaskPanel {
    manager: Arc<TaskManager>,
    log_store: Arc<LogStore>,
}

impl TaskPanel {
    pub fn new(manager: Arc<TaskManager>) -> Self {
        let log_store = manager.log_store();
        Self { manager, log_store }
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    /// Rows for every live task, oldest first
    pub async fn rows(&self) -> Vec<TaskRow> {
        self.manager
            .list()
            .await
            .into_iter()
            .map(|task| TaskRow {
                log_count: task
                    .execution_id
                    .as_ref()
                    .map_or(0, |exec| self.log_store.count(exec)),
                status_label: task.status.display_name(),
                symbol: task.status.symbol(),
                id: task.id,
                script: task.script.name,
                status: task.status,
                started_at: task.started_at,
                detached: task.detached,
            })
            .collect()
    }

    pub async fn send_to_background(&self, id: &TaskInstanceId) -> PanelOutcome {
        if self.manager.move_to_background(id).await {
            PanelOutcome::Done("Moved to background".to_string())
        } else {
            debug!(task_instance_id = %id, "Background request was a no-op");
            PanelOutcome::NothingToDo("Nothing to move to background".to_string())
        }
    }

    pub async fn resume(&self, id: &TaskInstanceId) -> PanelOutcome {
        match self.manager.restore(id).await {
            Some(task) => PanelOutcome::Resumed(task),
            None => PanelOutcome::NothingToDo("Nothing to resume".to_string()),
        }
    }

    pub async fn stop(&self, id: &TaskInstanceId) -> PanelOutcome {
        if self.manager.stop(id).await {
            PanelOutcome::Done("Task stopped".to_string())
        } else {
            PanelOutcome::NothingToDo("Task already finished".to_string())
        }
    }

    // ========== Log passthroughs ==========

    pub fn logs(&self, execution_id: &ExecutionId, query: &LogQuery) -> Vec<LogEntry> {
        self.log_store.get_logs(execution_id, query)
    }

    /// Live history if the store still has it, else the background snapshot
    pub async fn task_logs(&self, id: &TaskInstanceId) -> Vec<LogEntry> {
        let Some(task) = self.manager.get(id).await else {
            return Vec::new();
        };
        let live = task
            .execution_id
            .as_ref()
            .map(|exec| self.log_store.get_logs(exec, &LogQuery::default()))
            .unwrap_or_default();
        if live.is_empty() {
            task.log_snapshot
        } else {
            live
        }
    }

    pub fn subscribe(&self) -> LogSubscription {
        self.log_store.subscribe()
    }

    pub fn export(&self, execution_id: &ExecutionId, format: ExportFormat) -> String {
        self.log_store.export_logs(execution_id, format)
    }
}
