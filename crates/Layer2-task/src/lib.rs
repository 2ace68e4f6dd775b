//! # scriptdeck-task
//!
//! Background task bookkeeping for Scriptdeck.
//! Tracks user-visible jobs while they move between foreground and background,
//! and keeps their log output around for inspection.
//!
//! ## Features
//!
//! - Task lifecycle: register, background, restore, stop
//! - Durable background set with zombie detection across restarts
//! - Bounded per-execution log buffers with live subscriptions
//! - Task panel façade for UI layers

pub mod log;
pub mod manager;
pub mod panel;
pub mod persistence;
pub mod recovery;
pub mod state;
pub mod task;

// Task system
pub use manager::{TaskManager, TaskManagerConfig};
pub use recovery::RecoveryReport;
pub use state::TaskStatus;
pub use task::{
    CancelHandle, ExecutionId, RestoredTask, ScriptDescriptor, TaskInstance, TaskInstanceId,
    TaskSummary, TaskView,
};

// Persistence
pub use persistence::{FilePersistence, MemoryPersistence, PersistedTask, PersistenceAdapter};

// Log system
pub use log::{
    needs_review, sanitize_message, ExportFormat, LogEntry, LogLevel, LogQuery, LogStore,
    LogStoreConfig, LogStoreStats, LogSubscription, SearchOptions, Unsubscribe,
    REPLACEMENT_MARKER,
};

// UI façade
pub use panel::{PanelOutcome, TaskPanel, TaskRow};
