//! Log Store - bounded per-execution log buffers
//!
//! Provides:
//! - Append with sanitization and FIFO eviction per execution
//! - Filtered reads, pagination and substring search
//! - Fan-out subscriptions for live output
//! - Text/JSON export
//! - Time-based eviction of idle executions

mod sanitize;
mod subscription;

pub use sanitize::{needs_review, sanitize_message, REPLACEMENT_MARKER};
pub use subscription::{LogSubscription, Unsubscribe};

use crate::task::ExecutionId;
use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use scriptdeck_foundation::{Error, LogSettings, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subscription::Subscribers;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Log level of a script message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    /// Upper-case label used in text exports
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error)
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "success" => Ok(LogLevel::Success),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::InvalidInput(format!("unknown log level: {}", other))),
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique, increasing across the whole store
    pub id: u64,

    pub execution_id: ExecutionId,

    pub level: LogLevel,

    /// Sanitized message text
    pub message: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl LogEntry {
    /// `[localTimestamp] [LEVEL] message`
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level.label(),
            self.message
        )
    }
}

/// Filter and pagination for [`LogStore::get_logs`]
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Options for [`LogStore::search_logs`]
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict to one execution; all retained executions otherwise
    pub execution_id: Option<ExecutionId>,
    pub level: Option<LogLevel>,
    pub case_sensitive: bool,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execution(mut self, execution_id: impl Into<ExecutionId>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }
}

/// Export format for [`LogStore::export_logs`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ExportFormat::Text),
            "json" => Ok(ExportFormat::Json),
            other => Err(Error::InvalidInput(format!("unknown export format: {}", other))),
        }
    }
}

/// Configuration for the log store
#[derive(Debug, Clone)]
pub struct LogStoreConfig {
    /// Entries retained per execution (oldest dropped first)
    pub max_entries_per_execution: usize,

    /// How often `auto_cleanup` runs
    pub cleanup_interval: Duration,

    /// Executions idle longer than this are dropped
    pub max_age: Duration,

    /// Queue size for each subscriber
    pub subscriber_queue_capacity: usize,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self::from(&LogSettings::default())
    }
}

impl From<&LogSettings> for LogStoreConfig {
    fn from(settings: &LogSettings) -> Self {
        Self {
            max_entries_per_execution: settings.max_entries_per_execution.max(1),
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_secs.max(1)),
            max_age: Duration::from_secs(settings.max_age_secs),
            subscriber_queue_capacity: settings.subscriber_queue_capacity.max(1),
        }
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStoreStats {
    pub executions: usize,
    pub entries: usize,
    pub subscribers: usize,
    /// Entries dropped by the per-execution cap
    pub evicted: u64,
    /// Deliveries dropped because a subscriber queue was full
    pub dropped_deliveries: u64,
    /// Messages that still carried replacement markers after sanitization
    pub flagged_messages: u64,
    /// Ingestion attempts rejected internally
    pub ingest_errors: u64,
}

/// Log buffer for a single execution
#[derive(Debug)]
struct ExecutionLog {
    entries: VecDeque<LogEntry>,
    /// Timestamp of the newest entry, or of creation while empty
    last_activity: DateTime<Utc>,
}

impl ExecutionLog {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            last_activity: Utc::now(),
        }
    }

    /// Append and evict; returns how many entries were dropped
    fn push(&mut self, entry: LogEntry, max_entries: usize) -> usize {
        self.last_activity = entry.timestamp;
        self.entries.push_back(entry);

        let mut evicted = 0;
        while self.entries.len() > max_entries {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    fn is_idle(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.entries.is_empty() || now - self.last_activity > max_age
    }
}

/// Log store - manages log buffers for all executions
pub struct LogStore {
    /// Buffers by execution ID
    buffers: RwLock<HashMap<ExecutionId, ExecutionLog>>,

    subscribers: Arc<Subscribers>,

    next_entry_id: AtomicU64,

    evicted: AtomicU64,
    dropped_deliveries: AtomicU64,
    flagged_messages: AtomicU64,
    ingest_errors: AtomicU64,

    config: LogStoreConfig,
}

impl LogStore {
    pub fn new() -> Self {
        Self::with_config(LogStoreConfig::default())
    }

    pub fn with_config(config: LogStoreConfig) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            subscribers: Arc::new(Subscribers::default()),
            next_entry_id: AtomicU64::new(1),
            evicted: AtomicU64::new(0),
            dropped_deliveries: AtomicU64::new(0),
            flagged_messages: AtomicU64::new(0),
            ingest_errors: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &LogStoreConfig {
        &self.config
    }

    // ========== Ingestion ==========

    /// Append a log entry.
    ///
    /// Never fails the caller: rejected input is reported through `tracing`
    /// and counted in [`LogStoreStats::ingest_errors`].
    pub fn add_log(
        &self,
        execution_id: &ExecutionId,
        level: LogLevel,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) {
        if let Err(e) = self.try_add_log(execution_id, level, message, metadata) {
            self.ingest_errors.fetch_add(1, Ordering::Relaxed);
            warn!(execution_id = %execution_id, error = %e, "Dropped log entry");
        }
    }

    fn try_add_log(
        &self,
        execution_id: &ExecutionId,
        level: LogLevel,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<LogEntry> {
        if execution_id.is_empty() {
            return Err(Error::InvalidInput("empty execution id".to_string()));
        }

        let message = sanitize_message(message).into_owned();
        if needs_review(&message) {
            self.flagged_messages.fetch_add(1, Ordering::Relaxed);
            warn!(
                execution_id = %execution_id,
                "Log message still contains replacement markers after sanitization"
            );
        }

        // id assignment, append and fan-out happen under the same write lock,
        // so storage and every subscriber see entries in id order
        let mut buffers = self.buffers.write();
        let entry = {
            let entry = LogEntry {
                id: self.next_entry_id.fetch_add(1, Ordering::SeqCst),
                execution_id: execution_id.clone(),
                level,
                message,
                timestamp: Utc::now(),
                metadata,
            };
            let evicted = buffers
                .entry(execution_id.clone())
                .or_insert_with(ExecutionLog::new)
                .push(entry.clone(), self.config.max_entries_per_execution);
            if evicted > 0 {
                self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            }
            entry
        };

        // try_send never blocks, so holding the lock here is cheap
        let dropped = self.subscribers.publish(&entry);
        drop(buffers);
        if dropped > 0 {
            self.dropped_deliveries
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }

        Ok(entry)
    }

    /// Start tracking an execution before it logs anything
    pub fn track(&self, execution_id: &ExecutionId) {
        let mut buffers = self.buffers.write();
        buffers
            .entry(execution_id.clone())
            .or_insert_with(ExecutionLog::new);
    }

    // ========== Reads ==========

    /// Entries for one execution, filtered by exact level, then sliced
    pub fn get_logs(&self, execution_id: &ExecutionId, query: &LogQuery) -> Vec<LogEntry> {
        let buffers = self.buffers.read();
        let Some(log) = buffers.get(execution_id) else {
            return Vec::new();
        };

        log.entries
            .iter()
            .filter(|e| query.level.map_or(true, |l| e.level == l))
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Last `n` entries, most recent last
    pub fn tail(&self, execution_id: &ExecutionId, n: usize) -> Vec<LogEntry> {
        let buffers = self.buffers.read();
        buffers
            .get(execution_id)
            .map(|log| {
                let skip = log.entries.len().saturating_sub(n);
                log.entries.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Substring search over messages
    pub fn search_logs(&self, query: &str, options: &SearchOptions) -> Vec<LogEntry> {
        let needle = if options.case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };
        let matches = |entry: &LogEntry| {
            if options.level.map_or(false, |l| entry.level != l) {
                return false;
            }
            if options.case_sensitive {
                entry.message.contains(&needle)
            } else {
                entry.message.to_lowercase().contains(&needle)
            }
        };

        let buffers = self.buffers.read();
        let mut found: Vec<LogEntry> = match &options.execution_id {
            Some(id) => buffers
                .get(id)
                .map(|log| log.entries.iter().filter(|e| matches(e)).cloned().collect())
                .unwrap_or_default(),
            None => buffers
                .values()
                .flat_map(|log| log.entries.iter())
                .filter(|e| matches(e))
                .cloned()
                .collect(),
        };

        // HashMap iteration order is arbitrary; ids restore arrival order
        found.sort_by_key(|e| e.id);
        found
    }

    pub fn count(&self, execution_id: &ExecutionId) -> usize {
        self.buffers
            .read()
            .get(execution_id)
            .map(|log| log.entries.len())
            .unwrap_or(0)
    }

    /// All tracked execution IDs
    pub fn execution_ids(&self) -> Vec<ExecutionId> {
        let mut ids: Vec<ExecutionId> = self.buffers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    // ========== Subscriptions ==========

    /// Subscribe to every new entry, for any execution
    pub fn subscribe(&self) -> LogSubscription {
        let (handle, rx) = self
            .subscribers
            .register(self.config.subscriber_queue_capacity);
        LogSubscription::new(handle, rx)
    }

    /// Run `callback` for each new entry. Dropping the returned handle
    /// unsubscribes.
    ///
    /// Inside a tokio runtime the callback is driven by a spawned task;
    /// elsewhere by a dedicated thread.
    pub fn subscribe_with<F>(&self, mut callback: F) -> Unsubscribe
    where
        F: FnMut(LogEntry) + Send + 'static,
    {
        let (handle, mut rx) = self
            .subscribers
            .register(self.config.subscriber_queue_capacity);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    while let Some(entry) = rx.recv().await {
                        callback(entry);
                    }
                });
            }
            Err(_) => {
                debug!("No tokio runtime, driving log subscriber on a thread");
                let spawned = std::thread::Builder::new()
                    .name("log-subscriber".to_string())
                    .spawn(move || {
                        while let Some(entry) = rx.blocking_recv() {
                            callback(entry);
                        }
                    });
                if let Err(e) = spawned {
                    warn!(error = %e, "Failed to start log subscriber thread");
                    handle.unsubscribe();
                }
            }
        }
        handle
    }

    // ========== Export ==========

    /// Render one execution's retained entries in store order
    pub fn export_logs(&self, execution_id: &ExecutionId, format: ExportFormat) -> String {
        let entries = self.get_logs(execution_id, &LogQuery::default());
        match format {
            ExportFormat::Text => entries
                .iter()
                .map(LogEntry::format_line)
                .collect::<Vec<_>>()
                .join("\n"),
            ExportFormat::Json => serde_json::to_string_pretty(&entries).unwrap_or_else(|e| {
                warn!(execution_id = %execution_id, error = %e, "Failed to export logs as JSON");
                "[]".to_string()
            }),
        }
    }

    // ========== Cleanup ==========

    pub fn clear_logs(&self, execution_id: &ExecutionId) {
        if self.buffers.write().remove(execution_id).is_some() {
            debug!(execution_id = %execution_id, "Cleared logs");
        }
    }

    pub fn clear_all_logs(&self) {
        let mut buffers = self.buffers.write();
        let count = buffers.len();
        buffers.clear();
        debug!(executions = count, "Cleared all logs");
    }

    /// Drop idle or empty executions; returns how many were dropped
    pub fn auto_cleanup(&self) -> usize {
        self.evict_idle_at(Utc::now())
    }

    /// [`LogStore::auto_cleanup`] against an explicit clock
    pub fn evict_idle_at(&self, now: DateTime<Utc>) -> usize {
        let max_age = chrono::Duration::from_std(self.config.max_age)
            .unwrap_or_else(|_| chrono::Duration::hours(2));

        let mut buffers = self.buffers.write();
        let before = buffers.len();
        buffers.retain(|id, log| {
            let idle = log.is_idle(now, max_age);
            if idle {
                debug!(execution_id = %id, entries = log.entries.len(), "Evicting idle execution logs");
            }
            !idle
        });

        let removed = before - buffers.len();
        if removed > 0 {
            info!(removed, remaining = buffers.len(), "Log cleanup finished");
        }
        removed
    }

    /// Run [`LogStore::auto_cleanup`] every `cleanup_interval`.
    ///
    /// The loop holds a weak reference and exits once the store is dropped.
    pub fn start_auto_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        // interval panics on a zero period
        let period = self.config.cleanup_interval.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(period);
            // the first tick completes immediately
            interval_timer.tick().await;

            loop {
                interval_timer.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Log store dropped, stopping cleanup loop");
                    break;
                };
                store.auto_cleanup();
            }
        })
    }

    pub fn stats(&self) -> LogStoreStats {
        let buffers = self.buffers.read();
        LogStoreStats {
            executions: buffers.len(),
            entries: buffers.values().map(|log| log.entries.len()).sum(),
            subscribers: self.subscribers.len(),
            evicted: self.evicted.load(Ordering::Relaxed),
            dropped_deliveries: self.dropped_deliveries.load(Ordering::Relaxed),
            flagged_messages: self.flagged_messages.load(Ordering::Relaxed),
            ingest_errors: self.ingest_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
