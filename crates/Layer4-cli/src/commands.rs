//! Subcommand handlers

use anyhow::{bail, Context};
use scriptdeck_foundation::ScriptdeckConfig;
use scriptdeck_task::{
    ExportFormat, FilePersistence, LogEntry, LogStore, PersistedTask, PersistenceAdapter,
    RecoveryReport, TaskManager, TaskManagerConfig,
};
use std::sync::Arc;

/// List persisted background tasks
pub fn list_tasks(persistence: &FilePersistence, json: bool) -> anyhow::Result<()> {
    let tasks = persistence
        .read_all()
        .context("Failed to read background tasks")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else {
        print!("{}", render_tasks(&tasks));
    }
    Ok(())
}

/// Print one task's stored log snapshot
pub fn show_logs(
    persistence: &FilePersistence,
    id: &str,
    format: ExportFormat,
) -> anyhow::Result<()> {
    let tasks = persistence
        .read_all()
        .context("Failed to read background tasks")?;
    let Some(task) = tasks.iter().find(|t| t.task_instance_id.as_str() == id) else {
        bail!("No background task with id '{}'", id);
    };

    println!("{}", render_snapshot(&task.log_snapshot, format)?);
    Ok(())
}

/// Run the restart protocol against the durable store.
///
/// A fresh CLI process never has the session marker, so every persisted task
/// is treated as a zombie and discarded.
pub async fn purge(config: &ScriptdeckConfig, persistence: FilePersistence) -> anyhow::Result<()> {
    let manager_config = TaskManagerConfig {
        auto_cleanup: false,
        ..TaskManagerConfig::from(&config.tasks)
    };
    let log_store = Arc::new(LogStore::with_config((&config.logs).into()));
    let manager = TaskManager::init(manager_config, log_store, Arc::new(persistence)).await;

    print!("{}", render_report(manager.startup_report()));
    manager.shutdown().await;
    Ok(())
}

/// Print the merged configuration
pub fn show_config(config: &ScriptdeckConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

// ========== Rendering ==========

fn render_tasks(tasks: &[PersistedTask]) -> String {
    if tasks.is_empty() {
        return "No background tasks.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "\n{:<14} {:<24} {:<16} {:<20} {:<6}\n",
        "ID", "Script", "Status", "Started", "Logs"
    ));
    out.push_str(&format!("{}\n", "-".repeat(80)));

    for task in tasks {
        let started = task
            .started_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        out.push_str(&format!(
            "{:<14} {:<24} {:<16} {:<20} {:<6}\n",
            truncate(task.task_instance_id.as_str(), 12),
            truncate(&task.script.name, 22),
            format!("{} {}", task.status.symbol(), task.status.display_name()),
            started,
            task.log_snapshot.len()
        ));
    }

    out.push_str("\nUse 'scriptdeck logs <ID>' to see a task's output.\n");
    out
}

fn render_snapshot(entries: &[LogEntry], format: ExportFormat) -> anyhow::Result<String> {
    Ok(match format {
        ExportFormat::Text => entries
            .iter()
            .map(LogEntry::format_line)
            .collect::<Vec<_>>()
            .join("\n"),
        ExportFormat::Json => serde_json::to_string_pretty(entries)?,
    })
}

fn render_report(report: &RecoveryReport) -> String {
    let mut out = String::new();
    if report.read_failed {
        out.push_str("Warning: stored task data was unreadable and has been reset\n");
    }
    if report.zombies_discarded.is_empty() {
        out.push_str("No stale background tasks.\n");
    } else {
        out.push_str(&format!(
            "Discarded {} stale background task(s):\n",
            report.zombies_discarded.len()
        ));
        for id in &report.zombies_discarded {
            out.push_str(&format!("  {}\n", id));
        }
    }
    out
}

/// Truncate a string for display
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scriptdeck_foundation::JsonStore;
    use scriptdeck_task::{ExecutionId, LogLevel, ScriptDescriptor, TaskInstanceId, TaskStatus};
    use tempfile::TempDir;

    fn task(id: &str) -> PersistedTask {
        PersistedTask {
            task_instance_id: TaskInstanceId::new(id),
            execution_id: Some(ExecutionId::new("e1")),
            script: ScriptDescriptor::new("daily-claim"),
            started_at: Utc::now(),
            status: TaskStatus::Backgrounded,
            log_snapshot: vec![LogEntry {
                id: 7,
                execution_id: ExecutionId::new("e1"),
                level: LogLevel::Warning,
                message: "gas spike".to_string(),
                timestamp: Utc::now(),
                metadata: None,
            }],
        }
    }

    #[test]
    fn test_render_tasks() {
        assert_eq!(render_tasks(&[]), "No background tasks.\n");

        let out = render_tasks(&[task("a-very-long-task-identifier")]);
        assert!(out.contains("daily-claim"));
        assert!(out.contains("a-very-lo..."));
    }

    #[test]
    fn test_render_snapshot() {
        let entries = task("a").log_snapshot;
        let text = render_snapshot(&entries, ExportFormat::Text).unwrap();
        assert!(text.contains("[WARNING] gas spike"));

        let json = render_snapshot(&entries, ExportFormat::Json).unwrap();
        assert!(json.contains("\"executionId\""));
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("가나다라마바사", 5), "가나...");
    }

    #[test]
    fn test_render_report() {
        let report = RecoveryReport {
            process_restart: true,
            zombies_discarded: vec![TaskInstanceId::new("t1")],
            ..Default::default()
        };
        let out = render_report(&report);
        assert!(out.contains("Discarded 1"));
        assert!(out.contains("t1"));
    }

    #[tokio::test]
    async fn test_purge_discards_persisted() {
        let dir = TempDir::new().unwrap();
        let persistence = FilePersistence::new(JsonStore::new(dir.path()), "tasks.json");
        persistence.write_all(&[task("a"), task("b")]).unwrap();
        let check = persistence.clone();

        purge(&ScriptdeckConfig::new(), persistence).await.unwrap();

        assert!(check.read_all().unwrap().is_empty());
        check.marker().clear();
    }
}
