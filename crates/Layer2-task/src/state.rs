//! Task state machine

use serde::{Deserialize, Serialize};

/// Possible states of a task instance
///
/// ```text
///   register ──▶ Running ◀──── restore ───┐
///                  │                      │
///                  ├── move_to_background ▶ Backgrounded
///                  │                      │
///                  └──── stop / complete ─┴──▶ Stopped | Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Attached to the foreground view
    Running,

    /// Detached from the foreground, still tracked
    Backgrounded,

    /// Explicitly stopped
    Stopped,

    /// Finished on its own
    Completed,
}

impl TaskStatus {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Stopped | TaskStatus::Completed)
    }

    /// Running or backgrounded
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_backgrounded(&self) -> bool {
        matches!(self, TaskStatus::Backgrounded)
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Running => "Running",
            TaskStatus::Backgrounded => "Backgrounded",
            TaskStatus::Stopped => "Stopped",
            TaskStatus::Completed => "Completed",
        }
    }

    /// Get a symbol for the state (for the task panel)
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Running => "⟳",
            TaskStatus::Backgrounded => "◎",
            TaskStatus::Stopped => "⊘",
            TaskStatus::Completed => "✓",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Backgrounded.is_terminal());
        assert!(TaskStatus::Stopped.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Backgrounded.is_live());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Backgrounded).unwrap();
        assert_eq!(json, "\"backgrounded\"");
        let status: TaskStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(status, TaskStatus::Running);
    }
}
