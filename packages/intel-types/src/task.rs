use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Which global resource a task type contends for. LLM tasks are
/// serialized behind one lock; IO tasks run in a bounded parallel pool
/// (spec §4.11, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Io,
    Llm,
}

/// The reason recorded on every task found `running` at process startup
/// (spec §3 invariant, §4.11, §8 "Task restart recovery").
pub const RESTART_RECOVERY_REASON: &str = "restarted while running";

/// Progress messages are truncated to this length (supplemented from
/// `original_source`'s `TaskQueueService`, see SPEC_FULL.md §4.11).
pub const MAX_PROGRESS_MESSAGE_LENGTH: usize = 500;

/// A persistent unit of asynchronous work (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: String,
    pub category: TaskCategory,
    pub status: TaskStatus,
    pub priority: i32,
    pub params: Value,
    pub progress: f32,
    pub progress_message: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, category: TaskCategory, priority: i32, params: Value) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            category,
            status: TaskStatus::Pending,
            priority,
            params,
            progress: 0.0,
            progress_message: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Clamps progress to [0,1] and truncates the message, matching the
    /// source's `update_progress` bounds exactly.
    pub fn set_progress(&mut self, fraction: f32, message: Option<String>) {
        self.progress = fraction.clamp(0.0, 1.0);
        self.progress_message = message.map(|m| {
            if m.len() > MAX_PROGRESS_MESSAGE_LENGTH {
                m.chars().take(MAX_PROGRESS_MESSAGE_LENGTH).collect()
            } else {
                m
            }
        });
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: Option<Value>) {
        self.status = TaskStatus::Completed;
        self.result = result;
        self.error = None;
        self.progress = 1.0;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_clamps_and_truncates() {
        let mut task = Task::new("crawl", TaskCategory::Io, 0, Value::Null);
        task.set_progress(1.5, Some("x".repeat(600)));
        assert_eq!(task.progress, 1.0);
        assert_eq!(task.progress_message.unwrap().len(), MAX_PROGRESS_MESSAGE_LENGTH);

        task.set_progress(-0.3, None);
        assert_eq!(task.progress, 0.0);
    }
}
