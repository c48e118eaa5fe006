//! Task types.

use crate::marketplace::TaskKind;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique task IDs.
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a scheduled task.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, serde::Serialize)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn generate() -> Self {
        Self(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{:06}", self.0)
    }
}

/// The unit scheduled, prioritized, retried, and tracked by the scheduler.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    /// Name of the marketplace adapter the task routes to.
    pub marketplace: String,
    /// The operation to perform.
    pub kind: TaskKind,
    /// Opaque operation parameters, passed through to the adapter.
    pub params: Value,
    /// Dequeue priority; higher runs first.
    pub priority: u8,
    /// Retries consumed so far.
    pub retries: u32,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new task with a fresh id.
    pub fn new(
        marketplace: impl Into<String>,
        kind: TaskKind,
        params: Value,
        priority: u8,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            marketplace: marketplace.into(),
            kind,
            params,
            priority,
            retries: 0,
            created_at: Utc::now(),
        }
    }
}

/// Record of a terminally failed or abandoned task.
#[derive(Debug, Clone)]
pub struct FailedTask {
    pub task: Task,
    /// Condition tag of the error that ended the task.
    pub condition: &'static str,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::new("takealot", TaskKind::Search, json!({}), 5);
        let b = Task::new("takealot", TaskKind::Search, json!({}), 5);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_new_task_has_no_retries() {
        let task = Task::new("takealot", TaskKind::Product, json!({"plid": 1}), 5);
        assert_eq!(task.retries, 0);
        assert_eq!(task.priority, 5);
    }
}
