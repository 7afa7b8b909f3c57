use std::collections::HashMap;
use troupe_core::{Task, TaskStatus};

/// Per-task status report in a [`RunReport`](crate::engine::RunReport).
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskReport {
    /// Task id.
    pub id: String,
    /// Task title from the plan.
    pub title: String,
    /// Terminal status the task reached.
    pub status: TaskStatus,
    /// Failure reason, when the task ended Failed.
    pub error: Option<String>,
}

/// Status bookkeeping for one run's tasks.
///
/// Tracks every task's lifecycle state and failure reason. The engine holds
/// this behind a `tokio::sync::RwLock`; transitions happen under the write
/// lock so a dispatch decision never observes a half-applied change.
pub struct RunState {
    statuses: HashMap<String, TaskStatus>,
    errors: HashMap<String, String>,
}

impl RunState {
    /// Initialize with every task Pending.
    pub fn new(tasks: &[Task]) -> Self {
        Self {
            statuses: tasks
                .iter()
                .map(|t| (t.id.clone(), TaskStatus::Pending))
                .collect(),
            errors: HashMap::new(),
        }
    }

    /// Current status of a task.
    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        self.statuses.get(id).copied()
    }

    /// Whether a task ended Completed.
    pub fn is_completed(&self, id: &str) -> bool {
        self.status(id) == Some(TaskStatus::Completed)
    }

    /// Pending → Running.
    pub fn mark_running(&mut self, id: &str) {
        self.set(id, TaskStatus::Running);
    }

    /// Running → Completed.
    pub fn mark_completed(&mut self, id: &str) {
        self.set(id, TaskStatus::Completed);
    }

    /// Running → Failed, with the reason.
    pub fn mark_failed(&mut self, id: &str, reason: impl Into<String>) {
        self.errors.insert(id.to_string(), reason.into());
        self.set(id, TaskStatus::Failed);
    }

    /// Pending → Skipped (a dependency ended Failed or Skipped).
    pub fn mark_skipped(&mut self, id: &str) {
        self.set(id, TaskStatus::Skipped);
    }

    /// Pending/Running → Cancelled.
    pub fn mark_cancelled(&mut self, id: &str) {
        self.set(id, TaskStatus::Cancelled);
    }

    fn set(&mut self, id: &str, status: TaskStatus) {
        if let Some(entry) = self.statuses.get_mut(id) {
            *entry = status;
        }
    }

    /// Count of tasks in the given status.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.statuses.values().filter(|&&s| s == status).count()
    }

    /// Whether every task reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.statuses.values().all(|s| s.is_terminal())
    }

    /// Per-task reports in the given plan order.
    pub fn reports(&self, tasks: &[Task]) -> Vec<TaskReport> {
        tasks
            .iter()
            .map(|t| TaskReport {
                id: t.id.clone(),
                title: t.title.clone(),
                status: self.status(&t.id).unwrap_or(TaskStatus::Pending),
                error: self.errors.get(&t.id).cloned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_core::{ExecutionStrategy, TaskInputs};

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            agent_id: "w".to_string(),
            status: TaskStatus::Pending,
            order: 1,
            inputs: TaskInputs::default(),
            outputs: Vec::new(),
            execution_strategy: ExecutionStrategy::Silent,
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let tasks = vec![task("A"), task("B")];
        let mut state = RunState::new(&tasks);
        assert_eq!(state.status("A"), Some(TaskStatus::Pending));
        assert!(!state.all_terminal());

        state.mark_running("A");
        assert_eq!(state.status("A"), Some(TaskStatus::Running));
        state.mark_completed("A");
        assert!(state.is_completed("A"));

        state.mark_running("B");
        state.mark_failed("B", "worker gone");
        assert_eq!(state.status("B"), Some(TaskStatus::Failed));
        assert!(state.all_terminal());

        let reports = state.reports(&tasks);
        assert_eq!(reports[1].error.as_deref(), Some("worker gone"));
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let mut state = RunState::new(&[task("A")]);
        state.mark_completed("nope");
        assert_eq!(state.status("nope"), None);
        assert_eq!(state.status("A"), Some(TaskStatus::Pending));
    }

    #[test]
    fn test_counts() {
        let tasks = vec![task("A"), task("B"), task("C")];
        let mut state = RunState::new(&tasks);
        state.mark_running("A");
        state.mark_completed("A");
        state.mark_skipped("B");
        assert_eq!(state.count(TaskStatus::Completed), 1);
        assert_eq!(state.count(TaskStatus::Skipped), 1);
        assert_eq!(state.count(TaskStatus::Pending), 1);
    }
}
