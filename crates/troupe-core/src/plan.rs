use crate::{TroupeError, TroupeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Plan-wide scheduling mode for a run's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionMode {
    /// All tasks form one batch; independent tasks run concurrently.
    Parallel,
    /// Tasks run one at a time, ordered by `order` ascending.
    Serial,
    /// Tasks are grouped by `order`; groups run sequentially, members
    /// concurrently.
    Hybrid,
}

/// Per-task choice between state-only and user-visible output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStrategy {
    /// Result goes to the blackboard only, never directly to the user.
    Silent,
    /// Output is forwarded to the run's live channel as it is produced.
    Streaming,
}

/// Policy for user messages that arrive while a run's tasks are executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageHandling {
    /// Queue and fold into the next step/group input context.
    Auto,
    /// Log as discarded; no effect on the running plan.
    Ignore,
}

/// Lifecycle state of a task within one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Not yet dispatched.
    #[default]
    Pending,
    /// Dispatched; all dependencies were Completed at dispatch time.
    Running,
    /// Finished with a result on the blackboard.
    Completed,
    /// Failed; dependents will be skipped.
    Failed,
    /// Never ran because a dependency ended Failed or Skipped.
    Skipped,
    /// Terminated by run cancellation.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (the task will never run again).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled
        )
    }
}

/// Declared inputs of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInputs {
    /// Whether the original user message is part of this task's input.
    #[serde(default)]
    pub from_user: bool,
    /// Ids of tasks whose outputs feed this task.
    #[serde(default)]
    pub from_task: Vec<String>,
    /// Named fields selected from those sources.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// One unit of work inside a supervisor plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique id within one run.
    pub id: String,
    /// Short human-readable title.
    pub title: String,
    /// Full instruction handed to the worker.
    pub description: String,
    /// The concrete worker instance that executes this task. Distinct from
    /// the worker's role.
    pub agent_id: String,
    /// Lifecycle state; plans normally arrive with every task Pending.
    #[serde(default)]
    pub status: TaskStatus,
    /// Sequencing key for SERIAL and HYBRID modes. Values need not be
    /// contiguous; ties break by list position.
    pub order: i32,
    /// Declared inputs.
    #[serde(default)]
    pub inputs: TaskInputs,
    /// Named fields this task is expected to produce.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Silent or streaming output.
    pub execution_strategy: ExecutionStrategy,
}

/// The structured plan a supervisor produces for one run.
///
/// Task insertion order is plan order and is preserved; it is independent of
/// the per-task `order` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorPlan {
    /// When false the run terminates after emitting `greeting`; no task runs.
    pub should_proceed: bool,
    /// Plan-wide scheduling mode.
    pub execution_mode: ExecutionMode,
    /// Shown to the user before execution begins.
    #[serde(default)]
    pub greeting: String,
    /// Policy for mid-run user messages.
    pub message_handling: MessageHandling,
    /// Ordered task list.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl SupervisorPlan {
    /// Parse a plan from the supervisor's complete response text.
    ///
    /// Model output routinely wraps the JSON object in prose or a fenced
    /// code block, so parsing starts at the first `{` and ends at the last
    /// `}` of the text.
    pub fn parse(text: &str) -> TroupeResult<Self> {
        let start = text
            .find('{')
            .ok_or_else(|| TroupeError::PlanParse("no JSON object in plan text".to_string()))?;
        let end = text
            .rfind('}')
            .ok_or_else(|| TroupeError::PlanParse("unterminated JSON object".to_string()))?;
        if end < start {
            return Err(TroupeError::PlanParse(
                "unterminated JSON object".to_string(),
            ));
        }
        serde_json::from_str(&text[start..=end])
            .map_err(|e| TroupeError::PlanParse(e.to_string()))
    }

    /// Structural validation of the task list.
    ///
    /// Checks id uniqueness and that every `fromTask` reference resolves to a
    /// task id appearing *earlier* in the list (forward and self references
    /// are rejected; the graph builder re-validates independently).
    pub fn validate(&self) -> TroupeResult<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(TroupeError::PlanParse(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
            for dep in &task.inputs.from_task {
                if dep == &task.id {
                    return Err(TroupeError::PlanParse(format!(
                        "task '{}' depends on itself",
                        task.id
                    )));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(TroupeError::PlanParse(format!(
                        "task '{}' references '{}' which is not an earlier task",
                        task.id, dep
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}
