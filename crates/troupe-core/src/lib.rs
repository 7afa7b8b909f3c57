//! Core types shared across the Troupe workspace.
//!
//! Troupe coordinates a team of role-specialized model workers against a
//! single user request. This crate holds the foundations every other crate
//! builds on: the unified error enum, the closed [`AgentRole`] set with its
//! stable wire codes, and the supervisor plan data model.
//!
//! # Main types
//!
//! - [`TroupeError`] — Unified error enum for all Troupe subsystems.
//! - [`TroupeResult`] — Convenience alias for `Result<T, TroupeError>`.
//! - [`AgentRole`] — The six worker roles with stable integer codes.
//! - [`plan::SupervisorPlan`] — The parsed plan a run executes.
//! - [`RunContext`] — Explicit per-run context threaded through every call.

/// Supervisor plan data model and JSON parsing.
pub mod plan;
/// The closed agent-role set and its code mapping.
pub mod role;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use plan::{
    ExecutionMode, ExecutionStrategy, MessageHandling, SupervisorPlan, Task, TaskInputs,
    TaskStatus,
};
pub use role::AgentRole;

// --- Error types ---

/// Top-level error type for the Troupe workspace.
///
/// Plan and graph variants are fatal to a run and surface before any task is
/// dispatched; task-level variants are caught at the task boundary and never
/// unwind a whole run.
#[derive(Debug, thiserror::Error)]
pub enum TroupeError {
    /// The supervisor's plan text was malformed or incomplete.
    #[error("plan parse error: {0}")]
    PlanParse(String),

    /// The task list contains a dependency cycle.
    #[error("cyclic dependency involving task '{0}'")]
    CyclicDependency(String),

    /// A `fromTask` reference points at a task id that does not exist.
    #[error("task '{task}' references unknown task '{reference}'")]
    UnknownReference {
        /// The task declaring the reference.
        task: String,
        /// The id that failed to resolve.
        reference: String,
    },

    /// The response stream neither completed nor errored within the deadline.
    #[error("response collection timed out after {0:?}")]
    CollectorTimeout(std::time::Duration),

    /// A single task failed; isolated to the task and its dependents.
    #[error("task execution error: {0}")]
    TaskExecution(String),

    /// An integer role code outside the six defined values.
    #[error("unknown agent role code {0}")]
    UnknownRole(u8),

    /// No worker capability registered for the given role/agent pair.
    #[error("no worker registered for role '{role}' and agent '{agent_id}'")]
    WorkerUnavailable {
        /// The role the task asked for.
        role: String,
        /// The concrete agent instance id.
        agent_id: String,
    },

    /// An error in configuration parsing or validation.
    #[error("config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`TroupeError`].
pub type TroupeResult<T> = Result<T, TroupeError>;

// --- Run context ---

/// Explicit per-run context, threaded through every call that needs it.
///
/// Replaces any ambient/thread-local state: the run id and caller identity
/// travel as a plain value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique id for this run.
    pub run_id: Uuid,
    /// Identity of the caller that started the run.
    pub caller: String,
    /// UTC time the run was started.
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Creates a context with a fresh run id.
    pub fn new(caller: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            caller: caller.into(),
            started_at: Utc::now(),
        }
    }
}

// --- Token accounting ---

/// Token usage reported by a model's completion event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens produced in the response.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Total tokens across input and output.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_context_fresh_ids() {
        let a = RunContext::new("cli");
        let b = RunContext::new("cli");
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.caller, "cli");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 120,
            output_tokens: 80,
        };
        assert_eq!(usage.total(), 200);
    }

    #[test]
    fn test_error_display() {
        let err = TroupeError::UnknownReference {
            task: "T2".into(),
            reference: "T9".into(),
        };
        assert_eq!(err.to_string(), "task 'T2' references unknown task 'T9'");

        let err = TroupeError::UnknownRole(7);
        assert!(err.to_string().contains('7'));
    }
}
