//! The supervisor session loop.
//!
//! One [`SupervisorSession`] ties a run together: it collects the
//! supervisor's streamed plan, parses and validates it, creates the
//! run-scoped blackboard, and hands everything to the scheduling engine.
//! User messages arriving mid-run go through the session's
//! [`MessageInbox`](troupe_orchestrator::MessageInbox) and are handled per
//! the plan's message policy.

/// The session loop.
pub mod session;

pub use session::{SessionOutcome, SupervisorSession};
