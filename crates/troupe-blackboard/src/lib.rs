//! Run-scoped shared state for Troupe tasks.
//!
//! Every run gets exactly one [`Blackboard`]: a concurrent key/value store
//! tasks pass intermediate values through, plus an append-only, sequence-
//! numbered message log auditing every role's activity. The board lives for
//! the run and is dropped with it — nothing leaks across runs.
//!
//! Entry access is fine-grained (sharded map), so independent concurrent
//! tasks never serialize on unrelated keys.

/// The blackboard store and message log.
pub mod board;
/// Durable JSONL audit sink.
pub mod sink;

pub use board::{Blackboard, BoardMessage};
pub use sink::FileAuditSink;
