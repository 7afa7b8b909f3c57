//! The abstract "streaming responder" capability and its collector.
//!
//! Troupe never talks to a model provider directly; workers are handed in as
//! [`StreamingResponder`] implementations that produce partial-text events,
//! a usage-annotated completion, and an error channel. The
//! [`ResponseCollector`] turns that stream into one discrete value under a
//! hard time budget, degrading to the partial text instead of failing when
//! the deadline elapses.
//!
//! # Main types
//!
//! - [`StreamEvent`] — Events emitted during a streaming response.
//! - [`StreamingResponder`] — The capability trait workers implement.
//! - [`ResponseHandle`] — A cancellable in-flight response.
//! - [`ResponseCollector`] — Stream → [`Collected`] under a deadline.
//! - [`ScriptedResponder`] — Deterministic responder for tests and demos.

/// Stream-to-value collection under a deadline.
pub mod collector;
/// The streaming responder trait and response handle.
pub mod responder;
/// Deterministic scripted responder.
pub mod script;
/// Streaming event model.
pub mod stream;

pub use collector::{Collected, ResponseCollector, DEFAULT_DEADLINE};
pub use responder::{ResponseHandle, StreamingResponder};
pub use script::ScriptedResponder;
pub use stream::StreamEvent;
