//! Incident Lifecycle & Responder Dispatch Engine.
//!
//! Tracks emergency incidents from report to resolution and matches them to
//! field responders: a strict incident state machine, severity-driven SLA
//! targets, automatic escalation of stale incidents, deterministic
//! nearest-responder dispatch over a geo index, and an async threat-scoring
//! boundary with a strict-parse-or-keyword-fallback contract.
//!
//! Storage, HTTP, auth, and delivery transports are external collaborators;
//! the engine keeps its working set in memory and emits events.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod ids;
pub mod lifecycle;
pub mod scoring;
pub mod sla;
pub mod stats;
pub mod sweeper;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::EngineConfig;
pub use engine::DispatchEngine;
pub use error::EngineError;
pub use events::{Broadcaster, EngineEvent, Notifier};
pub use scoring::ThreatScorer;
pub use types::{Assignment, DispatchRequest, Incident, Responder};
