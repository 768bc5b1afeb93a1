//! Structured error types for the dispatch engine.

use thiserror::Error;

use crate::types::{IncidentStatus, ResponderId};

#[derive(Debug, Error)]
pub enum EngineError {
  /// Unknown incident/responder/assignment ID. Surfaced to the caller, no retry.
  #[error("not found: {kind} {id}")]
  NotFound { kind: &'static str, id: String },

  /// Illegal incident status change. The incident is left unchanged.
  #[error("invalid transition: {from} -> {to}")]
  InvalidTransition {
    from: IncidentStatus,
    to: IncidentStatus,
  },

  /// Illegal assignment status change. The assignment is left unchanged.
  #[error("invalid assignment transition: {from} -> {to}")]
  InvalidAssignmentTransition { from: String, to: String },

  /// Auto dispatch could not satisfy the requested count within the radius.
  #[error("no eligible responders: requested {requested}, found {found}")]
  NoEligibleResponders { requested: usize, found: usize },

  /// A manually specified responder fails the eligibility filter.
  #[error("responder not eligible: {0}")]
  ResponderNotEligible(ResponderId),

  /// Invariant violation (a real incident always has created_at). Fatal.
  #[error("missing timestamp: {0}")]
  MissingTimestamp(&'static str),

  /// External scorer failed or timed out. Recovered locally; the incident
  /// proceeds without AI input.
  #[error("analysis failure: {0}")]
  AnalysisFailure(String),

  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl EngineError {
  pub fn incident_not_found(id: impl Into<String>) -> Self {
    Self::NotFound {
      kind: "incident",
      id: id.into(),
    }
  }

  pub fn responder_not_found(id: impl Into<String>) -> Self {
    Self::NotFound {
      kind: "responder",
      id: id.into(),
    }
  }

  pub fn assignment_not_found(id: impl Into<String>) -> Self {
    Self::NotFound {
      kind: "assignment",
      id: id.into(),
    }
  }

  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}
