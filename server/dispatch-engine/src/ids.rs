//! ID generation service.
//!
//! Uniqueness contract: opaque IDs are UUIDv4 (random, collision probability
//! negligible process-wide and across restarts); human-readable incident
//! codes embed the year plus 8 hex chars of the same randomness, so they are
//! unique with the same contract. No ambient static state.

use chrono::{Datelike, Utc};
use uuid::Uuid;

use crate::types::{AssignmentId, IncidentId, ResponderId};

#[derive(Debug, Clone, Default)]
pub struct IdGenerator;

impl IdGenerator {
  pub fn new() -> Self {
    Self
  }

  /// Opaque incident ID plus its human-readable code ("INC-<year>-<HEX8>").
  pub fn incident(&self) -> (IncidentId, String) {
    let uuid = Uuid::new_v4();
    let simple = uuid.simple().to_string();
    let code = format!(
      "INC-{}-{}",
      Utc::now().year(),
      simple[..8].to_ascii_uppercase()
    );
    (IncidentId(uuid.to_string()), code)
  }

  pub fn assignment(&self) -> AssignmentId {
    AssignmentId(format!("asg-{}", Uuid::new_v4().simple()))
  }

  pub fn responder(&self) -> ResponderId {
    ResponderId(format!("rsp-{}", Uuid::new_v4().simple()))
  }
}
