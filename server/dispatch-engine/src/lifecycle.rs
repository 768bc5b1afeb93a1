//! Incident state machine: status transitions, verification, escalation,
//! resolution timing.
//!
//! All functions mutate the incident only after validation succeeds; on any
//! error the incident is exactly as before the call.

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::types::{Incident, IncidentStatus, Severity};

/// Whether `from -> to` is in the allowed transition set.
///
/// REPORTED -> VERIFIED | FALSE_ALARM
/// VERIFIED -> ASSIGNED | FALSE_ALARM
/// ASSIGNED -> IN_PROGRESS
/// IN_PROGRESS -> RESOLVED
/// RESOLVED -> CLOSED
pub fn is_valid_transition(from: IncidentStatus, to: IncidentStatus) -> bool {
  use IncidentStatus::*;
  matches!(
    (from, to),
    (Reported, Verified)
      | (Reported, FalseAlarm)
      | (Verified, Assigned)
      | (Verified, FalseAlarm)
      | (Assigned, InProgress)
      | (InProgress, Resolved)
      | (Resolved, Closed)
  )
}

/// Apply a status transition at time `now`.
///
/// Entering Resolved stamps `resolved_at` and computes the actual response
/// time (seconds since creation, non-negative). FalseAlarm also stamps
/// `resolved_at` so terminal incidents always carry a resolution time.
pub fn transition(
  incident: &mut Incident,
  to: IncidentStatus,
  now: DateTime<Utc>,
) -> Result<(), EngineError> {
  let from = incident.status;
  if !is_valid_transition(from, to) {
    return Err(EngineError::InvalidTransition { from, to });
  }

  if to == IncidentStatus::Resolved {
    // actual_response_secs is set exactly once, here.
    let secs = now.signed_duration_since(incident.created_at).num_seconds();
    if secs < 0 {
      return Err(EngineError::MissingTimestamp("created_at after resolved_at"));
    }
    incident.resolved_at = Some(now);
    incident.actual_response_secs = Some(secs as u32);
  } else if to == IncidentStatus::FalseAlarm {
    incident.resolved_at = Some(now);
  }

  incident.status = to;
  incident.updated_at = now;
  Ok(())
}

/// Mark the incident verified. Forces status to Verified only from Reported;
/// in any other state the flag is set and the status is left alone.
pub fn verify(incident: &mut Incident, now: DateTime<Utc>) {
  incident.is_verified = true;
  if incident.status == IncidentStatus::Reported {
    incident.status = IncidentStatus::Verified;
  }
  incident.updated_at = now;
}

/// Escalate by exactly one level.
///
/// Raises severity one step (Critical is a ceiling) and sets the sticky
/// critical flag once severity reaches Critical. The level keeps incrementing
/// past the severity ceiling.
pub fn escalate(incident: &mut Incident, now: DateTime<Utc>) {
  incident.escalation_level += 1;
  incident.severity = incident.severity.escalated();
  if incident.severity == Severity::Critical {
    incident.is_critical = true;
  }
  incident.updated_at = now;
}
