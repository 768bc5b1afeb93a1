//! Dispatch matcher: eligibility filtering, deterministic nearest-first
//! ranking, and the assignment state machine.
//!
//! Selection here is pure planning over snapshots; the engine commits the
//! resulting plan under its locking discipline (all-or-nothing).

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::geo::GeoIndex;
use crate::types::{
  Assignment, AssignmentId, AssignmentStatus, DispatchRequest, Incident, Priority, Responder,
  ResponderId,
};

/// Select the responders a dispatch request resolves to, in commit order.
///
/// Manual mode keeps the operator's order but every ID must individually pass
/// the eligibility filter. Auto mode ranks eligible responders of the
/// requested type by ascending distance (ties by ascending ID) and takes the
/// requested count. Fails without partial results: either a full selection is
/// returned or an error.
pub fn select_responders(
  incident: &Incident,
  request: &DispatchRequest,
  responders: &HashMap<ResponderId, Responder>,
  geo: &GeoIndex,
) -> Result<Vec<ResponderId>, EngineError> {
  match request {
    DispatchRequest::Manual { responder_ids } => {
      if responder_ids.is_empty() {
        return Err(EngineError::validation("responder_ids", "must not be empty"));
      }
      for id in responder_ids {
        let responder = responders
          .get(id)
          .ok_or_else(|| EngineError::responder_not_found(id.0.clone()))?;
        if !responder.is_eligible() {
          return Err(EngineError::ResponderNotEligible(id.clone()));
        }
      }
      Ok(responder_ids.clone())
    }
    DispatchRequest::Auto {
      responder_type,
      count,
      radius_km,
    } => {
      let count = (*count).max(1);
      let origin = incident
        .location
        .ok_or_else(|| EngineError::validation("location", "auto dispatch requires a location"))?;

      let ranked = geo.nearest(origin, Some(*responder_type), *radius_km, usize::MAX);
      let eligible: Vec<ResponderId> = ranked
        .into_iter()
        .filter(|c| {
          responders
            .get(&c.responder_id)
            .map_or(false, Responder::is_eligible)
        })
        .map(|c| c.responder_id)
        .collect();

      if eligible.len() < count {
        return Err(EngineError::NoEligibleResponders {
          requested: count,
          found: eligible.len(),
        });
      }
      Ok(eligible.into_iter().take(count).collect())
    }
  }
}

/// Build a new assignment for a committed match.
pub fn new_assignment(
  id: AssignmentId,
  incident: &Incident,
  responder_id: ResponderId,
  assigned_by: &str,
  now: DateTime<Utc>,
) -> Assignment {
  Assignment {
    id,
    incident_id: incident.id.clone(),
    responder_id,
    status: AssignmentStatus::Assigned,
    priority: Priority::from_severity(incident.severity),
    assigned_by: assigned_by.to_string(),
    assigned_at: now,
    estimated_arrival: None,
    actual_arrival: None,
    completed_at: None,
    notes: None,
  }
}

/// Apply an assignment status transition.
///
/// Forward moves follow the strict order Assigned -> Acknowledged -> EnRoute
/// -> Arrived -> Completed; Cancelled is reachable from any non-terminal
/// state. On error the assignment is unchanged.
pub fn transition_assignment(
  assignment: &mut Assignment,
  to: AssignmentStatus,
  now: DateTime<Utc>,
) -> Result<(), EngineError> {
  let from = assignment.status;
  let allowed = match to {
    AssignmentStatus::Cancelled => !from.is_terminal(),
    _ => from.successor() == Some(to),
  };
  if !allowed {
    return Err(EngineError::InvalidAssignmentTransition {
      from: from.to_string(),
      to: to.to_string(),
    });
  }

  match to {
    AssignmentStatus::Arrived => assignment.actual_arrival = Some(now),
    AssignmentStatus::Completed | AssignmentStatus::Cancelled => {
      assignment.completed_at = Some(now)
    }
    _ => {}
  }
  assignment.status = to;
  Ok(())
}
