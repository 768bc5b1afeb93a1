//! Engine events and the fire-and-forget collaborator seams.
//!
//! Delivery is best-effort: a notifier or broadcaster failure must never fail
//! the primary state change, so these traits cannot return errors.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{
  Assignment, AssignmentId, AssignmentStatus, Incident, IncidentId, IncidentStatus, ResponderId,
  Severity,
};

/// Everything the engine reports outward. Audit logging is a collaborator's
/// job; the engine only emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
  IncidentAlert {
    incident_id: IncidentId,
    code: String,
    severity: Severity,
  },
  StatusChange {
    incident_id: IncidentId,
    from: IncidentStatus,
    to: IncidentStatus,
    actor: String,
  },
  Escalation {
    incident_id: IncidentId,
    level: u32,
    severity: Severity,
    reason: String,
  },
  HighThreatAlert {
    incident_id: IncidentId,
    confidence: f64,
    summary: String,
  },
  AnalysisError {
    incident_id: IncidentId,
    message: String,
  },
  AssignmentCreated {
    assignment_id: AssignmentId,
    incident_id: IncidentId,
    responder_id: ResponderId,
  },
  AssignmentUpdated {
    assignment_id: AssignmentId,
    status: AssignmentStatus,
  },
}

/// Fire-and-forget event delivery (push notifications, audit collectors).
pub trait Notifier: Send + Sync {
  fn notify(&self, event: &EngineEvent);
}

/// Side channel publishing entity snapshots to interested subscribers.
pub trait Broadcaster: Send + Sync {
  fn broadcast_incident(&self, incident: &Incident);
  fn broadcast_assignment(&self, assignment: &Assignment);
}

/// Default notifier: structured log lines via tracing.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn notify(&self, event: &EngineEvent) {
    match event {
      EngineEvent::HighThreatAlert {
        incident_id,
        confidence,
        ..
      } => warn!(%incident_id, confidence, "high threat alert"),
      EngineEvent::AnalysisError {
        incident_id,
        message,
      } => warn!(%incident_id, %message, "analysis error"),
      other => info!(?other, "engine event"),
    }
  }
}

/// Default broadcaster: log-only stand-in for the real-time channel.
#[derive(Debug, Default)]
pub struct LogBroadcaster;

impl Broadcaster for LogBroadcaster {
  fn broadcast_incident(&self, incident: &Incident) {
    info!(incident_id = %incident.id, status = %incident.status, "incident snapshot");
  }

  fn broadcast_assignment(&self, assignment: &Assignment) {
    info!(assignment_id = %assignment.id, status = %assignment.status, "assignment snapshot");
  }
}
