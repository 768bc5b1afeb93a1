//! Dispatch engine orchestrator: arena stores, locking discipline, and the
//! operations the API layer consumes.
//!
//! Entities live in arena maps keyed by opaque IDs, each entry behind its own
//! mutex. Critical sections are short; an operation holds at most one
//! incident lock and one responder lock at a time, always acquired
//! incident-before-responder. Threat scoring runs as a spawned task whose
//! completion re-enters the incident critical section, so AI-driven merges
//! and manual edits cannot interleave inconsistently.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dispatch;
use crate::error::EngineError;
use crate::events::{Broadcaster, EngineEvent, LogBroadcaster, LogNotifier, Notifier};
use crate::geo::GeoIndex;
use crate::ids::IdGenerator;
use crate::lifecycle;
use crate::scoring::{self, ThreatAssessment, ThreatScorer};
use crate::sla;
use crate::stats;
use crate::types::{
  Assignment, AssignmentId, AssignmentStatus, DispatchRequest, GeoPoint, Incident, IncidentId,
  IncidentStatistics, IncidentStatus, NewIncident, NewResponder, Responder, ResponderId,
  ResponderStatus, Severity,
};

type Arena<K, V> = RwLock<HashMap<K, Arc<Mutex<V>>>>;

pub struct DispatchEngine {
  config: EngineConfig,
  ids: IdGenerator,
  incidents: Arena<IncidentId, Incident>,
  responders: Arena<ResponderId, Responder>,
  assignments: Arena<AssignmentId, Assignment>,
  geo: RwLock<GeoIndex>,
  notifier: Arc<dyn Notifier>,
  broadcaster: Arc<dyn Broadcaster>,
  scorer: Arc<dyn ThreatScorer>,
}

impl DispatchEngine {
  pub fn new(
    config: EngineConfig,
    scorer: Arc<dyn ThreatScorer>,
    notifier: Arc<dyn Notifier>,
    broadcaster: Arc<dyn Broadcaster>,
  ) -> Self {
    Self {
      config,
      ids: IdGenerator::new(),
      incidents: RwLock::new(HashMap::new()),
      responders: RwLock::new(HashMap::new()),
      assignments: RwLock::new(HashMap::new()),
      geo: RwLock::new(GeoIndex::new()),
      notifier,
      broadcaster,
      scorer,
    }
  }

  /// Engine with log-backed collaborators.
  pub fn with_defaults(scorer: Arc<dyn ThreatScorer>) -> Self {
    Self::new(
      EngineConfig::default(),
      scorer,
      Arc::new(LogNotifier),
      Arc::new(LogBroadcaster),
    )
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  // -------------------------------------------------------------------------
  // Incident operations
  // -------------------------------------------------------------------------

  /// Create an incident, fix its SLA target, and kick off threat scoring.
  ///
  /// Returns before the external scorer completes; its result (or failure)
  /// is merged by a spawned task that re-enters the incident critical
  /// section.
  pub async fn create_incident(self: &Arc<Self>, new: NewIncident) -> Incident {
    let now = Utc::now();
    let (id, code) = self.ids.incident();
    let incident = Incident {
      id: id.clone(),
      code: code.clone(),
      title: new.title,
      description: new.description,
      incident_type: new.incident_type,
      severity: new.severity,
      status: IncidentStatus::Reported,
      location: new.location,
      location_address: new.location_address,
      reporter_name: new.reporter_name,
      reporter_contact: new.reporter_contact,
      ai_confidence: None,
      ai_analysis: None,
      safety_recommendations: None,
      escalation_level: 0,
      is_critical: new.severity == Severity::Critical,
      is_verified: false,
      sla_target_secs: sla::response_target_secs(new.severity),
      actual_response_secs: None,
      high_threat_notified: false,
      created_at: now,
      updated_at: now,
      resolved_at: None,
    };

    self
      .incidents
      .write()
      .await
      .insert(id.clone(), Arc::new(Mutex::new(incident.clone())));
    info!(incident_id = %id, %code, severity = ?incident.severity, "incident created");

    self.notifier.notify(&EngineEvent::IncidentAlert {
      incident_id: id.clone(),
      code,
      severity: incident.severity,
    });
    self.broadcaster.broadcast_incident(&incident);

    let content = format!("{}\n{}", incident.title, incident.description);
    let engine = Arc::clone(self);
    tokio::spawn(async move {
      engine.run_analysis(id, content).await;
    });

    incident
  }

  /// Bounded scorer call; the result re-enters the incident critical section.
  async fn run_analysis(&self, incident_id: IncidentId, content: String) {
    let result =
      tokio::time::timeout(self.config.scorer_timeout, self.scorer.score(&content)).await;

    match result {
      Ok(Ok(reply)) => {
        let assessment = scoring::parse_reply(&reply);
        debug!(incident_id = %incident_id, confidence = assessment.confidence,
               degraded = assessment.degraded, "analysis result");
        if let Err(e) = self.apply_assessment(&incident_id, &assessment).await {
          warn!(incident_id = %incident_id, error = %e, "failed to merge analysis");
        }
      }
      Ok(Err(e)) => self.emit_analysis_error(&incident_id, e.to_string()),
      Err(_) => self.emit_analysis_error(&incident_id, "scorer timed out".to_string()),
    }
  }

  fn emit_analysis_error(&self, incident_id: &IncidentId, message: String) {
    warn!(incident_id = %incident_id, %message, "analysis failure");
    self.notifier.notify(&EngineEvent::AnalysisError {
      incident_id: incident_id.clone(),
      message,
    });
  }

  /// Merge a threat assessment into the incident. Safe under duplicate or
  /// late delivery: last score wins, an already-higher escalation is never
  /// rolled back, and the high-threat alert fires at most once per upward
  /// crossing of the threshold.
  pub async fn apply_assessment(
    &self,
    incident_id: &IncidentId,
    assessment: &ThreatAssessment,
  ) -> Result<Incident, EngineError> {
    let handle = self.incident_handle(incident_id).await?;
    let mut incident = handle.lock().await;
    let outcome = scoring::merge_assessment(
      &mut incident,
      assessment,
      self.config.ai_confidence_threshold,
      Utc::now(),
    );
    let snapshot = incident.clone();
    drop(incident);

    if outcome.high_threat_crossed {
      self.notifier.notify(&EngineEvent::HighThreatAlert {
        incident_id: incident_id.clone(),
        confidence: assessment.confidence,
        summary: assessment.summary.clone(),
      });
    }
    self.broadcaster.broadcast_incident(&snapshot);
    Ok(snapshot)
  }

  /// Apply an incident status transition. On failure the incident is left
  /// exactly as before.
  pub async fn update_status(
    &self,
    incident_id: &IncidentId,
    to: IncidentStatus,
    actor: &str,
  ) -> Result<Incident, EngineError> {
    let handle = self.incident_handle(incident_id).await?;
    let mut incident = handle.lock().await;
    let from = incident.status;
    lifecycle::transition(&mut incident, to, Utc::now())?;
    let snapshot = incident.clone();
    drop(incident);

    info!(incident_id = %incident_id, %from, %to, actor, "status change");
    self.notifier.notify(&EngineEvent::StatusChange {
      incident_id: incident_id.clone(),
      from,
      to,
      actor: actor.to_string(),
    });
    self.broadcaster.broadcast_incident(&snapshot);
    Ok(snapshot)
  }

  /// Mark the incident verified (forces Verified status only from Reported).
  pub async fn verify(
    &self,
    incident_id: &IncidentId,
    actor: &str,
  ) -> Result<Incident, EngineError> {
    let handle = self.incident_handle(incident_id).await?;
    let mut incident = handle.lock().await;
    let from = incident.status;
    lifecycle::verify(&mut incident, Utc::now());
    let snapshot = incident.clone();
    drop(incident);

    if from != snapshot.status {
      self.notifier.notify(&EngineEvent::StatusChange {
        incident_id: incident_id.clone(),
        from,
        to: snapshot.status,
        actor: actor.to_string(),
      });
    }
    self.broadcaster.broadcast_incident(&snapshot);
    Ok(snapshot)
  }

  /// Escalate by one level (manual path; no eligibility precondition).
  pub async fn escalate(
    &self,
    incident_id: &IncidentId,
    reason: &str,
  ) -> Result<Incident, EngineError> {
    let handle = self.incident_handle(incident_id).await?;
    let mut incident = handle.lock().await;
    lifecycle::escalate(&mut incident, Utc::now());
    let snapshot = incident.clone();
    drop(incident);

    self.emit_escalation(&snapshot, reason);
    Ok(snapshot)
  }

  /// Escalate only if the incident is still escalation-eligible at the time
  /// the lock is held. Used by the sweeper, which works from a snapshot and
  /// must not act on since-resolved incidents. Returns the incident if it
  /// escalated.
  pub async fn escalate_if_eligible(
    &self,
    incident_id: &IncidentId,
    reason: &str,
  ) -> Result<Option<Incident>, EngineError> {
    let handle = self.incident_handle(incident_id).await?;
    let mut incident = handle.lock().await;
    if !sla::requires_escalation(&incident, Utc::now(), &self.config) {
      return Ok(None);
    }
    lifecycle::escalate(&mut incident, Utc::now());
    let snapshot = incident.clone();
    drop(incident);

    self.emit_escalation(&snapshot, reason);
    Ok(Some(snapshot))
  }

  fn emit_escalation(&self, incident: &Incident, reason: &str) {
    info!(incident_id = %incident.id, level = incident.escalation_level,
          severity = ?incident.severity, reason, "incident escalated");
    self.notifier.notify(&EngineEvent::Escalation {
      incident_id: incident.id.clone(),
      level: incident.escalation_level,
      severity: incident.severity,
      reason: reason.to_string(),
    });
    self.broadcaster.broadcast_incident(incident);
  }

  pub async fn get_incident(&self, incident_id: &IncidentId) -> Result<Incident, EngineError> {
    let handle = self.incident_handle(incident_id).await?;
    let incident = handle.lock().await;
    Ok(incident.clone())
  }

  // -------------------------------------------------------------------------
  // Dispatch
  // -------------------------------------------------------------------------

  /// Commit responder assignments to an incident. All-or-nothing: either the
  /// full selection is assigned (moving the incident from Verified to
  /// Assigned when applicable), or no state changes at all.
  pub async fn dispatch(
    &self,
    incident_id: &IncidentId,
    request: DispatchRequest,
    actor: &str,
  ) -> Result<Vec<Assignment>, EngineError> {
    let now = Utc::now();
    let handle = self.incident_handle(incident_id).await?;
    let mut incident = handle.lock().await;

    // Dispatch is legal when the incident can still move to Assigned, or is
    // already Assigned/InProgress (adding responders, or re-dispatch after a
    // cancelled assignment). Reject anything else up front so nothing is
    // committed on an invalid lifecycle position.
    let needs_transition =
      lifecycle::is_valid_transition(incident.status, IncidentStatus::Assigned);
    let already_dispatched = matches!(
      incident.status,
      IncidentStatus::Assigned | IncidentStatus::InProgress
    );
    if !needs_transition && !already_dispatched {
      return Err(EngineError::InvalidTransition {
        from: incident.status,
        to: IncidentStatus::Assigned,
      });
    }

    let view = self.responder_view().await;
    let selected = {
      let geo = self.geo.read().await;
      dispatch::select_responders(&incident, &request, &view, &geo)?
    };

    // Commit one responder at a time (never two responder locks at once),
    // re-validating under the lock. Any failure rolls back what was already
    // committed before surfacing the error.
    let mut committed: Vec<Assignment> = Vec::with_capacity(selected.len());
    for responder_id in &selected {
      match self.commit_one(&incident, responder_id, actor, now).await {
        Ok(assignment) => committed.push(assignment),
        Err(e) => {
          self.rollback(&committed).await;
          return Err(e);
        }
      }
    }

    if needs_transition {
      // Validated above; the incident lock was held throughout.
      lifecycle::transition(&mut incident, IncidentStatus::Assigned, now)?;
    }
    let snapshot = incident.clone();
    drop(incident);

    for assignment in &committed {
      info!(assignment_id = %assignment.id, incident_id = %incident_id,
            responder_id = %assignment.responder_id, actor, "responder assigned");
      self.notifier.notify(&EngineEvent::AssignmentCreated {
        assignment_id: assignment.id.clone(),
        incident_id: incident_id.clone(),
        responder_id: assignment.responder_id.clone(),
      });
      self.broadcaster.broadcast_assignment(assignment);
    }
    self.broadcaster.broadcast_incident(&snapshot);
    Ok(committed)
  }

  async fn commit_one(
    &self,
    incident: &Incident,
    responder_id: &ResponderId,
    actor: &str,
    now: chrono::DateTime<Utc>,
  ) -> Result<Assignment, EngineError> {
    let handle = self.responder_handle(responder_id).await?;
    let mut responder = handle.lock().await;
    if !responder.is_eligible() {
      return Err(EngineError::ResponderNotEligible(responder_id.clone()));
    }

    let assignment = dispatch::new_assignment(
      self.ids.assignment(),
      incident,
      responder_id.clone(),
      actor,
      now,
    );
    responder.status = ResponderStatus::Assigned;
    responder.active_assignment = Some(assignment.id.clone());
    drop(responder);

    self
      .assignments
      .write()
      .await
      .insert(assignment.id.clone(), Arc::new(Mutex::new(assignment.clone())));
    Ok(assignment)
  }

  async fn rollback(&self, committed: &[Assignment]) {
    {
      let mut assignments = self.assignments.write().await;
      for assignment in committed {
        assignments.remove(&assignment.id);
      }
    }
    for assignment in committed {
      if let Ok(handle) = self.responder_handle(&assignment.responder_id).await {
        let mut responder = handle.lock().await;
        responder.status = ResponderStatus::Available;
        responder.active_assignment = None;
      }
    }
  }

  /// Apply an assignment status transition, mirroring the responder's status
  /// and (on arrival) nudging the incident into InProgress.
  pub async fn update_assignment(
    &self,
    assignment_id: &AssignmentId,
    to: AssignmentStatus,
  ) -> Result<Assignment, EngineError> {
    let now = Utc::now();
    let handle = self.assignment_handle(assignment_id).await?;
    let mut assignment = handle.lock().await;
    dispatch::transition_assignment(&mut assignment, to, now)?;
    let snapshot = assignment.clone();
    drop(assignment);

    // Arrival drives the incident into InProgress when it is still Assigned.
    if to == AssignmentStatus::Arrived {
      if let Ok(incident_handle) = self.incident_handle(&snapshot.incident_id).await {
        let mut incident = incident_handle.lock().await;
        if incident.status == IncidentStatus::Assigned {
          let moved = lifecycle::transition(&mut incident, IncidentStatus::InProgress, now);
          debug_assert!(moved.is_ok(), "Assigned -> InProgress is in the transition set");
        }
      }
    }

    // Mirror onto the responder; a terminal assignment frees them.
    if let Ok(responder_handle) = self.responder_handle(&snapshot.responder_id).await {
      let mut responder = responder_handle.lock().await;
      match to {
        AssignmentStatus::EnRoute => responder.status = ResponderStatus::EnRoute,
        AssignmentStatus::Arrived => responder.status = ResponderStatus::OnScene,
        AssignmentStatus::Completed | AssignmentStatus::Cancelled => {
          responder.active_assignment = None;
          responder.status = if responder.on_duty && responder.available {
            ResponderStatus::Available
          } else if responder.on_duty {
            ResponderStatus::Unavailable
          } else {
            ResponderStatus::OffDuty
          };
        }
        _ => {}
      }
    }

    self.notifier.notify(&EngineEvent::AssignmentUpdated {
      assignment_id: assignment_id.clone(),
      status: to,
    });
    self.broadcaster.broadcast_assignment(&snapshot);
    Ok(snapshot)
  }

  pub async fn get_assignment(
    &self,
    assignment_id: &AssignmentId,
  ) -> Result<Assignment, EngineError> {
    let handle = self.assignment_handle(assignment_id).await?;
    let assignment = handle.lock().await;
    Ok(assignment.clone())
  }

  /// Assignments referencing an incident, in assignment-ID order.
  pub async fn assignments_for(&self, incident_id: &IncidentId) -> Vec<Assignment> {
    let assignments = self.assignments.read().await;
    let mut out = Vec::new();
    for handle in assignments.values() {
      let assignment = handle.lock().await;
      if &assignment.incident_id == incident_id {
        out.push(assignment.clone());
      }
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
  }

  // -------------------------------------------------------------------------
  // Responders and positions
  // -------------------------------------------------------------------------

  pub async fn register_responder(&self, new: NewResponder) -> Responder {
    let now = Utc::now();
    let id = self.ids.responder();
    let responder = Responder {
      id: id.clone(),
      name: new.name,
      responder_type: new.responder_type,
      rank: new.rank,
      status: if new.on_duty {
        ResponderStatus::Available
      } else {
        ResponderStatus::OffDuty
      },
      position: new.position,
      position_updated_at: new.position.map(|_| now),
      on_duty: new.on_duty,
      available: new.on_duty,
      badge_number: new.badge_number,
      contact_number: new.contact_number,
      specializations: new.specializations,
      active_assignment: None,
    };

    if let Some(position) = responder.position {
      self
        .geo
        .write()
        .await
        .upsert(id.clone(), responder.responder_type, position, now);
    }
    self
      .responders
      .write()
      .await
      .insert(id, Arc::new(Mutex::new(responder.clone())));
    responder
  }

  /// Flip duty/availability flags and recompute status when unassigned.
  pub async fn set_responder_duty(
    &self,
    responder_id: &ResponderId,
    on_duty: bool,
    available: bool,
  ) -> Result<Responder, EngineError> {
    let handle = self.responder_handle(responder_id).await?;
    let mut responder = handle.lock().await;
    responder.on_duty = on_duty;
    responder.available = available;
    if responder.active_assignment.is_none() {
      responder.status = if on_duty && available {
        ResponderStatus::Available
      } else if on_duty {
        ResponderStatus::Unavailable
      } else {
        ResponderStatus::OffDuty
      };
    }
    Ok(responder.clone())
  }

  /// Consume a position-feed update. Returns false when the fix was older
  /// than the stored one (and was therefore ignored).
  pub async fn update_position(
    &self,
    responder_id: &ResponderId,
    position: GeoPoint,
    timestamp: chrono::DateTime<Utc>,
  ) -> Result<bool, EngineError> {
    let handle = self.responder_handle(responder_id).await?;
    let mut responder = handle.lock().await;
    let accepted = self.geo.write().await.upsert(
      responder_id.clone(),
      responder.responder_type,
      position,
      timestamp,
    );
    if accepted {
      responder.position = Some(position);
      responder.position_updated_at = Some(timestamp);
    }
    Ok(accepted)
  }

  pub async fn get_responder(&self, responder_id: &ResponderId) -> Result<Responder, EngineError> {
    let handle = self.responder_handle(responder_id).await?;
    let responder = handle.lock().await;
    Ok(responder.clone())
  }

  /// Responders whose last position fix exceeds the configured staleness age.
  pub async fn stale_responders(&self) -> Vec<ResponderId> {
    let geo = self.geo.read().await;
    geo.stale(Utc::now(), self.config.position_stale_after)
  }

  // -------------------------------------------------------------------------
  // Reporting
  // -------------------------------------------------------------------------

  pub async fn get_statistics(&self) -> IncidentStatistics {
    let snapshot = self.incident_snapshot().await;
    stats::compute(&snapshot, Utc::now())
  }

  /// Open incidents whose elapsed time exceeds their SLA target. Report-only.
  pub async fn list_overdue(&self) -> Vec<Incident> {
    let now = Utc::now();
    let mut out: Vec<Incident> = self
      .incident_snapshot()
      .await
      .into_iter()
      .filter(|i| sla::is_overdue(i, now))
      .collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
  }

  /// Incidents currently eligible for automatic escalation.
  pub async fn list_requiring_escalation(&self) -> Vec<Incident> {
    let now = Utc::now();
    let mut out: Vec<Incident> = self
      .incident_snapshot()
      .await
      .into_iter()
      .filter(|i| sla::requires_escalation(i, now, &self.config))
      .collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
  }

  /// Point-in-time clone of every incident (one lock at a time).
  pub async fn incident_snapshot(&self) -> Vec<Incident> {
    let incidents = self.incidents.read().await;
    let mut out = Vec::with_capacity(incidents.len());
    for handle in incidents.values() {
      let incident = handle.lock().await;
      out.push(incident.clone());
    }
    out
  }

  // -------------------------------------------------------------------------
  // Handles
  // -------------------------------------------------------------------------

  async fn incident_handle(
    &self,
    id: &IncidentId,
  ) -> Result<Arc<Mutex<Incident>>, EngineError> {
    self
      .incidents
      .read()
      .await
      .get(id)
      .cloned()
      .ok_or_else(|| EngineError::incident_not_found(id.0.clone()))
  }

  async fn responder_handle(
    &self,
    id: &ResponderId,
  ) -> Result<Arc<Mutex<Responder>>, EngineError> {
    self
      .responders
      .read()
      .await
      .get(id)
      .cloned()
      .ok_or_else(|| EngineError::responder_not_found(id.0.clone()))
  }

  async fn assignment_handle(
    &self,
    id: &AssignmentId,
  ) -> Result<Arc<Mutex<Assignment>>, EngineError> {
    self
      .assignments
      .read()
      .await
      .get(id)
      .cloned()
      .ok_or_else(|| EngineError::assignment_not_found(id.0.clone()))
  }

  /// Cloned view of all responders (for selection planning outside locks).
  async fn responder_view(&self) -> HashMap<ResponderId, Responder> {
    let responders = self.responders.read().await;
    let mut view = HashMap::with_capacity(responders.len());
    for (id, handle) in responders.iter() {
      let responder = handle.lock().await;
      view.insert(id.clone(), responder.clone());
    }
    view
  }
}

#[cfg(test)]
impl DispatchEngine {
  pub(crate) async fn insert_incident_for_test(&self, incident: Incident) {
    self
      .incidents
      .write()
      .await
      .insert(incident.id.clone(), Arc::new(Mutex::new(incident)));
  }

  pub(crate) async fn mutate_incident_for_test(
    &self,
    id: &IncidentId,
    f: impl FnOnce(&mut Incident),
  ) {
    let handle = self.incident_handle(id).await.expect("incident exists");
    let mut incident = handle.lock().await;
    f(&mut incident);
  }
}
