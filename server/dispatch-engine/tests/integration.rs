//! Integration tests for the dispatch engine public API.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use dispatch_engine::events::{Broadcaster, EngineEvent, Notifier};
use dispatch_engine::scoring::{parse_reply, ThreatScorer};
use dispatch_engine::types::{
  AssignmentStatus, GeoPoint, IncidentStatus, NewIncident, NewResponder, ResponderStatus,
  ResponderType, Severity,
};
use dispatch_engine::{
  DispatchEngine, DispatchRequest, EngineConfig, EngineError, Incident, Responder,
};

// ---------------------------------------------------------------------------
// Test collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CollectingNotifier {
  events: Mutex<Vec<EngineEvent>>,
}

impl CollectingNotifier {
  fn high_threat_count(&self) -> usize {
    self
      .events
      .lock()
      .unwrap()
      .iter()
      .filter(|e| matches!(e, EngineEvent::HighThreatAlert { .. }))
      .count()
  }

  fn escalation_count(&self) -> usize {
    self
      .events
      .lock()
      .unwrap()
      .iter()
      .filter(|e| matches!(e, EngineEvent::Escalation { .. }))
      .count()
  }
}

impl Notifier for CollectingNotifier {
  fn notify(&self, event: &EngineEvent) {
    self.events.lock().unwrap().push(event.clone());
  }
}

struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
  fn broadcast_incident(&self, _incident: &Incident) {}
  fn broadcast_assignment(&self, _assignment: &dispatch_engine::Assignment) {}
}

/// Scorer returning a fixed well-formed reply.
struct FixedScorer(f64);

#[async_trait]
impl ThreatScorer for FixedScorer {
  async fn score(&self, _content: &str) -> Result<String, EngineError> {
    Ok(format!(
      r#"{{"confidence_score": {}, "analysis_summary": "fixed assessment"}}"#,
      self.0
    ))
  }
}

fn engine_with(
  scorer: Arc<dyn ThreatScorer>,
) -> (Arc<DispatchEngine>, Arc<CollectingNotifier>) {
  let notifier = Arc::new(CollectingNotifier::default());
  let engine = Arc::new(DispatchEngine::new(
    EngineConfig::default(),
    scorer,
    notifier.clone(),
    Arc::new(NullBroadcaster),
  ));
  (engine, notifier)
}

fn new_incident(severity: Severity, location: Option<GeoPoint>) -> NewIncident {
  serde_json::from_value(serde_json::json!({
    "title": "Unattended bag at platform 2",
    "description": "Black duffel bag, no owner in sight for 20 minutes.",
    "incident_type": "SUSPICIOUS_OBJECT",
    "severity": serde_json::to_value(severity).unwrap(),
    "location": location,
  }))
  .unwrap()
}

fn new_paramedic(name: &str) -> NewResponder {
  serde_json::from_value(serde_json::json!({
    "name": name,
    "responder_type": "PARAMEDIC",
    "rank": "INSPECTOR",
  }))
  .unwrap()
}

async fn place(engine: &Arc<DispatchEngine>, responder: &Responder, lat: f64, lon: f64) {
  engine
    .update_position(&responder.id, GeoPoint { lat, lon }, Utc::now())
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_with_illegal_jumps_rejected() {
  let (engine, _) = engine_with(Arc::new(FixedScorer(0.1)));
  let incident = engine
    .create_incident(new_incident(Severity::High, None))
    .await;
  assert_eq!(incident.status, IncidentStatus::Reported);
  assert_eq!(incident.sla_target_secs, 600, "HIGH maps to 600s");
  assert!(incident.code.starts_with("INC-"));

  let id = incident.id;

  // Illegal jump from Reported straight to InProgress.
  let err = engine
    .update_status(&id, IncidentStatus::InProgress, "op")
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::InvalidTransition { .. }));

  engine
    .update_status(&id, IncidentStatus::Verified, "op")
    .await
    .unwrap();
  engine
    .update_status(&id, IncidentStatus::Assigned, "op")
    .await
    .unwrap();

  // Cannot fall back to FalseAlarm once assigned.
  assert!(engine
    .update_status(&id, IncidentStatus::FalseAlarm, "op")
    .await
    .is_err());

  engine
    .update_status(&id, IncidentStatus::InProgress, "op")
    .await
    .unwrap();
  let resolved = engine
    .update_status(&id, IncidentStatus::Resolved, "op")
    .await
    .unwrap();
  assert!(resolved.resolved_at.is_some());
  assert!(resolved.actual_response_secs.is_some());

  // Resolving twice is rejected; the response time is not recomputed.
  assert!(engine
    .update_status(&id, IncidentStatus::Resolved, "op")
    .await
    .is_err());

  engine
    .update_status(&id, IncidentStatus::Closed, "op")
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// Threat scoring
// ---------------------------------------------------------------------------

#[tokio::test]
async fn high_confidence_score_forces_critical_and_alerts_once() {
  let (engine, notifier) = engine_with(Arc::new(FixedScorer(0.85)));
  let incident = engine
    .create_incident(new_incident(Severity::High, None))
    .await;
  assert_eq!(incident.sla_target_secs, 600);

  // Drive the merge directly (the spawned path does the same thing).
  let assessment = parse_reply(r#"{"confidence_score": 0.85, "analysis_summary": "hot"}"#);
  let merged = engine
    .apply_assessment(&incident.id, &assessment)
    .await
    .unwrap();

  assert_eq!(merged.severity, Severity::High, "already >= HIGH, unchanged");
  assert!(merged.is_critical);
  assert_eq!(merged.ai_confidence, Some(0.85));
  assert_eq!(notifier.high_threat_count(), 1);

  // Duplicate delivery: idempotent merge, no second alert.
  engine
    .apply_assessment(&incident.id, &assessment)
    .await
    .unwrap();
  assert_eq!(notifier.high_threat_count(), 1);
}

#[tokio::test]
async fn spawned_analysis_merges_into_incident() {
  let (engine, _) = engine_with(Arc::new(FixedScorer(0.2)));
  let incident = engine
    .create_incident(new_incident(Severity::Medium, None))
    .await;

  // Wait for the fire-and-forget analysis task to re-enter and merge.
  let mut merged = None;
  for _ in 0..50 {
    let current = engine.get_incident(&incident.id).await.unwrap();
    if current.ai_confidence.is_some() {
      merged = Some(current);
      break;
    }
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
  }
  let merged = merged.expect("analysis should complete");
  assert_eq!(merged.ai_confidence, Some(0.2));
  assert_eq!(merged.severity, Severity::Medium, "below threshold: unchanged");
  assert!(!merged.is_critical);
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auto_dispatch_assigns_nearest_and_updates_everyone() {
  let (engine, _) = engine_with(Arc::new(FixedScorer(0.1)));
  let near = engine.register_responder(new_paramedic("Asha")).await;
  let far = engine.register_responder(new_paramedic("Vikram")).await;
  place(&engine, &near, 28.601, 77.200).await;
  place(&engine, &far, 28.640, 77.200).await;

  let incident = engine
    .create_incident(new_incident(
      Severity::Critical,
      Some(GeoPoint {
        lat: 28.600,
        lon: 77.200,
      }),
    ))
    .await;
  engine.verify(&incident.id, "op").await.unwrap();

  let assignments = engine
    .dispatch(
      &incident.id,
      DispatchRequest::Auto {
        responder_type: ResponderType::Paramedic,
        count: 1,
        radius_km: 10.0,
      },
      "dispatcher-7",
    )
    .await
    .unwrap();

  assert_eq!(assignments.len(), 1);
  assert_eq!(assignments[0].responder_id, near.id);
  assert_eq!(
    assignments[0].priority,
    dispatch_engine::types::Priority::Urgent
  );

  let incident = engine.get_incident(&incident.id).await.unwrap();
  assert_eq!(incident.status, IncidentStatus::Assigned);

  let assigned = engine.get_responder(&near.id).await.unwrap();
  assert_eq!(assigned.status, ResponderStatus::Assigned);
  assert!(assigned.active_assignment.is_some());

  let untouched = engine.get_responder(&far.id).await.unwrap();
  assert_eq!(untouched.status, ResponderStatus::Available);
}

#[tokio::test]
async fn dispatch_is_all_or_nothing() {
  let (engine, _) = engine_with(Arc::new(FixedScorer(0.1)));
  // Only one paramedic on duty within range.
  let only = engine.register_responder(new_paramedic("Asha")).await;
  place(&engine, &only, 28.601, 77.200).await;

  let incident = engine
    .create_incident(new_incident(
      Severity::High,
      Some(GeoPoint {
        lat: 28.600,
        lon: 77.200,
      }),
    ))
    .await;
  engine.verify(&incident.id, "op").await.unwrap();

  let err = engine
    .dispatch(
      &incident.id,
      DispatchRequest::Auto {
        responder_type: ResponderType::Paramedic,
        count: 2,
        radius_km: 5.0,
      },
      "dispatcher-7",
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    EngineError::NoEligibleResponders {
      requested: 2,
      found: 1
    }
  ));

  // Zero assignments, incident and responder untouched.
  assert!(engine.assignments_for(&incident.id).await.is_empty());
  let incident = engine.get_incident(&incident.id).await.unwrap();
  assert_eq!(incident.status, IncidentStatus::Verified);
  let responder = engine.get_responder(&only.id).await.unwrap();
  assert_eq!(responder.status, ResponderStatus::Available);
}

#[tokio::test]
async fn completed_assignment_frees_the_responder() {
  let (engine, _) = engine_with(Arc::new(FixedScorer(0.1)));
  let medic = engine.register_responder(new_paramedic("Asha")).await;
  place(&engine, &medic, 28.601, 77.200).await;

  let incident = engine
    .create_incident(new_incident(
      Severity::Medium,
      Some(GeoPoint {
        lat: 28.600,
        lon: 77.200,
      }),
    ))
    .await;
  engine.verify(&incident.id, "op").await.unwrap();

  let assignments = engine
    .dispatch(
      &incident.id,
      DispatchRequest::Manual {
        responder_ids: vec![medic.id.clone()],
      },
      "dispatcher-7",
    )
    .await
    .unwrap();
  let aid = assignments[0].id.clone();

  // A busy responder cannot be dispatched again.
  let second = engine
    .create_incident(new_incident(
      Severity::Low,
      Some(GeoPoint {
        lat: 28.600,
        lon: 77.200,
      }),
    ))
    .await;
  engine.verify(&second.id, "op").await.unwrap();
  let err = engine
    .dispatch(
      &second.id,
      DispatchRequest::Manual {
        responder_ids: vec![medic.id.clone()],
      },
      "dispatcher-7",
    )
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::ResponderNotEligible(_)));

  engine
    .update_assignment(&aid, AssignmentStatus::Acknowledged)
    .await
    .unwrap();
  engine
    .update_assignment(&aid, AssignmentStatus::EnRoute)
    .await
    .unwrap();
  engine
    .update_assignment(&aid, AssignmentStatus::Arrived)
    .await
    .unwrap();

  // Arrival pushes the incident into InProgress.
  let incident = engine.get_incident(&incident.id).await.unwrap();
  assert_eq!(incident.status, IncidentStatus::InProgress);
  let responder = engine.get_responder(&medic.id).await.unwrap();
  assert_eq!(responder.status, ResponderStatus::OnScene);

  engine
    .update_assignment(&aid, AssignmentStatus::Completed)
    .await
    .unwrap();
  let responder = engine.get_responder(&medic.id).await.unwrap();
  assert_eq!(responder.status, ResponderStatus::Available);
  assert!(responder.active_assignment.is_none());
}

#[tokio::test]
async fn cancelled_assignment_allows_redispatch() {
  let (engine, _) = engine_with(Arc::new(FixedScorer(0.1)));
  let medic = engine.register_responder(new_paramedic("Asha")).await;
  place(&engine, &medic, 28.601, 77.200).await;

  let incident = engine
    .create_incident(new_incident(
      Severity::High,
      Some(GeoPoint {
        lat: 28.600,
        lon: 77.200,
      }),
    ))
    .await;
  engine.verify(&incident.id, "op").await.unwrap();

  let assignments = engine
    .dispatch(
      &incident.id,
      DispatchRequest::Manual {
        responder_ids: vec![medic.id.clone()],
      },
      "dispatcher-7",
    )
    .await
    .unwrap();
  engine
    .update_assignment(&assignments[0].id, AssignmentStatus::Cancelled)
    .await
    .unwrap();

  // Cancellation frees the responder but the incident stays Assigned.
  let responder = engine.get_responder(&medic.id).await.unwrap();
  assert_eq!(responder.status, ResponderStatus::Available);
  assert!(responder.active_assignment.is_none());
  let current = engine.get_incident(&incident.id).await.unwrap();
  assert_eq!(current.status, IncidentStatus::Assigned);

  // The same responder can be dispatched to the same incident again.
  let retry = engine
    .dispatch(
      &incident.id,
      DispatchRequest::Manual {
        responder_ids: vec![medic.id.clone()],
      },
      "dispatcher-7",
    )
    .await
    .unwrap();
  assert_eq!(retry.len(), 1);
  assert_ne!(retry[0].id, assignments[0].id);

  let responder = engine.get_responder(&medic.id).await.unwrap();
  assert_eq!(responder.status, ResponderStatus::Assigned);
  assert_eq!(responder.active_assignment, Some(retry[0].id.clone()));

  // Both assignments remain on the record.
  assert_eq!(engine.assignments_for(&incident.id).await.len(), 2);
}

// ---------------------------------------------------------------------------
// Escalation and statistics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_escalation_raises_severity_and_emits() {
  let (engine, notifier) = engine_with(Arc::new(FixedScorer(0.1)));
  let incident = engine
    .create_incident(new_incident(Severity::Low, None))
    .await;

  let escalated = engine
    .escalate(&incident.id, "commander judgment")
    .await
    .unwrap();
  assert_eq!(escalated.escalation_level, 1);
  assert_eq!(escalated.severity, Severity::Medium);
  assert_eq!(notifier.escalation_count(), 1);
}

#[tokio::test]
async fn statistics_reflect_the_arena() {
  let (engine, _) = engine_with(Arc::new(FixedScorer(0.1)));
  let a = engine
    .create_incident(new_incident(Severity::High, None))
    .await;
  engine
    .create_incident(new_incident(Severity::Low, None))
    .await;

  engine
    .update_status(&a.id, IncidentStatus::FalseAlarm, "op")
    .await
    .unwrap();

  let stats = engine.get_statistics().await;
  assert_eq!(stats.total_incidents, 2);
  assert_eq!(stats.active_incidents, 1);
  assert_eq!(stats.incidents_today, 2);
  assert_eq!(stats.status_distribution.get("FALSE_ALARM"), Some(&1));
  assert_eq!(
    stats.type_distribution.get("SUSPICIOUS_OBJECT"),
    Some(&2)
  );
}
