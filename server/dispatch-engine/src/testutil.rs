//! Shared test fixtures.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::engine::DispatchEngine;
use crate::types::{
  Incident, IncidentId, IncidentStatus, IncidentType, Responder, ResponderId, ResponderRank,
  ResponderStatus, ResponderType, Severity,
};

pub fn fixed_time() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

/// A freshly reported incident with deterministic timestamps.
pub fn test_incident(severity: Severity) -> Incident {
  let now = fixed_time();
  Incident {
    id: IncidentId("inc-test".to_string()),
    code: "INC-2025-TESTCODE".to_string(),
    title: "Suspicious package at metro gate".to_string(),
    description: "Unattended bag reported by security staff.".to_string(),
    incident_type: IncidentType::SuspiciousObject,
    severity,
    status: IncidentStatus::Reported,
    location: None,
    location_address: None,
    reporter_name: Some("Guard Sharma".to_string()),
    reporter_contact: Some("+91-900000000".to_string()),
    ai_confidence: None,
    ai_analysis: None,
    safety_recommendations: None,
    escalation_level: 0,
    is_critical: severity == Severity::Critical,
    is_verified: false,
    sla_target_secs: crate::sla::response_target_secs(severity),
    actual_response_secs: None,
    high_threat_notified: false,
    created_at: now,
    updated_at: now,
    resolved_at: None,
  }
}

/// An on-duty, available responder with no position.
pub fn test_responder(id: &str, responder_type: ResponderType) -> Responder {
  Responder {
    id: ResponderId(id.to_string()),
    name: format!("Responder {id}"),
    responder_type,
    rank: ResponderRank::Inspector,
    status: ResponderStatus::Available,
    position: None,
    position_updated_at: None,
    on_duty: true,
    available: true,
    badge_number: None,
    contact_number: None,
    specializations: Default::default(),
    active_assignment: None,
  }
}

/// Seed an incident whose creation (and last activity) lies `age` in the past.
pub async fn seed_incident_with_age(
  engine: &DispatchEngine,
  severity: Severity,
  age: Duration,
) -> IncidentId {
  let mut incident = test_incident(severity);
  incident.id = IncidentId(format!("inc-{}", uuid::Uuid::new_v4().simple()));
  incident.created_at = Utc::now() - age;
  incident.updated_at = incident.created_at;
  let id = incident.id.clone();
  engine.insert_incident_for_test(incident).await;
  id
}

/// Push the incident's last-activity timestamp `age` into the past.
pub async fn backdate_incident(engine: &DispatchEngine, id: &IncidentId, age: Duration) {
  engine
    .mutate_incident_for_test(id, |incident| {
      incident.updated_at = Utc::now() - age;
    })
    .await;
}
