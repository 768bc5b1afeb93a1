//! SLA policy: severity-driven response-time targets and escalation eligibility.
//!
//! Pure functions. The target is evaluated once at incident creation and never
//! recomputed automatically.

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::types::{Incident, IncidentStatus, Severity};

/// Response-time target in seconds for a given severity.
pub fn response_target_secs(severity: Severity) -> u32 {
  match severity {
    Severity::Critical => 300,
    Severity::High => 600,
    Severity::Medium => 1800,
    Severity::Low => 3600,
  }
}

/// Eligible for automatic escalation: inactive past the threshold, still
/// awaiting assignment, and below the automated escalation cap.
///
/// Inactivity is measured from `updated_at` (equal to `created_at` for an
/// untouched incident), so an escalation re-arms the clock and an immediate
/// re-sweep cannot double-escalate.
pub fn requires_escalation(incident: &Incident, now: DateTime<Utc>, config: &EngineConfig) -> bool {
  let awaiting = matches!(
    incident.status,
    IncidentStatus::Reported | IncidentStatus::Verified
  );
  if !awaiting || incident.escalation_level >= config.escalation_cap {
    return false;
  }
  let idle = now.signed_duration_since(incident.updated_at);
  idle.num_seconds() > config.escalation_threshold.as_secs() as i64
}

/// Overdue: still open and elapsed time exceeds the SLA target. Report-only;
/// independent of escalation level.
pub fn is_overdue(incident: &Incident, now: DateTime<Utc>) -> bool {
  if !incident.status.is_open() {
    return false;
  }
  let elapsed = now.signed_duration_since(incident.created_at).num_seconds();
  elapsed > i64::from(incident.sla_target_secs)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::test_incident;
  use chrono::Duration;

  #[test]
  fn targets_by_severity() {
    assert_eq!(response_target_secs(Severity::Critical), 300);
    assert_eq!(response_target_secs(Severity::High), 600);
    assert_eq!(response_target_secs(Severity::Medium), 1800);
    assert_eq!(response_target_secs(Severity::Low), 3600);
  }

  #[test]
  fn escalation_requires_threshold_age() {
    let config = EngineConfig::default();
    let incident = test_incident(Severity::Medium);
    let now = incident.created_at + Duration::minutes(29);
    assert!(!requires_escalation(&incident, now, &config));
    let now = incident.created_at + Duration::minutes(31);
    assert!(requires_escalation(&incident, now, &config));
  }

  #[test]
  fn escalation_excluded_at_cap() {
    let config = EngineConfig::default();
    let mut incident = test_incident(Severity::Medium);
    incident.escalation_level = 3;
    let now = incident.created_at + Duration::hours(2);
    assert!(!requires_escalation(&incident, now, &config));
  }

  #[test]
  fn escalation_only_while_awaiting_assignment() {
    let config = EngineConfig::default();
    let mut incident = test_incident(Severity::Medium);
    incident.status = IncidentStatus::InProgress;
    let now = incident.created_at + Duration::hours(2);
    assert!(!requires_escalation(&incident, now, &config));
  }

  #[test]
  fn overdue_ignores_escalation_level() {
    let mut incident = test_incident(Severity::Critical);
    incident.escalation_level = 5;
    let now = incident.created_at + Duration::seconds(301);
    assert!(is_overdue(&incident, now));
  }

  #[test]
  fn resolved_incident_is_never_overdue() {
    let mut incident = test_incident(Severity::Critical);
    incident.status = IncidentStatus::Resolved;
    let now = incident.created_at + Duration::hours(5);
    assert!(!is_overdue(&incident, now));
  }
}
