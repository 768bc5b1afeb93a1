//! Core types for the dispatch engine (entities, enums, wire contracts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Opaque entity IDs
// ---------------------------------------------------------------------------

/// Opaque stable incident ID. Ordering is lexicographic (used for tie-breaks).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResponderId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

impl fmt::Display for IncidentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

impl fmt::Display for ResponderId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

impl fmt::Display for AssignmentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

// ---------------------------------------------------------------------------
// Geo
// ---------------------------------------------------------------------------

/// WGS84 position (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub lat: f64,
  pub lon: f64,
}

// ---------------------------------------------------------------------------
// Incident enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
  BombThreat,
  SuspiciousObject,
  ChemicalHazard,
  BiologicalHazard,
  FireEmergency,
  MedicalEmergency,
  SecurityBreach,
  TerroristActivity,
  NaturalDisaster,
  Other,
}

impl fmt::Display for IncidentType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::BombThreat => "BOMB_THREAT",
      Self::SuspiciousObject => "SUSPICIOUS_OBJECT",
      Self::ChemicalHazard => "CHEMICAL_HAZARD",
      Self::BiologicalHazard => "BIOLOGICAL_HAZARD",
      Self::FireEmergency => "FIRE_EMERGENCY",
      Self::MedicalEmergency => "MEDICAL_EMERGENCY",
      Self::SecurityBreach => "SECURITY_BREACH",
      Self::TerroristActivity => "TERRORIST_ACTIVITY",
      Self::NaturalDisaster => "NATURAL_DISASTER",
      Self::Other => "OTHER",
    };
    f.write_str(s)
  }
}

/// Severity, ordered ascending. Escalation moves one step toward Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  /// One step up; Critical is a fixed point.
  pub fn escalated(self) -> Self {
    match self {
      Self::Low => Self::Medium,
      Self::Medium => Self::High,
      Self::High => Self::Critical,
      Self::Critical => Self::Critical,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
  Reported,
  Verified,
  Assigned,
  InProgress,
  Resolved,
  FalseAlarm,
  Closed,
}

impl IncidentStatus {
  /// Open = the incident is still being worked (overdue detection applies).
  pub fn is_open(self) -> bool {
    !matches!(self, Self::Resolved | Self::FalseAlarm | Self::Closed)
  }

  /// No further transition is defined from these states.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::FalseAlarm | Self::Closed)
  }
}

impl fmt::Display for IncidentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Reported => "REPORTED",
      Self::Verified => "VERIFIED",
      Self::Assigned => "ASSIGNED",
      Self::InProgress => "IN_PROGRESS",
      Self::Resolved => "RESOLVED",
      Self::FalseAlarm => "FALSE_ALARM",
      Self::Closed => "CLOSED",
    };
    f.write_str(s)
  }
}

// ---------------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
  pub id: IncidentId,
  /// Human-readable code, e.g. "INC-2025-4F2A91CB".
  pub code: String,
  pub title: String,
  pub description: String,
  pub incident_type: IncidentType,
  pub severity: Severity,
  pub status: IncidentStatus,
  pub location: Option<GeoPoint>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location_address: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reporter_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reporter_contact: Option<String>,
  /// Threat-scorer confidence in [0, 1]; unset until a result is merged.
  pub ai_confidence: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ai_analysis: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub safety_recommendations: Option<String>,
  /// Monotonically non-decreasing over the incident's life.
  pub escalation_level: u32,
  /// Sticky: once true, automated logic never resets it.
  pub is_critical: bool,
  pub is_verified: bool,
  /// Response-time target in seconds, fixed at creation from severity.
  pub sla_target_secs: u32,
  /// Set exactly once, on entering Resolved.
  pub actual_response_secs: Option<u32>,
  /// High-threat alert already fired for a threshold crossing.
  pub high_threat_notified: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub resolved_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Responder enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponderType {
  BombDisposal,
  Police,
  FireFighter,
  Paramedic,
  HazmatSpecialist,
  SecurityOfficer,
  FieldCommander,
  IntelligenceOfficer,
  EvacuationCoordinator,
  #[serde(rename = "K9_UNIT")]
  K9Unit,
}

/// Seniority scale, ordered ascending (police ranks first, then armed-forces).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponderRank {
  Constable,
  HeadConstable,
  SubInspector,
  Inspector,
  DeputySp,
  Sp,
  Dig,
  Ig,
  Dgp,
  Captain,
  Major,
  Colonel,
  Brigadier,
  MajorGeneral,
  LieutenantGeneral,
  General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponderStatus {
  Available,
  Assigned,
  EnRoute,
  OnScene,
  Busy,
  OffDuty,
  Unavailable,
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Responder {
  pub id: ResponderId,
  pub name: String,
  pub responder_type: ResponderType,
  pub rank: ResponderRank,
  pub status: ResponderStatus,
  /// Last-known position; may be stale. The geo index is the source of truth
  /// for ranking, this copy is for display.
  pub position: Option<GeoPoint>,
  pub position_updated_at: Option<DateTime<Utc>>,
  pub on_duty: bool,
  pub available: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub badge_number: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub contact_number: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub specializations: BTreeSet<String>,
  /// At most one non-terminal assignment at a time.
  pub active_assignment: Option<AssignmentId>,
}

impl Responder {
  /// Eligible for dispatch: on duty, flagged available, status Available,
  /// and no active assignment.
  pub fn is_eligible(&self) -> bool {
    self.on_duty
      && self.available
      && self.status == ResponderStatus::Available
      && self.active_assignment.is_none()
  }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// Strictly ordered lifecycle, except Cancelled which is reachable from any
/// non-terminal state. Assignments are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
  Assigned,
  Acknowledged,
  EnRoute,
  Arrived,
  Completed,
  Cancelled,
}

impl AssignmentStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Cancelled)
  }

  /// The single forward successor in the ordered lifecycle, if any.
  pub fn successor(self) -> Option<Self> {
    match self {
      Self::Assigned => Some(Self::Acknowledged),
      Self::Acknowledged => Some(Self::EnRoute),
      Self::EnRoute => Some(Self::Arrived),
      Self::Arrived => Some(Self::Completed),
      Self::Completed | Self::Cancelled => None,
    }
  }
}

impl fmt::Display for AssignmentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Assigned => "ASSIGNED",
      Self::Acknowledged => "ACKNOWLEDGED",
      Self::EnRoute => "EN_ROUTE",
      Self::Arrived => "ARRIVED",
      Self::Completed => "COMPLETED",
      Self::Cancelled => "CANCELLED",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
  Low,
  Normal,
  High,
  Urgent,
}

impl Priority {
  /// Dispatch priority derived from incident severity.
  pub fn from_severity(severity: Severity) -> Self {
    match severity {
      Severity::Critical => Self::Urgent,
      Severity::High => Self::High,
      Severity::Medium => Self::Normal,
      Severity::Low => Self::Low,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
  pub id: AssignmentId,
  pub incident_id: IncidentId,
  pub responder_id: ResponderId,
  pub status: AssignmentStatus,
  pub priority: Priority,
  pub assigned_by: String,
  pub assigned_at: DateTime<Utc>,
  pub estimated_arrival: Option<DateTime<Utc>>,
  pub actual_arrival: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Dispatch request (manual target list or auto mode)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchRequest {
  /// Operator-selected responder IDs. Ranking is bypassed but every ID must
  /// individually pass the eligibility filter.
  Manual { responder_ids: Vec<ResponderId> },
  /// Nearest-first selection by type within a radius.
  Auto {
    responder_type: ResponderType,
    count: usize,
    radius_km: f64,
  },
}

// ---------------------------------------------------------------------------
// Inbound types (what callers submit)
// ---------------------------------------------------------------------------

/// New-incident submission. Unknown fields are silently ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewIncident {
  pub title: String,
  pub description: String,
  pub incident_type: IncidentType,
  pub severity: Severity,
  #[serde(default)]
  pub location: Option<GeoPoint>,
  #[serde(default)]
  pub location_address: Option<String>,
  #[serde(default)]
  pub reporter_name: Option<String>,
  #[serde(default)]
  pub reporter_contact: Option<String>,
}

/// Responder registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewResponder {
  pub name: String,
  pub responder_type: ResponderType,
  pub rank: ResponderRank,
  #[serde(default)]
  pub position: Option<GeoPoint>,
  #[serde(default = "default_true")]
  pub on_duty: bool,
  #[serde(default)]
  pub badge_number: Option<String>,
  #[serde(default)]
  pub contact_number: Option<String>,
  #[serde(default)]
  pub specializations: BTreeSet<String>,
}

fn default_true() -> bool {
  true
}

// ---------------------------------------------------------------------------
// Statistics snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentStatistics {
  pub total_incidents: u64,
  pub active_incidents: u64,
  pub critical_incidents: u64,
  pub incidents_today: u64,
  /// Counts keyed by status wire name (e.g. "IN_PROGRESS").
  pub status_distribution: std::collections::BTreeMap<String, u64>,
  /// Counts keyed by incident type wire name.
  pub type_distribution: std::collections::BTreeMap<String, u64>,
  /// Mean actual response time over resolved incidents, seconds.
  pub average_response_secs: Option<f64>,
}

// ---------------------------------------------------------------------------
// CLI stream wrappers
// ---------------------------------------------------------------------------

/// Structured error output for invalid or failed command lines.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
    }
  }
}
