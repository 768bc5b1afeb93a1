//! Statistics assembly over incident snapshots.

use chrono::{DateTime, Utc};

use crate::types::{Incident, IncidentStatistics};

/// Compute the dashboard statistics from a point-in-time snapshot.
pub fn compute(incidents: &[Incident], now: DateTime<Utc>) -> IncidentStatistics {
  let mut stats = IncidentStatistics {
    total_incidents: incidents.len() as u64,
    ..IncidentStatistics::default()
  };

  let today = now.date_naive();
  let mut resolved_sum: u64 = 0;
  let mut resolved_count: u64 = 0;

  for incident in incidents {
    if incident.status.is_open() {
      stats.active_incidents += 1;
    }
    if incident.is_critical {
      stats.critical_incidents += 1;
    }
    if incident.created_at.date_naive() == today {
      stats.incidents_today += 1;
    }

    *stats
      .status_distribution
      .entry(incident.status.to_string())
      .or_insert(0) += 1;

    *stats
      .type_distribution
      .entry(incident.incident_type.to_string())
      .or_insert(0) += 1;

    if let Some(secs) = incident.actual_response_secs {
      resolved_sum += u64::from(secs);
      resolved_count += 1;
    }
  }

  if resolved_count > 0 {
    stats.average_response_secs = Some(resolved_sum as f64 / resolved_count as f64);
  }
  stats
}
