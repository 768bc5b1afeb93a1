//! Escalation sweeper: periodically escalates stale incidents.
//!
//! Each cycle works on a point-in-time snapshot and re-validates eligibility
//! inside the per-incident critical section, so an incident resolved between
//! snapshot and mutation is skipped. One incident's failure never aborts the
//! sweep of the remaining set.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::DispatchEngine;
use crate::types::IncidentId;

/// Reason recorded on every sweeper-driven escalation.
pub const ESCALATION_REASON: &str = "response time threshold exceeded";

/// Cadence floor: the sweeper never runs more often than once a minute.
const MIN_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one sweep cycle.
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
  pub escalated: Vec<IncidentId>,
  /// Over-SLA incidents, for reporting only; the sweep does not mutate them.
  pub overdue: Vec<IncidentId>,
}

/// Run one sweep cycle against the engine.
pub async fn run_once(engine: &DispatchEngine) -> SweepReport {
  let mut report = SweepReport::default();

  let candidates = engine.list_requiring_escalation().await;
  for incident in candidates {
    match engine
      .escalate_if_eligible(&incident.id, ESCALATION_REASON)
      .await
    {
      Ok(Some(escalated)) => report.escalated.push(escalated.id),
      Ok(None) => debug!(incident_id = %incident.id, "no longer eligible, skipped"),
      Err(e) => {
        // Isolated: keep sweeping the rest.
        warn!(incident_id = %incident.id, error = %e, "escalation failed");
      }
    }
  }

  report.overdue = engine
    .list_overdue()
    .await
    .into_iter()
    .map(|i| i.id)
    .collect();

  if !report.escalated.is_empty() || !report.overdue.is_empty() {
    info!(
      escalated = report.escalated.len(),
      overdue = report.overdue.len(),
      "sweep cycle complete"
    );
  }
  report
}

/// Spawn the background sweep loop. The interval is clamped to the one-minute
/// floor. The loop must not block dispatch or status updates; it only takes
/// short per-incident critical sections.
pub fn spawn(engine: Arc<DispatchEngine>) -> JoinHandle<()> {
  let period = engine.config().sweep_interval.max(MIN_INTERVAL);
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
      ticker.tick().await;
      run_once(&engine).await;
    }
  })
}
