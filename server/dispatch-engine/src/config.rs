//! Engine configuration with sane defaults.

use std::time::Duration;

/// Tunable thresholds for escalation, dispatch, and the scorer boundary.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Age after which a still-unassigned incident becomes escalation-eligible.
  pub escalation_threshold: Duration,
  /// Automated escalation stops at this level; beyond it is manual-only.
  pub escalation_cap: u32,
  /// Sweeper cadence. Clamped to a 60 s floor at loop start.
  pub sweep_interval: Duration,
  /// Scorer confidence at or above this forces is_critical + severity >= High.
  pub ai_confidence_threshold: f64,
  /// Bounded wait around the external scorer call.
  pub scorer_timeout: Duration,
  /// Position age beyond which a responder counts as stale in the geo index.
  pub position_stale_after: Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      escalation_threshold: Duration::from_secs(30 * 60),
      escalation_cap: 3,
      sweep_interval: Duration::from_secs(60),
      ai_confidence_threshold: 0.7,
      scorer_timeout: Duration::from_secs(10),
      position_stale_after: Duration::from_secs(15 * 60),
    }
  }
}
