//! Threat-scoring boundary: the external scorer seam, reply parsing, and the
//! idempotent merge back into an incident.
//!
//! The scorer's reply is free text that usually contains a JSON object.
//! Parsing is strict-decode-or-structured-fallback: try a serde decode of the
//! embedded object; if that fails, a deterministic keyword table scores the
//! text and the result is marked degraded so callers can tell the two apart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::EngineError;
use crate::types::{Incident, Severity};

/// External threat scorer. May fail or time out; the engine bounds the wait
/// and recovers locally.
#[async_trait]
pub trait ThreatScorer: Send + Sync {
  /// Submit incident content, receive the scorer's raw reply text.
  async fn score(&self, content: &str) -> Result<String, EngineError>;
}

// ---------------------------------------------------------------------------
// Assessment (parsed result)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ThreatAssessment {
  /// Clamped to [0, 1].
  pub confidence: f64,
  pub summary: String,
  pub safety_recommendations: Option<String>,
  /// True when the reply did not decode and the keyword fallback scored it.
  pub degraded: bool,
}

/// Wire shape of a well-formed scorer reply (unknown fields ignored).
#[derive(Debug, Deserialize)]
struct ScorerReply {
  confidence_score: f64,
  #[serde(default)]
  analysis_summary: Option<String>,
  #[serde(default)]
  safety_recommendations: Option<Vec<String>>,
}

const SUMMARY_MAX_CHARS: usize = 500;

/// Parse a raw scorer reply.
pub fn parse_reply(text: &str) -> ThreatAssessment {
  if let Some(block) = extract_json_block(text) {
    if let Ok(reply) = serde_json::from_str::<ScorerReply>(block) {
      return ThreatAssessment {
        confidence: reply.confidence_score.clamp(0.0, 1.0),
        summary: reply
          .analysis_summary
          .unwrap_or_else(|| "Threat analysis completed.".to_string()),
        safety_recommendations: reply.safety_recommendations.map(|r| r.join("; ")),
        degraded: false,
      };
    }
  }
  keyword_fallback(text)
}

/// Outermost-brace slice of the reply, if any. Scorer replies often wrap the
/// JSON object in prose or code fences.
fn extract_json_block(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  (end > start).then(|| &text[start..=end])
}

/// Deterministic keyword scorer over the raw text. Always marked degraded.
pub fn keyword_fallback(text: &str) -> ThreatAssessment {
  let lower = text.to_lowercase();
  let confidence = if lower.contains("critical") || lower.contains("high threat") {
    0.9
  } else if lower.contains("medium") || lower.contains("moderate") {
    0.6
  } else {
    0.3
  };

  let mut summary: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
  if text.chars().count() > SUMMARY_MAX_CHARS {
    summary.push_str("...");
  }

  ThreatAssessment {
    confidence,
    summary,
    safety_recommendations: Some("Follow standard emergency response protocols.".to_string()),
    degraded: true,
  }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Outcome of merging an assessment into an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
  /// The confidence crossed the threshold upward and the high-threat alert
  /// has not fired for this crossing yet.
  pub high_threat_crossed: bool,
}

/// Merge a scorer result into the incident. Idempotent: the last result with
/// a score wins on the terminal fields, duplicates re-apply the same values.
/// Never lowers severity, never clears the sticky critical flag, never rolls
/// back escalation.
pub fn merge_assessment(
  incident: &mut Incident,
  assessment: &ThreatAssessment,
  threshold: f64,
  now: DateTime<Utc>,
) -> MergeOutcome {
  incident.ai_confidence = Some(assessment.confidence);
  incident.ai_analysis = Some(assessment.summary.clone());
  if assessment.safety_recommendations.is_some() {
    incident.safety_recommendations = assessment.safety_recommendations.clone();
  }
  incident.updated_at = now;

  if assessment.confidence >= threshold {
    incident.is_critical = true;
    if incident.severity < Severity::High {
      incident.severity = Severity::High;
    }
    let crossed = !incident.high_threat_notified;
    incident.high_threat_notified = true;
    MergeOutcome {
      high_threat_crossed: crossed,
    }
  } else {
    // Below threshold: re-arm the alert for a future upward crossing, but
    // leave the sticky flag and severity alone.
    incident.high_threat_notified = false;
    MergeOutcome {
      high_threat_crossed: false,
    }
  }
}

// ---------------------------------------------------------------------------
// Built-in scorer (no network)
// ---------------------------------------------------------------------------

/// Local scorer that answers with a well-formed JSON reply scored by the same
/// keyword table as the fallback. Used by the binary and tests; real
/// deployments plug an external client into the trait instead.
#[derive(Debug, Default)]
pub struct KeywordScorer;

#[async_trait]
impl ThreatScorer for KeywordScorer {
  async fn score(&self, content: &str) -> Result<String, EngineError> {
    let assessment = keyword_fallback(content);
    let reply = serde_json::json!({
      "confidence_score": assessment.confidence,
      "analysis_summary": format!("Keyword screening of incident report ({} chars).", content.len()),
      "safety_recommendations": ["Follow standard emergency response protocols."],
    });
    Ok(reply.to_string())
  }
}
