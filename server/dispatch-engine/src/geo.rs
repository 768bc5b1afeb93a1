//! Geo index: last-known responder positions with k-nearest queries.
//!
//! Read-mostly; updates are last-writer-wins by timestamp, not by call order,
//! so out-of-order position feeds converge to the newest fix.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::{GeoPoint, ResponderId, ResponderType};

/// Mean earth radius, km (spherical approximation).
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, km (haversine).
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
  let dlat = (b.lat - a.lat).to_radians();
  let dlon = (b.lon - a.lon).to_radians();
  let lat1 = a.lat.to_radians();
  let lat2 = b.lat.to_radians();
  let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
  2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[derive(Debug, Clone)]
struct PositionRecord {
  position: GeoPoint,
  responder_type: ResponderType,
  updated_at: DateTime<Utc>,
}

/// A ranked candidate from a nearest query.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub responder_id: ResponderId,
  pub distance_km: f64,
}

/// In-memory position index keyed by responder ID.
#[derive(Debug, Default)]
pub struct GeoIndex {
  records: HashMap<ResponderId, PositionRecord>,
}

impl GeoIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a position fix. Returns true if the fix was accepted.
  ///
  /// A fix older than the stored one is rejected; an equal-timestamp fix is
  /// applied (idempotent re-delivery of the newest fix is a no-op in effect).
  pub fn upsert(
    &mut self,
    responder_id: ResponderId,
    responder_type: ResponderType,
    position: GeoPoint,
    timestamp: DateTime<Utc>,
  ) -> bool {
    match self.records.get(&responder_id) {
      Some(existing) if timestamp < existing.updated_at => false,
      _ => {
        self.records.insert(
          responder_id,
          PositionRecord {
            position,
            responder_type,
            updated_at: timestamp,
          },
        );
        true
      }
    }
  }

  pub fn remove(&mut self, responder_id: &ResponderId) {
    self.records.remove(responder_id);
  }

  pub fn position_of(&self, responder_id: &ResponderId) -> Option<GeoPoint> {
    self.records.get(responder_id).map(|r| r.position)
  }

  /// Up to `k` responders of `responder_type` within `radius_km` of `origin`,
  /// ascending by distance, ties broken by ascending responder ID.
  pub fn nearest(
    &self,
    origin: GeoPoint,
    responder_type: Option<ResponderType>,
    radius_km: f64,
    k: usize,
  ) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = self
      .records
      .iter()
      .filter(|(_, rec)| responder_type.map_or(true, |t| rec.responder_type == t))
      .map(|(id, rec)| Candidate {
        responder_id: id.clone(),
        distance_km: haversine_km(origin, rec.position),
      })
      .filter(|c| c.distance_km <= radius_km)
      .collect();

    candidates.sort_by(|a, b| {
      a.distance_km
        .partial_cmp(&b.distance_km)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.responder_id.cmp(&b.responder_id))
    });
    candidates.truncate(k);
    candidates
  }

  /// Responders whose last fix is older than `max_age` at `now`. Used by an
  /// external monitoring collaborator; the matcher never consults this.
  pub fn stale(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<ResponderId> {
    let mut out: Vec<ResponderId> = self
      .records
      .iter()
      .filter(|(_, rec)| {
        now.signed_duration_since(rec.updated_at).num_seconds() > max_age.as_secs() as i64
      })
      .map(|(id, _)| id.clone())
      .collect();
    out.sort();
    out
  }
}
