//! Seismic event data model
//!
//! Events are created at ingestion from feed DTOs, decorated with cluster
//! children by the ClusterEngine, and read-only afterwards.

use crate::geo::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// One event as delivered by a feed collaborator, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventDto {
    /// Source event code
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Kilometers
    pub depth: f64,
    pub magnitude: f64,
    pub time: DateTime<Utc>,
    pub significance: i64,
    #[serde(default)]
    pub place: String,
}

/// Normalized seismic event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicEvent {
    /// Stable external identifier, unique within a batch
    pub id: String,
    pub location: GeoPoint,
    /// Kilometers, >= 0
    pub depth_km: f64,
    pub magnitude: f64,
    /// Occurrence time (UTC)
    pub time: DateTime<Utc>,
    /// Externally supplied importance score, >= 0
    pub significance: i64,
    /// Human-readable description, opaque to the pipeline
    pub place: String,
    /// Events grouped under this one, ascending by time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_children: Vec<SeismicEvent>,
}

impl SeismicEvent {
    /// True iff clustering grouped other events under this one
    pub fn is_cluster_parent(&self) -> bool {
        !self.cluster_children.is_empty()
    }

    /// Age in seconds relative to `now`
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        flatland_common::time::age_seconds(self.time, now)
    }

    /// Greatest magnitude among this event and its cluster children
    pub fn effective_magnitude(&self) -> f64 {
        self.cluster_children
            .iter()
            .map(|c| c.magnitude)
            .fold(self.magnitude, f64::max)
    }

    /// Number of events represented (self plus children)
    pub fn member_count(&self) -> usize {
        1 + self.cluster_children.len()
    }
}

impl TryFrom<RawEventDto> for SeismicEvent {
    type Error = RejectReason;

    fn try_from(raw: RawEventDto) -> Result<Self, Self::Error> {
        if raw.id.trim().is_empty() {
            return Err(RejectReason::MissingId);
        }
        let location = GeoPoint::new(raw.latitude, raw.longitude);
        if !location.is_valid() {
            return Err(RejectReason::InvalidLocation);
        }
        if !raw.depth.is_finite() || raw.depth < 0.0 {
            return Err(RejectReason::InvalidDepth);
        }
        if !raw.magnitude.is_finite() {
            return Err(RejectReason::InvalidMagnitude);
        }
        if raw.significance < 0 {
            return Err(RejectReason::NegativeSignificance);
        }

        Ok(SeismicEvent {
            id: raw.id,
            location,
            depth_km: raw.depth,
            magnitude: raw.magnitude,
            time: raw.time,
            significance: raw.significance,
            place: raw.place,
            cluster_children: Vec::new(),
        })
    }
}

/// Why an incoming event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    MissingId,
    DuplicateId,
    InvalidLocation,
    InvalidDepth,
    InvalidMagnitude,
    NegativeSignificance,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::MissingId => "missing id",
            RejectReason::DuplicateId => "duplicate id",
            RejectReason::InvalidLocation => "coordinates missing or out of range",
            RejectReason::InvalidDepth => "depth negative or not finite",
            RejectReason::InvalidMagnitude => "magnitude not finite",
            RejectReason::NegativeSignificance => "negative significance",
        };
        f.write_str(text)
    }
}

/// A dropped event and the reason it was dropped
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub id: String,
    pub reason: RejectReason,
}

/// Result of validating a fetched batch
#[derive(Debug, Clone, Default)]
pub struct ValidatedBatch {
    /// Valid events in feed order
    pub events: Vec<SeismicEvent>,
    pub rejected: Vec<Rejection>,
}

impl ValidatedBatch {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Convert a raw feed batch into validated events
///
/// Invalid events are dropped individually. When an ID repeats, the first
/// occurrence is kept and later ones are rejected.
pub fn validate_batch(raw: Vec<RawEventDto>) -> ValidatedBatch {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut batch = ValidatedBatch {
        events: Vec::with_capacity(raw.len()),
        rejected: Vec::new(),
    };

    for dto in raw {
        let id = dto.id.clone();
        match SeismicEvent::try_from(dto) {
            Ok(event) => {
                if seen.insert(event.id.clone()) {
                    batch.events.push(event);
                } else {
                    batch.rejected.push(Rejection {
                        id,
                        reason: RejectReason::DuplicateId,
                    });
                }
            }
            Err(reason) => batch.rejected.push(Rejection { id, reason }),
        }
    }

    if !batch.rejected.is_empty() {
        warn!(
            accepted = batch.events.len(),
            rejected = batch.rejected.len(),
            "Dropped invalid events from feed batch"
        );
    }

    batch
}
