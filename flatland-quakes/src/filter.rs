//! Composable event filters
//!
//! Age, magnitude and region predicates, AND-composed. Filtering returns a
//! new order-preserving subsequence; the input is never modified.

use crate::geo::GeoPoint;
use crate::model::SeismicEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter criteria, immutable for one evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Oldest age (seconds) that still passes; `None` means no age limit
    pub max_age_seconds: Option<f64>,
    /// Minimum effective magnitude
    pub min_magnitude: f64,
    /// Center of the region of interest; unset disables the region stage
    pub region_center: Option<GeoPoint>,
    /// Radius around `region_center`
    pub region_radius_km: Option<f64>,
    /// Prefer metro over city-proper population for proximity weighting
    ///
    /// Not a filter stage. Carried with the criteria so the renderer's
    /// population Classifier is built from the same settings (see
    /// `QuakeConfig::classifier`).
    pub use_metro_population_weighting: bool,
}

impl FilterCriteria {
    /// Criteria that pass everything
    pub fn pass_all() -> Self {
        Self::default()
    }

    pub fn with_max_age(mut self, seconds: f64) -> Self {
        self.max_age_seconds = Some(seconds);
        self
    }

    pub fn with_min_magnitude(mut self, magnitude: f64) -> Self {
        self.min_magnitude = magnitude;
        self
    }

    pub fn with_region(mut self, center: GeoPoint, radius_km: f64) -> Self {
        self.region_center = Some(center);
        self.region_radius_km = Some(radius_km);
        self
    }

    fn passes_age(&self, event: &SeismicEvent, now: DateTime<Utc>) -> bool {
        match self.max_age_seconds {
            Some(max_age) => event.age_seconds(now) <= max_age,
            None => true,
        }
    }

    fn passes_magnitude(&self, event: &SeismicEvent) -> bool {
        event.effective_magnitude() >= self.min_magnitude
    }

    fn passes_region(&self, event: &SeismicEvent) -> bool {
        match (self.region_center, self.region_radius_km) {
            (Some(center), Some(radius_km)) => center.distance_km(&event.location) <= radius_km,
            // A center without a radius cannot exclude anything
            _ => true,
        }
    }

    /// True if `event` passes every stage at time `now`
    pub fn matches(&self, event: &SeismicEvent, now: DateTime<Utc>) -> bool {
        self.passes_age(event, now) && self.passes_magnitude(event) && self.passes_region(event)
    }
}

/// Filter against the current wall clock
///
/// Re-filtering the same batch later yields fewer events as they age out.
pub fn filter(events: &[SeismicEvent], criteria: &FilterCriteria) -> Vec<SeismicEvent> {
    filter_at(events, criteria, flatland_common::time::now())
}

/// Filter against an explicit evaluation time
pub fn filter_at(
    events: &[SeismicEvent],
    criteria: &FilterCriteria,
    now: DateTime<Utc>,
) -> Vec<SeismicEvent> {
    events
        .iter()
        .filter(|e| criteria.matches(e, now))
        .cloned()
        .collect()
}
