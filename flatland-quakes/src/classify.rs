//! Presentation classification of filtered events
//!
//! Maps an event to the coloring bucket chosen by the user plus a
//! normalized intensity in [0,1] the renderer uses for brightness/opacity.

use crate::cities::CityLookup;
use crate::model::SeismicEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Coloring method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorBucket {
    Age,
    Magnitude,
    MagnitudeRange,
    Population,
    Significance,
}

impl FromStr for ColorBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "age" => Ok(ColorBucket::Age),
            "magnitude" => Ok(ColorBucket::Magnitude),
            "magnitude_range" | "magnituderange" => Ok(ColorBucket::MagnitudeRange),
            "population" => Ok(ColorBucket::Population),
            "significance" => Ok(ColorBucket::Significance),
            other => Err(format!("unknown color method '{}'", other)),
        }
    }
}

/// Batch-wide and per-event values the formulas normalize against
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassificationContext {
    pub max_age_observed_seconds: f64,
    pub max_significance_observed: i64,
    pub closest_city_population: u64,
    pub max_city_population_observed: u64,
    /// Lower edge of magnitude-range bucket 0
    pub min_magnitude: f64,
}

/// Renderer shading for one event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shade {
    /// Normalized intensity in [0,1]
    Intensity(f64),
    /// Whole-magnitude step above the minimum configured magnitude
    RangeIndex(u32),
}

/// Classification of one event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub bucket: ColorBucket,
    pub shade: Shade,
    /// Eligible for the recency indicator
    pub recent: bool,
}

impl ClassificationResult {
    /// Intensity, or `None` for magnitude-range coloring
    pub fn normalized_intensity(&self) -> Option<f64> {
        match self.shade {
            Shade::Intensity(v) => Some(v),
            Shade::RangeIndex(_) => None,
        }
    }

    pub fn range_index(&self) -> Option<u32> {
        match self.shade {
            Shade::RangeIndex(i) => Some(i),
            Shade::Intensity(_) => None,
        }
    }
}

/// Classify one event
///
/// Any zero (or non-positive) denominator yields intensity 0; results are
/// always finite and within [0,1]. `recent` is left false here, see
/// [`Classifier`] for recency.
pub fn classify(
    event: &SeismicEvent,
    method: ColorBucket,
    context: &ClassificationContext,
    now: DateTime<Utc>,
) -> ClassificationResult {
    let shade = match method {
        ColorBucket::Age => {
            let max_age = context.max_age_observed_seconds;
            if max_age > 0.0 {
                Shade::Intensity(unit(1.0 - event.age_seconds(now) / max_age))
            } else {
                Shade::Intensity(0.0)
            }
        }
        ColorBucket::Magnitude => Shade::Intensity(magnitude_intensity(event)),
        ColorBucket::MagnitudeRange => {
            Shade::RangeIndex(magnitude_range_index(event.magnitude, context.min_magnitude))
        }
        ColorBucket::Population => {
            let closest = context.closest_city_population;
            let max = context.max_city_population_observed;
            if closest == 0 || max == 0 {
                Shade::Intensity(0.0)
            } else {
                Shade::Intensity(unit(closest as f64 / max as f64))
            }
        }
        ColorBucket::Significance => {
            if event.significance <= 0 {
                Shade::Intensity(magnitude_intensity(event))
            } else if context.max_significance_observed <= 0 {
                Shade::Intensity(0.0)
            } else {
                Shade::Intensity(unit(
                    event.significance as f64 / context.max_significance_observed as f64,
                ))
            }
        }
    };

    ClassificationResult {
        bucket: method,
        shade,
        recent: false,
    }
}

fn magnitude_intensity(event: &SeismicEvent) -> f64 {
    unit(event.magnitude / 10.0)
}

/// Whole-magnitude step index: floor(magnitude - min), 0 below the minimum
pub fn magnitude_range_index(magnitude: f64, min_magnitude: f64) -> u32 {
    let steps = (magnitude - min_magnitude).floor();
    if steps.is_finite() && steps > 0.0 {
        steps.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Clamp to [0,1], mapping NaN to 0
fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Batch-wide maxima over parents and their children
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub event_count: usize,
    pub max_age_seconds: f64,
    pub max_significance: i64,
    /// ID of the event with the greatest magnitude
    pub largest: Option<String>,
    pub largest_magnitude: Option<f64>,
}

impl BatchStats {
    pub fn from_events(events: &[SeismicEvent], now: DateTime<Utc>) -> Self {
        let mut stats = BatchStats::default();
        let members = events
            .iter()
            .flat_map(|e| std::iter::once(e).chain(e.cluster_children.iter()));

        for event in members {
            stats.event_count += 1;
            stats.max_age_seconds = stats.max_age_seconds.max(event.age_seconds(now));
            stats.max_significance = stats.max_significance.max(event.significance);
            if stats.largest_magnitude.map_or(true, |m| event.magnitude > m) {
                stats.largest_magnitude = Some(event.magnitude);
                stats.largest = Some(event.id.clone());
            }
        }

        stats
    }
}

/// An event paired with its classification
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    pub event: SeismicEvent,
    pub result: ClassificationResult,
}

/// Per-renderer classifier
///
/// Owns the renderer's color method and population source; computes the
/// batch context once and classifies every event against it.
#[derive(Clone)]
pub struct Classifier {
    method: ColorBucket,
    min_magnitude: f64,
    recent_threshold_seconds: Option<f64>,
    use_metro_population: bool,
    cities: Arc<dyn CityLookup>,
}

impl Classifier {
    pub fn new(method: ColorBucket, cities: Arc<dyn CityLookup>) -> Self {
        Self {
            method,
            min_magnitude: 0.0,
            recent_threshold_seconds: None,
            use_metro_population: false,
            cities,
        }
    }

    pub fn with_min_magnitude(mut self, min_magnitude: f64) -> Self {
        self.min_magnitude = min_magnitude;
        self
    }

    /// Events at most this old are flagged `recent`
    pub fn with_recent_threshold(mut self, seconds: f64) -> Self {
        self.recent_threshold_seconds = Some(seconds);
        self
    }

    pub fn with_metro_population(mut self, use_metro: bool) -> Self {
        self.use_metro_population = use_metro;
        self
    }

    pub fn method(&self) -> ColorBucket {
        self.method
    }

    pub fn min_magnitude(&self) -> f64 {
        self.min_magnitude
    }

    pub fn uses_metro_population(&self) -> bool {
        self.use_metro_population
    }

    /// True if `event` qualifies for the recency indicator
    pub fn is_recent(&self, event: &SeismicEvent, now: DateTime<Utc>) -> bool {
        match self.recent_threshold_seconds {
            Some(threshold) => event.age_seconds(now) <= threshold,
            None => false,
        }
    }

    /// Classify every event of an already-filtered batch, keeping order
    pub fn classify_batch(&self, events: &[SeismicEvent], now: DateTime<Utc>) -> Vec<ClassifiedEvent> {
        let stats = BatchStats::from_events(events, now);
        let base = ClassificationContext {
            max_age_observed_seconds: stats.max_age_seconds,
            max_significance_observed: stats.max_significance,
            closest_city_population: 0,
            max_city_population_observed: 0,
            min_magnitude: self.min_magnitude,
        };
        let max_city_population = if self.method == ColorBucket::Population {
            self.cities.max_population(self.use_metro_population)
        } else {
            0
        };

        events
            .iter()
            .map(|event| {
                let mut context = base;
                if self.method == ColorBucket::Population {
                    context.closest_city_population = self
                        .cities
                        .closest_city_population(&event.location, self.use_metro_population);
                    context.max_city_population_observed = max_city_population;
                }
                let mut result = classify(event, self.method, &context, now);
                result.recent = self.is_recent(event, now);
                ClassifiedEvent {
                    event: event.clone(),
                    result,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("method", &self.method)
            .field("min_magnitude", &self.min_magnitude)
            .field("recent_threshold_seconds", &self.recent_threshold_seconds)
            .field("use_metro_population", &self.use_metro_population)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cities::{City, CityTable};
    use crate::geo::GeoPoint;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn event(magnitude: f64, significance: i64, age: Duration) -> SeismicEvent {
        SeismicEvent {
            id: format!("m{}-s{}", magnitude, significance),
            location: GeoPoint::new(35.0, 139.0),
            depth_km: 10.0,
            magnitude,
            time: now() - age,
            significance,
            place: String::new(),
            cluster_children: Vec::new(),
        }
    }

    fn context() -> ClassificationContext {
        ClassificationContext {
            max_age_observed_seconds: 1000.0,
            max_significance_observed: 800,
            closest_city_population: 500,
            max_city_population_observed: 1000,
            min_magnitude: 2.5,
        }
    }

    #[test]
    fn test_age_fades() {
        let fresh = classify(&event(4.0, 0, Duration::zero()), ColorBucket::Age, &context(), now());
        let half = classify(&event(4.0, 0, Duration::seconds(500)), ColorBucket::Age, &context(), now());
        let old = classify(&event(4.0, 0, Duration::seconds(5000)), ColorBucket::Age, &context(), now());
        assert_eq!(fresh.normalized_intensity(), Some(1.0));
        assert_eq!(half.normalized_intensity(), Some(0.5));
        assert_eq!(old.normalized_intensity(), Some(0.0));
    }

    #[test]
    fn test_magnitude_scaled_and_clamped() {
        let r = classify(&event(6.5, 0, Duration::zero()), ColorBucket::Magnitude, &context(), now());
        assert_eq!(r.normalized_intensity(), Some(0.65));
        let r = classify(&event(12.0, 0, Duration::zero()), ColorBucket::Magnitude, &context(), now());
        assert_eq!(r.normalized_intensity(), Some(1.0));
        let r = classify(&event(-1.0, 0, Duration::zero()), ColorBucket::Magnitude, &context(), now());
        assert_eq!(r.normalized_intensity(), Some(0.0));
    }

    #[test]
    fn test_magnitude_range_index() {
        let r = classify(&event(5.7, 0, Duration::zero()), ColorBucket::MagnitudeRange, &context(), now());
        assert_eq!(r.range_index(), Some(3));
        assert_eq!(r.normalized_intensity(), None);
        assert_eq!(magnitude_range_index(2.5, 2.5), 0);
        assert_eq!(magnitude_range_index(1.0, 2.5), 0);
        assert_eq!(magnitude_range_index(f64::NAN, 2.5), 0);
    }

    #[test]
    fn test_population_missing_data_is_zero() {
        let mut ctx = context();
        ctx.closest_city_population = 0;
        let r = classify(&event(5.0, 0, Duration::zero()), ColorBucket::Population, &ctx, now());
        assert_eq!(r.normalized_intensity(), Some(0.0));

        let mut ctx = context();
        ctx.max_city_population_observed = 0;
        let r = classify(&event(5.0, 0, Duration::zero()), ColorBucket::Population, &ctx, now());
        assert_eq!(r.normalized_intensity(), Some(0.0));

        let r = classify(&event(5.0, 0, Duration::zero()), ColorBucket::Population, &context(), now());
        assert_eq!(r.normalized_intensity(), Some(0.5));
    }

    #[test]
    fn test_significance_falls_back_to_magnitude() {
        let r = classify(&event(7.0, 0, Duration::zero()), ColorBucket::Significance, &context(), now());
        assert_eq!(r.normalized_intensity(), Some(0.7));
        let r = classify(&event(7.0, 400, Duration::zero()), ColorBucket::Significance, &context(), now());
        assert_eq!(r.normalized_intensity(), Some(0.5));
    }

    #[test]
    fn test_zero_denominators_stay_in_bounds() {
        let zero = ClassificationContext::default();
        for method in [
            ColorBucket::Age,
            ColorBucket::Magnitude,
            ColorBucket::Population,
            ColorBucket::Significance,
        ] {
            for e in [
                event(0.0, 0, Duration::zero()),
                event(9.9, 1500, Duration::days(10)),
                event(3.0, 10, Duration::seconds(-60)),
            ] {
                let v = classify(&e, method, &zero, now()).normalized_intensity().unwrap();
                assert!((0.0..=1.0).contains(&v), "{:?} gave {}", method, v);
                let v = classify(&e, method, &context(), now()).normalized_intensity().unwrap();
                assert!((0.0..=1.0).contains(&v), "{:?} gave {}", method, v);
            }
        }
    }

    #[test]
    fn test_color_bucket_from_str() {
        assert_eq!("magnitude_range".parse::<ColorBucket>(), Ok(ColorBucket::MagnitudeRange));
        assert_eq!(" Age ".parse::<ColorBucket>(), Ok(ColorBucket::Age));
        assert!("brightness".parse::<ColorBucket>().is_err());
    }

    #[test]
    fn test_batch_stats() {
        let mut parent = event(5.0, 300, Duration::seconds(100));
        parent.cluster_children.push(event(4.0, 900, Duration::seconds(4000)));
        let other = event(6.0, 100, Duration::seconds(10));

        let stats = BatchStats::from_events(&[parent, other], now());
        assert_eq!(stats.event_count, 3);
        assert_eq!(stats.max_age_seconds, 4000.0);
        assert_eq!(stats.max_significance, 900);
        assert_eq!(stats.largest_magnitude, Some(6.0));
    }

    #[test]
    fn test_classifier_population_and_recent() {
        let cities = CityTable::new(vec![City {
            name: "Tokyo".to_string(),
            country: "JP".to_string(),
            location: GeoPoint::new(35.68, 139.69),
            population: Some(14_000_000),
            metro_population: Some(37_000_000),
        }]);
        let classifier = Classifier::new(ColorBucket::Population, Arc::new(cities))
            .with_metro_population(true)
            .with_recent_threshold(600.0);

        let events = vec![
            event(5.0, 0, Duration::seconds(60)),
            event(4.0, 0, Duration::seconds(7200)),
        ];
        let out = classifier.classify_batch(&events, now());

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].result.normalized_intensity(), Some(1.0));
        assert!(out[0].result.recent);
        assert!(!out[1].result.recent);
        assert_eq!(out[1].result.bucket, ColorBucket::Population);
    }
}
