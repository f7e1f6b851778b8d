//! End-to-end pipeline tests
//!
//! Wire feed → validation → clustering → per-view filter/classify without
//! the orchestrator, checking the batch-level properties each stage keeps.

mod helpers;

use chrono::{Duration, TimeZone, Utc};
use flatland_quakes::classify::{classify, ClassificationContext, ColorBucket};
use flatland_quakes::dedup::are_equivalent;
use flatland_quakes::feed::usgs::parse_geojson;
use flatland_quakes::filter::filter_at;
use flatland_quakes::model::validate_batch;
use flatland_quakes::{City, Classifier, ClusterEngine, ClusterSettings, CityTable, FilterCriteria, GeoPoint, QuakeView, SeismicEvent};
use helpers::raw_at;
use std::sync::Arc;

fn engine(radius_km: f64, window: Duration) -> ClusterEngine {
    ClusterEngine::new(ClusterSettings::new(radius_km, window).unwrap())
}

fn validated(raw: Vec<flatland_quakes::RawEventDto>) -> Vec<SeismicEvent> {
    validate_batch(raw).events
}

// ============================================================================
// Feed to clustered batch
// ============================================================================

const HUALIEN_SEQUENCE: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "id": "tw-fore",
         "properties": {"mag": 4.5, "place": "12 km S of Hualien City, Taiwan", "time": 1717196400000, "sig": 312},
         "geometry": {"type": "Point", "coordinates": [121.60, 23.88, 15.0]}},
        {"type": "Feature", "id": "tw-main",
         "properties": {"mag": 5.1, "place": "9 km S of Hualien City, Taiwan", "time": 1717197000000, "sig": 400},
         "geometry": {"type": "Point", "coordinates": [121.62, 23.90, 12.0]}},
        {"type": "Feature", "id": "tw-after",
         "properties": {"mag": 3.9, "place": "10 km SE of Hualien City, Taiwan", "time": 1717197600000, "sig": 234},
         "geometry": {"type": "Point", "coordinates": [121.65, 23.89, 10.0]}},
        {"type": "Feature", "id": "ak-far",
         "properties": {"mag": 2.8, "place": "Alaska", "time": 1717197300000, "sig": 121},
         "geometry": {"type": "Point", "coordinates": [-150.1, 61.3, 40.0]}},
        {"type": "Feature", "id": "broken",
         "properties": {"mag": null, "place": "nowhere", "time": 1717197300000, "sig": 0},
         "geometry": {"type": "Point", "coordinates": [10.0, 10.0, 5.0]}}
    ]
}"#;

/// Given a USGS body with a three-shock sequence, a distant event and a broken record
/// When parsed, validated and clustered
/// Then the sequence collapses into one parent and the broken record is counted
#[test]
fn test_feed_body_to_clustered_batch() {
    let raw = parse_geojson(HUALIEN_SEQUENCE).unwrap();
    let batch = validate_batch(raw);
    assert_eq!(batch.rejected_count(), 1);
    assert_eq!(batch.events.len(), 4);

    let clustered = engine(50.0, Duration::hours(1)).cluster(&batch.events);
    assert_eq!(clustered.len(), 2);

    let parent = clustered.iter().find(|e| e.id == "tw-main").expect("mainshock parent");
    assert_eq!(parent.magnitude, 5.1);
    let children: Vec<f64> = parent.cluster_children.iter().map(|c| c.magnitude).collect();
    assert_eq!(children, vec![4.5, 3.9], "children ordered by time");

    let alaska = clustered.iter().find(|e| e.id == "ak-far").expect("distant event");
    assert!(!alaska.is_cluster_parent());
}

/// Given the same feed body twice with features reordered
/// When validated
/// Then the batches are equivalent and cluster identically
#[test]
fn test_reordered_feed_is_equivalent_and_deterministic() {
    let first = validated(parse_geojson(HUALIEN_SEQUENCE).unwrap());
    let mut second = first.clone();
    second.reverse();

    assert!(are_equivalent(&first, &second));

    let engine = engine(50.0, Duration::hours(1));
    assert_eq!(engine.cluster(&first), engine.cluster(&first));
}

// ============================================================================
// Views over a shared batch
// ============================================================================

fn cities() -> Arc<CityTable> {
    Arc::new(CityTable::new(vec![
        City {
            name: "Hualien City".to_string(),
            country: "TW".to_string(),
            location: GeoPoint::new(23.98, 121.60),
            population: Some(100_000),
            metro_population: Some(320_000),
        },
        City {
            name: "Taipei".to_string(),
            country: "TW".to_string(),
            location: GeoPoint::new(25.03, 121.56),
            population: Some(2_600_000),
            metro_population: Some(7_000_000),
        },
        City {
            name: "Anchorage".to_string(),
            country: "US".to_string(),
            location: GeoPoint::new(61.22, -149.90),
            population: Some(290_000),
            metro_population: None,
        },
    ]))
}

/// Given one clustered batch and two views with different criteria
/// When each view renders
/// Then each sees its own subset and the shared batch is untouched
#[test]
fn test_views_render_independently() {
    let now = Utc.timestamp_millis_opt(1717200000000).unwrap();
    let batch = engine(50.0, Duration::hours(1)).cluster(&validated(parse_geojson(HUALIEN_SEQUENCE).unwrap()));
    let snapshot = batch.clone();

    let globe = QuakeView::new(
        "globe",
        FilterCriteria::pass_all(),
        Classifier::new(ColorBucket::Magnitude, cities()),
    );
    let taiwan = QuakeView::new(
        "taiwan",
        FilterCriteria::pass_all()
            .with_min_magnitude(3.0)
            .with_region(GeoPoint::new(23.9, 121.6), 500.0),
        Classifier::new(ColorBucket::Population, cities()).with_metro_population(true),
    );

    let everything = globe.render_at(&batch, now);
    assert_eq!(everything.len(), 2);

    let local = taiwan.render_at(&batch, now);
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].event.id, "tw-main");
    // Closest city is Hualien (metro 320k) against Taipei's 7M
    let intensity = local[0].result.normalized_intensity().unwrap();
    assert!((intensity - 320_000.0 / 7_000_000.0).abs() < 1e-9);

    assert_eq!(batch, snapshot);
}

/// Given events spread over the last hours
/// When rendered with age coloring
/// Then the newest is brightest and every intensity stays in [0,1]
#[test]
fn test_age_coloring_orders_by_recency() {
    let now = Utc::now();
    let batch = validated(vec![
        raw_at("old", 10.0, 10.0, 3.0, now - Duration::hours(6)),
        raw_at("mid", 20.0, 20.0, 3.0, now - Duration::hours(3)),
        raw_at("new", 30.0, 30.0, 3.0, now - Duration::minutes(5)),
    ]);

    let view = QuakeView::new(
        "age",
        FilterCriteria::pass_all(),
        Classifier::new(ColorBucket::Age, Arc::new(CityTable::default())).with_recent_threshold(3600.0),
    );
    let rendered = view.render_at(&batch, now);

    let intensity = |id: &str| {
        rendered
            .iter()
            .find(|c| c.event.id == id)
            .and_then(|c| c.result.normalized_intensity())
            .unwrap()
    };
    assert_eq!(intensity("old"), 0.0);
    assert!(intensity("new") > intensity("mid"));
    assert!(intensity("new") <= 1.0);

    let recent: Vec<&str> = rendered.iter().filter(|c| c.result.recent).map(|c| c.event.id.as_str()).collect();
    assert_eq!(recent, vec!["new"]);
}

// ============================================================================
// Batch-level properties
// ============================================================================

fn scattered_batch(now: chrono::DateTime<Utc>) -> Vec<SeismicEvent> {
    let raw = (0..40)
        .map(|i| {
            let i = i as f64;
            raw_at(
                &format!("ev{}", i),
                -60.0 + (i * 3.7) % 120.0,
                -170.0 + (i * 17.3) % 340.0,
                1.0 + (i * 0.37) % 7.0,
                now - Duration::seconds((i * 911.0) as i64),
            )
        })
        .collect();
    validated(raw)
}

/// Tightening the magnitude threshold never grows the result
#[test]
fn test_filter_monotonic_over_clustered_batch() {
    let now = Utc::now();
    let batch = engine(800.0, Duration::hours(2)).cluster(&scattered_batch(now));

    let mut previous = usize::MAX;
    for step in 0..=16 {
        let criteria = FilterCriteria::pass_all().with_min_magnitude(step as f64 * 0.5);
        let count = filter_at(&batch, &criteria, now).len();
        assert!(count <= previous, "min magnitude {} grew result", step as f64 * 0.5);
        previous = count;
    }
}

/// Every parent dominates its children and no event is lost or duplicated
#[test]
fn test_clustering_conserves_events() {
    let now = Utc::now();
    let input = scattered_batch(now);
    let clustered = engine(1500.0, Duration::hours(3)).cluster(&input);

    let mut ids: Vec<&str> = clustered
        .iter()
        .flat_map(|p| std::iter::once(p).chain(p.cluster_children.iter()))
        .map(|e| e.id.as_str())
        .collect();
    ids.sort();
    let mut expected: Vec<&str> = input.iter().map(|e| e.id.as_str()).collect();
    expected.sort();
    assert_eq!(ids, expected);

    for parent in &clustered {
        for child in &parent.cluster_children {
            assert!(parent.magnitude >= child.magnitude);
            assert!(child.cluster_children.is_empty());
        }
    }
}

/// Intensity stays in [0,1] for every method but MagnitudeRange
#[test]
fn test_classifier_bounds() {
    let now = Utc::now();
    let batch = scattered_batch(now);
    let methods = [
        ColorBucket::Age,
        ColorBucket::Magnitude,
        ColorBucket::Population,
        ColorBucket::Significance,
    ];
    let contexts = [
        ClassificationContext::default(),
        ClassificationContext {
            max_age_observed_seconds: 1.0,
            max_significance_observed: 1,
            closest_city_population: 5_000_000,
            max_city_population_observed: 10,
            min_magnitude: 0.0,
        },
        ClassificationContext {
            max_age_observed_seconds: 86_400.0,
            max_significance_observed: 1000,
            closest_city_population: 0,
            max_city_population_observed: 8_000_000,
            min_magnitude: 2.5,
        },
    ];

    for event in &batch {
        for method in methods {
            for context in &contexts {
                let intensity = classify(event, method, context, now)
                    .normalized_intensity()
                    .expect("intensity for non-range method");
                assert!(
                    (0.0..=1.0).contains(&intensity),
                    "{:?} gave {} for {}",
                    method,
                    intensity,
                    event.id
                );
            }
        }
    }
}
