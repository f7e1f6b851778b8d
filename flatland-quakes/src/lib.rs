//! # Flatland Earthquake Pipeline (flatland-quakes)
//!
//! Ingests live seismic event feeds, deduplicates and clusters them, and
//! hands stable result sets to any number of independent renderers.
//!
//! Data flow: FeedOrchestrator → Deduplicator → ClusterEngine → subscribers,
//! each subscriber then running its own Filter + Classifier pass (QuakeView).

pub mod cities;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod dedup;
pub mod error;
pub mod feed;
pub mod filter;
pub mod geo;
pub mod model;
pub mod orchestrator;
pub mod view;

pub use cities::{City, CityLookup, CityTable};
pub use classify::{ClassificationContext, ClassificationResult, Classifier, ColorBucket};
pub use cluster::{ClusterEngine, ClusterSettings};
pub use error::{Error, FetchError, Result};
pub use feed::FeedSource;
pub use filter::FilterCriteria;
pub use geo::GeoPoint;
pub use model::{RawEventDto, SeismicEvent};
pub use orchestrator::{FeedOrchestrator, FeedState, FetchOutcome, OrchestratorSettings, SubscriptionHandle};
pub use view::QuakeView;
