//! Configuration for the earthquake pipeline
//!
//! Loaded from TOML. Every field has a built-in default so a missing or
//! partial file still yields a runnable configuration.
//!
//! ```toml
//! [feed]
//! url = "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/2.5_day.geojson"
//! interval_secs = 300
//!
//! [cluster]
//! enabled = true
//! radius_km = 100.0
//! window_secs = 3600
//!
//! [filter]
//! max_age_secs = 86400
//! min_magnitude = 4.0
//!
//! [display]
//! color_method = "magnitude"
//! recent_threshold_secs = 3600
//! ```

use crate::cities::CityLookup;
use crate::classify::{Classifier, ColorBucket};
use crate::cluster::ClusterSettings;
use crate::error::{Error, Result};
use crate::feed::usgs::{DEFAULT_FEED_URL, DEFAULT_REQUEST_SPACING};
use crate::filter::FilterCriteria;
use crate::geo::GeoPoint;
use crate::orchestrator::{OrchestratorSettings, DEFAULT_FETCH_INTERVAL};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuakeConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum spacing between two requests to the feed host
    #[serde(default = "default_min_request_spacing_ms")]
    pub min_request_spacing_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub max_age_secs: Option<f64>,
    #[serde(default)]
    pub min_magnitude: f64,
    #[serde(default)]
    pub region_center_lat: Option<f64>,
    #[serde(default)]
    pub region_center_lon: Option<f64>,
    #[serde(default)]
    pub region_radius_km: Option<f64>,
    #[serde(default)]
    pub use_metro_population: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_color_method")]
    pub color_method: ColorBucket,
    #[serde(default = "default_recent_threshold_secs")]
    pub recent_threshold_secs: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_interval_secs() -> u64 {
    DEFAULT_FETCH_INTERVAL.as_secs()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_min_request_spacing_ms() -> u64 {
    DEFAULT_REQUEST_SPACING.as_millis() as u64
}

fn default_true() -> bool {
    true
}

fn default_radius_km() -> f64 {
    100.0
}

fn default_window_secs() -> i64 {
    3600
}

fn default_color_method() -> ColorBucket {
    ColorBucket::Magnitude
}

fn default_recent_threshold_secs() -> f64 {
    3600.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            min_request_spacing_ms: default_min_request_spacing_ms(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_km: default_radius_km(),
            window_secs: default_window_secs(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color_method: default_color_method(),
            recent_threshold_secs: default_recent_threshold_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl QuakeConfig {
    /// Load from `path`, or use defaults when there is no file
    ///
    /// An explicitly given path that cannot be read or parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let config: QuakeConfig = flatland_common::config::load_toml(path)?;
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                QuakeConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: QuakeConfig = flatland_common::config::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.feed.interval_secs == 0 {
            return Err(Error::Config("feed.interval_secs must be at least 1".to_string()));
        }
        if self.cluster.enabled {
            self.cluster_settings()?;
        }
        match (
            self.filter.region_center_lat,
            self.filter.region_center_lon,
        ) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::Config(
                    "filter.region_center_lat and region_center_lon must be set together".to_string(),
                ))
            }
            (Some(lat), Some(lon)) if !GeoPoint::new(lat, lon).is_valid() => {
                return Err(Error::Config(format!(
                    "filter region center ({}, {}) is out of range",
                    lat, lon
                )))
            }
            _ => {}
        }
        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.feed.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.timeout_secs)
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_millis(self.feed.min_request_spacing_ms)
    }

    pub fn cluster_settings(&self) -> Result<ClusterSettings> {
        ClusterSettings::new(
            self.cluster.radius_km,
            chrono::Duration::seconds(self.cluster.window_secs),
        )
    }

    pub fn orchestrator_settings(&self) -> Result<OrchestratorSettings> {
        let cluster = if self.cluster.enabled {
            Some(self.cluster_settings()?)
        } else {
            None
        };
        OrchestratorSettings::new(self.fetch_interval(), cluster)
    }

    pub fn filter_criteria(&self) -> FilterCriteria {
        let region_center = match (self.filter.region_center_lat, self.filter.region_center_lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };
        FilterCriteria {
            max_age_seconds: self.filter.max_age_secs,
            min_magnitude: self.filter.min_magnitude,
            region_center,
            region_radius_km: self.filter.region_radius_km,
            use_metro_population_weighting: self.filter.use_metro_population,
        }
    }

    /// Classifier for the configured coloring
    ///
    /// Population weighting follows the filter criteria's metro flag.
    pub fn classifier(&self, cities: Arc<dyn CityLookup>) -> Classifier {
        let criteria = self.filter_criteria();
        Classifier::new(self.display.color_method, cities)
            .with_min_magnitude(criteria.min_magnitude)
            .with_recent_threshold(self.display.recent_threshold_secs)
            .with_metro_population(criteria.use_metro_population_weighting)
    }
}
