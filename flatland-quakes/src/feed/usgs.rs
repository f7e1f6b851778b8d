//! USGS GeoJSON summary feed client
//!
//! Fetches one of the USGS real-time summary feeds (e.g. `all_day.geojson`)
//! and maps each feature onto a RawEventDto.

use crate::error::FetchError;
use crate::feed::FeedSource;
use crate::model::RawEventDto;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_FEED_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/2.5_day.geojson";
const USER_AGENT: &str = "Flatland/0.1.0";
/// Default minimum spacing between requests; USGS refreshes summaries every minute
pub const DEFAULT_REQUEST_SPACING: Duration = Duration::from_secs(5);

/// Top-level GeoJSON document
#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    id: String,
    properties: Properties,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Properties {
    mag: Option<f64>,
    place: Option<String>,
    /// Milliseconds since the Unix epoch
    time: i64,
    sig: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// [longitude, latitude, depth_km]
    coordinates: Vec<f64>,
}

/// Parse a USGS GeoJSON document
///
/// Features with an unrepresentable timestamp are skipped. Missing
/// magnitude or coordinates become NaN and are dropped later by batch
/// validation, so they are counted there.
pub fn parse_geojson(body: &str) -> Result<Vec<RawEventDto>, FetchError> {
    let collection: FeatureCollection =
        serde_json::from_str(body).map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

    let mut events = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let time = match Utc.timestamp_millis_opt(feature.properties.time).single() {
            Some(t) => t,
            None => {
                tracing::warn!(id = %feature.id, time = feature.properties.time, "Skipping feature with invalid time");
                continue;
            }
        };
        let coords = &feature.geometry.coordinates;
        let coord = |i: usize| coords.get(i).copied().unwrap_or(f64::NAN);
        let (longitude, latitude) = (coord(0), coord(1));
        // USGS reports events above the datum with negative depth; NaN stays NaN
        let depth = match coord(2) {
            d if d < 0.0 => 0.0,
            d => d,
        };

        events.push(RawEventDto {
            id: feature.id,
            longitude,
            latitude,
            depth,
            magnitude: feature.properties.mag.unwrap_or(f64::NAN),
            time,
            significance: feature.properties.sig.unwrap_or(0),
            place: feature.properties.place.unwrap_or_default(),
        });
    }

    Ok(events)
}

/// Holds back a request until `min_spacing` has passed since the previous one
///
/// Only matters for forced fetches; timer ticks are normally much further apart.
struct RequestSpacing {
    min_spacing: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl RequestSpacing {
    fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            next_allowed: Mutex::new(None),
        }
    }

    async fn acquire(&self) {
        let mut next_allowed = self.next_allowed.lock().await;

        if let Some(at) = *next_allowed {
            let now = Instant::now();
            if at > now {
                tracing::debug!(delay_ms = (at - now).as_millis() as u64, "Spacing USGS request");
                tokio::time::sleep_until(at).await;
            }
        }

        *next_allowed = Some(Instant::now() + self.min_spacing);
    }
}

/// USGS summary feed client
pub struct UsgsFeed {
    http_client: reqwest::Client,
    spacing: RequestSpacing,
    url: String,
}

impl UsgsFeed {
    /// `min_spacing` of zero disables request spacing
    pub fn new(url: impl Into<String>, timeout: Duration, min_spacing: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unknown(e.to_string()))?;

        Ok(Self {
            http_client,
            spacing: RequestSpacing::new(min_spacing),
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl FeedSource for UsgsFeed {
    fn name(&self) -> &str {
        "usgs"
    }

    async fn fetch_events(&self) -> Result<Vec<RawEventDto>, FetchError> {
        self.spacing.acquire().await;

        tracing::debug!(url = %self.url, "Requesting USGS feed");

        let response = self.http_client.get(&self.url).send().await?;
        let status = response.status();

        if status.is_server_error() {
            return Err(FetchError::NetworkUnavailable(format!(
                "feed host returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(FetchError::Unknown(format!("feed returned {}", status)));
        }

        let body = response.text().await?;
        let events = parse_geojson(&body)?;

        tracing::debug!(count = events.len(), "USGS feed parsed");
        Ok(events)
    }
}
