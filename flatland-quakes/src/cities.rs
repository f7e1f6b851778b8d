//! City/population lookup
//!
//! The Classifier's population coloring needs the population of the city
//! closest to an event and the largest population among known cities.

use crate::error::Result;
use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// A known city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    #[serde(default)]
    pub country: String,
    pub location: GeoPoint,
    /// City-proper population
    #[serde(default)]
    pub population: Option<u64>,
    /// Metropolitan-area population
    #[serde(default)]
    pub metro_population: Option<u64>,
}

impl City {
    /// Population used for weighting
    ///
    /// With `use_metro`, falls back metro → city → 0. Without it, city → 0.
    pub fn effective_population(&self, use_metro: bool) -> u64 {
        let metro = if use_metro { self.metro_population } else { None };
        metro.or(self.population).unwrap_or(0)
    }
}

/// Population lookup collaborator
pub trait CityLookup: Send + Sync {
    /// Effective population of the city closest to `to`; 0 when unknown
    fn closest_city_population(&self, to: &GeoPoint, use_metro: bool) -> u64;

    /// Largest effective population among all known cities; 0 when empty
    fn max_population(&self, use_metro: bool) -> u64;
}

/// In-memory city table
#[derive(Debug, Clone, Default)]
pub struct CityTable {
    cities: Vec<City>,
}

impl CityTable {
    pub fn new(cities: Vec<City>) -> Self {
        Self { cities }
    }

    /// Load a JSON array of cities
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&content)?;
        info!(path = %path.display(), cities = table.len(), "Loaded city table");
        Ok(table)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let cities: Vec<City> = serde_json::from_str(json)?;
        Ok(Self::new(cities))
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// City closest to `to`, by great-circle distance
    pub fn closest(&self, to: &GeoPoint) -> Option<&City> {
        self.cities
            .iter()
            .map(|c| (c, c.location.distance_km(to)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(c, _)| c)
    }
}

impl CityLookup for CityTable {
    fn closest_city_population(&self, to: &GeoPoint, use_metro: bool) -> u64 {
        self.closest(to)
            .map(|c| c.effective_population(use_metro))
            .unwrap_or(0)
    }

    fn max_population(&self, use_metro: bool) -> u64 {
        max_population(&self.cities, use_metro)
    }
}

/// Largest effective population among `cities`
pub fn max_population(cities: &[City], use_metro: bool) -> u64 {
    cities
        .iter()
        .map(|c| c.effective_population(use_metro))
        .max()
        .unwrap_or(0)
}
