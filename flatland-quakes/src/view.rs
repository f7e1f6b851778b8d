//! One renderer's pass over a clustered batch
//!
//! Each renderer (globe, flat maps) owns a QuakeView with its own criteria
//! and coloring. All views consume the same clustered batch independently.

use crate::classify::{ClassifiedEvent, Classifier};
use crate::filter::{filter_at, FilterCriteria};
use crate::model::SeismicEvent;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Filter + classify configuration for a single renderer
#[derive(Debug, Clone)]
pub struct QuakeView {
    name: String,
    criteria: FilterCriteria,
    classifier: Classifier,
}

impl QuakeView {
    pub fn new(name: impl Into<String>, criteria: FilterCriteria, classifier: Classifier) -> Self {
        Self {
            name: name.into(),
            criteria,
            classifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Filter then classify at the current wall-clock time
    pub fn render(&self, batch: &[SeismicEvent]) -> Vec<ClassifiedEvent> {
        self.render_at(batch, flatland_common::time::now())
    }

    /// Filter then classify at `now`
    pub fn render_at(&self, batch: &[SeismicEvent], now: DateTime<Utc>) -> Vec<ClassifiedEvent> {
        let visible = filter_at(batch, &self.criteria, now);
        let classified = self.classifier.classify_batch(&visible, now);
        debug!(
            view = %self.name,
            input = batch.len(),
            visible = classified.len(),
            "View pass complete"
        );
        classified
    }
}
