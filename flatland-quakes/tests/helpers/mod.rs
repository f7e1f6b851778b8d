//! Test helpers for flatland-quakes integration tests
//!
//! - ScriptedFeed: FeedSource returning queued responses, optionally gated
//! - raw_event / raw_at: RawEventDto builders

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use flatland_quakes::{FeedSource, FetchError, RawEventDto};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Feed that replays scripted responses
///
/// Responses are consumed in order; the last one repeats forever. An empty
/// script yields empty batches.
pub struct ScriptedFeed {
    responses: Mutex<VecDeque<Result<Vec<RawEventDto>, FetchError>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedFeed {
    pub fn new(responses: Vec<Result<Vec<RawEventDto>, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Every fetch waits for one `notify_one` on the returned handle
    pub fn gated(responses: Vec<Result<Vec<RawEventDto>, FetchError>>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let mut feed = Self::new(responses);
        feed.gate = Some(gate.clone());
        (feed, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<Vec<RawEventDto>, FetchError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}

#[async_trait::async_trait]
impl FeedSource for ScriptedFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_events(&self) -> Result<Vec<RawEventDto>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.next_response()
    }
}

/// Event at a fixed location, one minute old
pub fn raw_event(id: &str, magnitude: f64) -> RawEventDto {
    raw_at(id, 35.0, 139.0, magnitude, Utc::now() - Duration::minutes(1))
}

pub fn raw_at(id: &str, latitude: f64, longitude: f64, magnitude: f64, time: DateTime<Utc>) -> RawEventDto {
    RawEventDto {
        id: id.to_string(),
        latitude,
        longitude,
        depth: 10.0,
        magnitude,
        time,
        significance: 100,
        place: format!("test event {}", id),
    }
}
