//! Event types for the Flatland feed pipeline
//!
//! Provides the FeedEvent enum and the EventBus used to observe the feed
//! orchestrator (diagnostics, status displays, logging sinks).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Category of a failed feed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchErrorKind {
    /// No route to the feed host, DNS failure, connection refused
    NetworkUnavailable,
    /// The request did not complete in time
    Timeout,
    /// The feed answered with something that is not a valid event list
    MalformedResponse,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FetchErrorKind::NetworkUnavailable => "network unavailable",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::MalformedResponse => "malformed response",
            FetchErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Feed pipeline events
///
/// Events are broadcast via EventBus and can be serialized for external
/// status displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    /// A fetch began
    FetchStarted {
        /// Orchestrator generation the fetch belongs to
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// A fetch failed; the previous batch remains current
    FetchFailed {
        generation: u64,
        kind: FetchErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Fetched batch carried the same event IDs as the accepted one
    BatchUnchanged {
        generation: u64,
        /// Number of events in the fetched batch
        event_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A new batch was accepted and handed to subscribers
    BatchUpdated {
        generation: u64,
        /// Events accepted before clustering
        event_count: usize,
        /// Cluster parents delivered to subscribers
        parent_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Invalid events were dropped from a fetched batch
    EventsRejected {
        generation: u64,
        rejected: usize,
        timestamp: DateTime<Utc>,
    },

    /// The periodic feed was stopped
    FeedStopped {
        generation: u64,
        timestamp: DateTime<Utc>,
    },
}

impl FeedEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::FetchStarted { .. } => "FetchStarted",
            FeedEvent::FetchFailed { .. } => "FetchFailed",
            FeedEvent::BatchUnchanged { .. } => "BatchUnchanged",
            FeedEvent::BatchUpdated { .. } => "BatchUpdated",
            FeedEvent::EventsRejected { .. } => "EventsRejected",
            FeedEvent::FeedStopped { .. } => "FeedStopped",
        }
    }
}

/// Broadcast bus for FeedEvents
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use flatland_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FeedEvent,
    ) -> Result<usize, broadcast::error::SendError<FeedEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
