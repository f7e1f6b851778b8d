//! # Flatland Common Library
//!
//! Shared code for the Flatland earthquake pipeline crates:
//! - Error type and result alias
//! - Configuration file resolution and TOML loading
//! - Timestamp and age helpers
//! - Pipeline event types (FeedEvent) and the EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, FeedEvent};
