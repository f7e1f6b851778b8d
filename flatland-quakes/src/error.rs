//! Error types for flatland-quakes
//!
//! Fetch failures are non-fatal and carry their own type so the orchestrator
//! can report them without tearing down the feed loop.

use flatland_common::events::FetchErrorKind;
use thiserror::Error;

/// Failure reported by a feed collaborator
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network could not be reached
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Request timed out
    #[error("Feed request timed out: {0}")]
    Timeout(String),

    /// Response could not be decoded into events
    #[error("Malformed feed response: {0}")]
    MalformedResponse(String),

    /// Any other failure
    #[error("Feed error: {0}")]
    Unknown(String),
}

impl FetchError {
    /// Category of this failure, for events and outcomes
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::NetworkUnavailable(_) => FetchErrorKind::NetworkUnavailable,
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::MalformedResponse(_) => FetchErrorKind::MalformedResponse,
            FetchError::Unknown(_) => FetchErrorKind::Unknown,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            FetchError::NetworkUnavailable(e.to_string())
        } else if e.is_decode() || e.is_body() {
            FetchError::MalformedResponse(e.to_string())
        } else {
            FetchError::Unknown(e.to_string())
        }
    }
}

/// Main error type for flatland-quakes
#[derive(Error, Debug)]
pub enum Error {
    /// Shared configuration/IO errors
    #[error(transparent)]
    Common(#[from] flatland_common::Error),

    /// Clustering parameters out of range
    #[error("Invalid cluster settings: {0}")]
    InvalidClusterSettings(String),

    /// Configuration value out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON document could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using flatland-quakes Error
pub type Result<T> = std::result::Result<T, Error>;
