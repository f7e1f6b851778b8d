//! Feed collaborators
//!
//! A feed produces one raw batch per call. Network access, wire format and
//! retries are the feed's business; the orchestrator only sees the result.

pub mod usgs;

use crate::error::FetchError;
use crate::model::RawEventDto;

pub use usgs::UsgsFeed;

/// Source of raw seismic event batches
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Feed name for logging
    fn name(&self) -> &str;

    /// Fetch the current batch
    async fn fetch_events(&self) -> Result<Vec<RawEventDto>, FetchError>;
}
