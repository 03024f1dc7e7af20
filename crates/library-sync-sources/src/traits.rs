use async_trait::async_trait;
use library_sync_models::{CandidateItem, Chapter, ItemId, Source};
use crate::SourceError;

/// Fetches the current items of a subscribed feed.
///
/// Implementations own transport and parsing; the engine only sees
/// normalized candidates. Errors are per call.
#[async_trait]
pub trait FeedClient: Send + Sync {
    fn client_name(&self) -> &str;

    async fn fetch_items(&self, source: &Source) -> Result<Vec<CandidateItem>, SourceError>;
}

/// Supplies externally annotated segments (sponsor-style overlays) for an item
#[async_trait]
pub trait SegmentProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn fetch_segments(&self, item_id: &ItemId) -> Result<Vec<Chapter>, SourceError>;
}
