use chrono::Utc;
use futures::stream::{self, StreamExt};
use library_sync_models::{Destination, ItemId, SourceId};
use library_sync_sources::FeedClient;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use crate::cache::FeedCache;
use crate::error::{LibraryError, SyncError};
use crate::store::LibraryHandle;
use crate::triage::{place_due_deferred, place_items, PlacedItem, TriageDefaults};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOptions {
    /// Restrict the run to these sources; all active sources otherwise
    pub sources: Option<Vec<SourceId>>,
    /// Replay cached feed results instead of calling the feed client
    pub use_feed_cache: bool,
}

/// Items placed by one run, for notification and badge counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub new_items_by_source: BTreeMap<SourceId, Vec<ItemId>>,
    pub new_items_by_destination: BTreeMap<Destination, Vec<ItemId>>,
    pub failed_sources: BTreeMap<SourceId, String>,
    pub sources_synced: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl SyncResult {
    fn record(&mut self, placed: &[PlacedItem]) {
        for item in placed {
            if let Some(source_id) = &item.source_id {
                self.new_items_by_source
                    .entry(source_id.clone())
                    .or_default()
                    .push(item.item_id.clone());
            }
            self.new_items_by_destination
                .entry(item.destination)
                .or_default()
                .push(item.item_id.clone());
        }
    }

    fn finish(mut self, start: Instant) -> Self {
        self.duration_ms = start.elapsed().as_millis() as u64;
        self
    }

    pub fn total_new(&self) -> usize {
        self.new_items_by_destination.values().map(Vec::len).sum()
    }

    pub fn new_in(&self, destination: Destination) -> usize {
        self.new_items_by_destination.get(&destination).map(Vec::len).unwrap_or(0)
    }
}

/// Fans feed fetches out across sources and feeds the results, one source
/// at a time, through triage and a commit.
pub struct SyncOrchestrator {
    handle: Arc<LibraryHandle>,
    client: Arc<dyn FeedClient>,
    defaults: TriageDefaults,
    max_concurrent_fetches: usize,
    feed_cache: Option<FeedCache>,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(handle: Arc<LibraryHandle>, client: Arc<dyn FeedClient>) -> Self {
        Self {
            handle,
            client,
            defaults: TriageDefaults::default(),
            max_concurrent_fetches: 8,
            feed_cache: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: TriageDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// 0 fetches every source at once
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max;
        self
    }

    pub fn with_feed_cache(mut self, cache: FeedCache) -> Self {
        self.feed_cache = Some(cache);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn handle(&self) -> &Arc<LibraryHandle> {
        &self.handle
    }

    fn feed_client(&self, use_feed_cache: bool) -> (Arc<dyn FeedClient>, bool) {
        match (&self.feed_cache, use_feed_cache) {
            (Some(cache), true) => (Arc::new(cache.clone()), true),
            (None, true) => {
                warn!("Feed cache replay requested without a feed cache, fetching live");
                (self.client.clone(), false)
            }
            _ => (self.client.clone(), false),
        }
    }

    /// Run one synchronization.
    ///
    /// A failing fetch is recorded and skipped. Every source's placements
    /// are committed as soon as its fetch completes, so a failed commit
    /// returns [`SyncError::Commit`] carrying what was already saved.
    /// Cancellation stops at the next source boundary, drops the fetches
    /// still in flight and returns the partial result.
    #[instrument(skip(self, options), fields(use_feed_cache = options.use_feed_cache))]
    pub async fn sync(&self, options: &SyncOptions) -> Result<SyncResult, SyncError> {
        let start = Instant::now();
        let mut result = SyncResult::default();

        let sources = self
            .handle
            .read(|library| library.sources_to_sync(options.sources.as_deref()))
            .await;
        let (client, replaying) = self.feed_client(options.use_feed_cache);

        info!(
            operation = "sync_start",
            sources = sources.len(),
            client = client.client_name(),
            "Starting sync operation"
        );

        let width = match self.max_concurrent_fetches {
            0 => sources.len().max(1),
            max => max,
        };
        let mut fetches = stream::iter(sources.into_iter().map(|source| {
            let client = client.clone();
            async move {
                let fetched = client.fetch_items(&source).await;
                (source, fetched)
            }
        }))
        .buffer_unordered(width);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(operation = "sync_cancelled", synced = result.sources_synced, "Sync cancelled, keeping committed progress");
                    result.cancelled = true;
                    break;
                }
                next = fetches.next() => next,
            };
            let Some((source, fetched)) = next else { break };

            let candidates = match fetched {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(operation = "fetch", source = %source.id, status = "error", error = %e, "Failed to fetch source");
                    result.failed_sources.insert(source.id.clone(), e.to_string());
                    continue;
                }
            };
            debug!(operation = "fetch", source = %source.id, count = candidates.len(), "Fetched source");

            if !replaying {
                if let Some(cache) = &self.feed_cache {
                    if let Err(e) = cache.save(&source.id, &candidates) {
                        warn!(source = %source.id, "Failed to cache feed: {}", e);
                    }
                }
            }

            let defaults = &self.defaults;
            let placed = self
                .handle
                .mutate(|library| place_items(library, &source.id, &candidates, defaults))
                .await;
            match placed {
                Ok(Ok(report)) => {
                    result.sources_synced += 1;
                    result.record(&report.placed);
                }
                Ok(Err(e)) => {
                    warn!(source = %source.id, "Skipping source: {}", e);
                    result.failed_sources.insert(source.id.clone(), e.to_string());
                }
                Err(e) => {
                    return Err(SyncError::Commit {
                        source: e,
                        committed: Box::new(result.finish(start)),
                    });
                }
            }
        }
        drop(fetches);

        if !result.cancelled {
            let now = Utc::now();
            let due = self.handle.read(|library| !library.due_deferred(now).is_empty()).await;
            if due {
                let defaults = &self.defaults;
                let placed = self
                    .handle
                    .mutate(|library| Ok::<_, LibraryError>(place_due_deferred(library, now, defaults)))
                    .await;
                match placed {
                    Ok(Ok(placed)) => result.record(&placed),
                    Ok(Err(e)) => warn!("Failed to place deferred items: {}", e),
                    Err(e) => {
                        return Err(SyncError::Commit {
                            source: e,
                            committed: Box::new(result.finish(start)),
                        });
                    }
                }
            }
        }

        let result = result.finish(start);
        info!(
            operation = "sync_complete",
            duration_ms = result.duration_ms,
            sources_synced = result.sources_synced,
            failed = result.failed_sources.len(),
            new_items = result.total_new(),
            cancelled = result.cancelled,
            "Sync operation completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_support::*;
    use crate::library::Library;
    use crate::store::{LibraryStore, MemoryStore};
    use async_trait::async_trait;
    use library_sync_models::{CandidateItem, PlacementPolicy, Source};
    use library_sync_sources::SourceError;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeFeeds {
        feeds: HashMap<SourceId, Vec<CandidateItem>>,
    }

    impl FakeFeeds {
        fn with(mut self, source: &str, days: std::ops::RangeInclusive<u32>) -> Self {
            let items = days.map(|day| candidate(&format!("{}-{}", source, day), day)).collect();
            self.feeds.insert(SourceId::new(source), items);
            self
        }
    }

    #[async_trait]
    impl FeedClient for FakeFeeds {
        fn client_name(&self) -> &str {
            "fake"
        }

        async fn fetch_items(&self, source: &Source) -> Result<Vec<CandidateItem>, SourceError> {
            self.feeds
                .get(&source.id)
                .cloned()
                .ok_or_else(|| SourceError::Other(format!("feed {} unavailable", source.id)))
        }
    }

    fn library_with_sources(ids: &[&str]) -> Library {
        let mut library = Library::new();
        for id in ids {
            library.subscribe(source(id));
        }
        library
    }

    fn orchestrator(store: Arc<MemoryStore>, feeds: FakeFeeds) -> SyncOrchestrator {
        let handle = Arc::new(LibraryHandle::open(Box::new(store)).unwrap());
        SyncOrchestrator::new(handle, Arc::new(feeds))
    }

    #[tokio::test]
    async fn test_failed_source_does_not_abort_run() {
        let store = Arc::new(MemoryStore::with_library(library_with_sources(&["UC1", "UC2", "UC3"])));
        let feeds = FakeFeeds::default().with("UC1", 1..=3).with("UC3", 1..=2);
        let result = orchestrator(store.clone(), feeds).sync(&SyncOptions::default()).await.unwrap();

        assert_eq!(result.sources_synced, 2);
        assert!(result.failed_sources.contains_key(&SourceId::new("UC2")));
        assert_eq!(result.new_items_by_source[&SourceId::new("UC1")].len(), 3);
        assert_eq!(result.new_items_by_source[&SourceId::new("UC3")].len(), 2);
        assert_eq!(result.new_in(Destination::Inbox), 5);
        assert_eq!(result.total_new(), 5);
        assert!(!result.cancelled);

        let saved = store.load().unwrap();
        assert_eq!(saved.inbox_len(), 5);
        assert_eq!(store.commit_count(), 2);
        saved.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_source_filter_and_unbounded_fanout() {
        let store = Arc::new(MemoryStore::with_library(library_with_sources(&["UC1", "UC2"])));
        let feeds = FakeFeeds::default().with("UC1", 1..=2).with("UC2", 1..=2);
        let options = SyncOptions {
            sources: Some(vec![SourceId::new("UC2")]),
            use_feed_cache: false,
        };
        let result = orchestrator(store, feeds)
            .with_max_concurrent_fetches(0)
            .sync(&options)
            .await
            .unwrap();

        assert_eq!(result.sources_synced, 1);
        assert_eq!(result.new_items_by_source.keys().collect::<Vec<_>>(), vec![&SourceId::new("UC2")]);
    }

    #[tokio::test]
    async fn test_commit_failure_reports_saved_progress() {
        let store = Arc::new(MemoryStore::with_library(library_with_sources(&["UC1", "UC2"])).failing_after(1));
        let feeds = FakeFeeds::default().with("UC1", 1..=2).with("UC2", 1..=2);
        let error = orchestrator(store.clone(), feeds)
            .with_max_concurrent_fetches(1)
            .sync(&SyncOptions::default())
            .await
            .unwrap_err();

        match error {
            SyncError::Commit { committed, .. } => {
                assert_eq!(committed.total_new(), 2);
                assert_eq!(committed.sources_synced, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(store.load().unwrap().inbox_len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_places_nothing() {
        let store = Arc::new(MemoryStore::with_library(library_with_sources(&["UC1"])));
        let feeds = FakeFeeds::default().with("UC1", 1..=2);
        let orchestrator = orchestrator(store.clone(), feeds);
        orchestrator.cancellation_token().cancel();

        let result = orchestrator.sync(&SyncOptions::default()).await.unwrap();
        assert!(result.cancelled);
        assert_eq!(result.total_new(), 0);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_due_deferred_items_are_reported() {
        let mut library = library_with_items(2);
        library.defer_item(&ItemId::new("v1"), at(1)).unwrap();
        let mut queued = source("UC1");
        queued.placement = PlacementPolicy::QueueLast;
        library.subscribe(queued);
        let store = Arc::new(MemoryStore::with_library(library));

        let result = orchestrator(store.clone(), FakeFeeds::default().with("UC1", 1..=0))
            .sync(&SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(result.new_in(Destination::Queue), 1);
        assert_eq!(result.new_items_by_source[&SourceId::new("UC1")], ids(&["v1"]));
        assert_eq!(store.load().unwrap().queue_ids(), ids(&["v1"]));
    }

    #[tokio::test]
    async fn test_feed_cache_write_through_and_replay() {
        let dir = TempDir::new().unwrap();
        let cache = FeedCache::with_dir(dir.path()).unwrap();
        let store = Arc::new(MemoryStore::with_library(library_with_sources(&["UC1"])));

        orchestrator(store.clone(), FakeFeeds::default().with("UC1", 1..=3))
            .with_feed_cache(cache.clone())
            .sync(&SyncOptions::default())
            .await
            .unwrap();
        assert!(cache.exists(&SourceId::new("UC1")));

        // Replay against a fresh library with a client that has no feeds
        let fresh = Arc::new(MemoryStore::with_library(library_with_sources(&["UC1"])));
        let options = SyncOptions {
            sources: None,
            use_feed_cache: true,
        };
        let replayed = orchestrator(fresh.clone(), FakeFeeds::default())
            .with_feed_cache(cache)
            .sync(&options)
            .await
            .unwrap();

        assert!(replayed.failed_sources.is_empty());
        assert_eq!(replayed.total_new(), 3);
        assert_eq!(fresh.load().unwrap().item_count(), 3);
    }
}
