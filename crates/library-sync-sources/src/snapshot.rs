// Snapshot-backed boundaries: read normalized feed results and segment
// annotations from JSON files written by an external fetcher.

use async_trait::async_trait;
use library_sync_models::{CandidateItem, Chapter, ChapterCategory, ItemId, Source};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::{FeedClient, SegmentProvider, SourceError};

/// File name for an identifier. Anything outside `[A-Za-z0-9._~-]` is
/// percent-encoded, so distinct ids never share a file.
pub fn snapshot_file_name(id: &str) -> String {
    format!("{}.json", urlencoding::encode(id))
}

async fn read_snapshot(path: &Path, locator: &str) -> Result<Option<String>, SourceError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SourceError::Io {
            locator: locator.to_string(),
            source: e,
        }),
    }
}

/// Reads `<dir>/<source id>.json`, a JSON array of candidate items
pub struct SnapshotFeedClient {
    dir: PathBuf,
}

impl SnapshotFeedClient {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn snapshot_path(&self, source: &Source) -> PathBuf {
        self.dir.join(snapshot_file_name(source.id.as_str()))
    }
}

#[async_trait]
impl FeedClient for SnapshotFeedClient {
    fn client_name(&self) -> &str {
        "snapshot"
    }

    async fn fetch_items(&self, source: &Source) -> Result<Vec<CandidateItem>, SourceError> {
        let path = self.snapshot_path(source);
        let content = read_snapshot(&path, &source.locator)
            .await?
            .ok_or_else(|| SourceError::NotFound(source.locator.clone()))?;

        let items: Vec<CandidateItem> = serde_json::from_str(&content).map_err(|e| SourceError::Parse {
            locator: source.locator.clone(),
            message: e.to_string(),
        })?;

        debug!(source = %source.id, count = items.len(), "Loaded feed snapshot");
        Ok(items)
    }
}

/// One annotated segment as published by a segment service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentRecord {
    pub category: ChapterCategory,
    /// `[start, end]` in seconds
    pub segment: [f64; 2],
}

/// Reads `<dir>/<item id>.json`, a JSON array of [`SegmentRecord`].
/// A missing file means the item has no known segments.
pub struct SnapshotSegmentProvider {
    dir: PathBuf,
    skip_categories: Vec<ChapterCategory>,
}

impl SnapshotSegmentProvider {
    pub fn new(dir: impl Into<PathBuf>, skip_categories: Vec<ChapterCategory>) -> Self {
        Self {
            dir: dir.into(),
            skip_categories,
        }
    }

    fn to_chapter(&self, record: &SegmentRecord) -> Chapter {
        let [start, end] = record.segment;
        let is_active = !self.skip_categories.contains(&record.category);
        Chapter::segment(record.category, start, end, is_active)
    }
}

#[async_trait]
impl SegmentProvider for SnapshotSegmentProvider {
    fn provider_name(&self) -> &str {
        "snapshot"
    }

    async fn fetch_segments(&self, item_id: &ItemId) -> Result<Vec<Chapter>, SourceError> {
        let path = self.dir.join(snapshot_file_name(item_id.as_str()));
        let Some(content) = read_snapshot(&path, item_id.as_str()).await? else {
            debug!(item = %item_id, "No segment snapshot");
            return Ok(Vec::new());
        };

        let records: Vec<SegmentRecord> = serde_json::from_str(&content).map_err(|e| SourceError::Parse {
            locator: item_id.to_string(),
            message: e.to_string(),
        })?;

        Ok(records
            .iter()
            .filter(|r| r.segment[1] > r.segment[0])
            .map(|r| self.to_chapter(r))
            .collect())
    }
}
