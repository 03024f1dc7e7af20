use anyhow::{anyhow, Result};
use async_trait::async_trait;
use library_sync_config::PathManager;
use library_sync_models::{CandidateItem, Source, SourceId};
use library_sync_sources::snapshot::snapshot_file_name;
use library_sync_sources::{FeedClient, SourceError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Last successful fetch of every source, as JSON under `data/cache/feeds`.
///
/// Also a [`FeedClient`]: replaying the cache runs a sync without touching
/// the network.
#[derive(Clone)]
pub struct FeedCache {
    dir: PathBuf,
}

impl FeedCache {
    pub fn new(path_manager: &PathManager) -> Result<Self> {
        Self::with_dir(path_manager.cache_feeds_dir())
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn cache_path(&self, source: &SourceId) -> PathBuf {
        self.dir.join(snapshot_file_name(source.as_str()))
    }

    pub fn exists(&self, source: &SourceId) -> bool {
        self.cache_path(source).exists()
    }

    pub fn save(&self, source: &SourceId, items: &[CandidateItem]) -> Result<()> {
        let cache_path = self.cache_path(source);
        let json = serde_json::to_string_pretty(items).map_err(|e| {
            warn!("Failed to serialize feed cache for {}: {}", source, e);
            anyhow!("Failed to serialize feed cache: {}", e)
        })?;

        let temp_path = cache_path.with_extension("json.tmp");
        match std::fs::write(&temp_path, json).and_then(|_| std::fs::rename(&temp_path, &cache_path)) {
            Ok(_) => {
                debug!("Feed cache saved: {} ({} items)", source, items.len());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to write feed cache for {}: {}", source, e);
                Err(anyhow!("Failed to write feed cache: {}", e))
            }
        }
    }

    /// Cached items of a source. A corrupted file is deleted and reported
    /// as a miss.
    pub fn load(&self, source: &SourceId) -> Result<Option<Vec<CandidateItem>>> {
        let cache_path = self.cache_path(source);

        if !cache_path.exists() {
            debug!("Feed cache miss: {} (file does not exist)", source);
            return Ok(None);
        }

        match std::fs::read_to_string(&cache_path) {
            Ok(content) => match serde_json::from_str::<Vec<CandidateItem>>(&content) {
                Ok(items) => {
                    info!("Feed cache hit: {} (loaded {} items)", source, items.len());
                    Ok(Some(items))
                }
                Err(e) => {
                    warn!("Feed cache corruption detected for {}: {}. Deleting corrupted file.", source, e);
                    if let Err(rm_err) = std::fs::remove_file(&cache_path) {
                        warn!("Failed to delete corrupted feed cache file: {}", rm_err);
                    }
                    Ok(None)
                }
            },
            Err(e) => {
                warn!("Failed to read feed cache file for {}: {}", source, e);
                Ok(None)
            }
        }
    }

    /// Delete every cached feed; returns how many files were removed
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        if self.dir.exists() {
            for entry in std::fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
            info!("Cleared feed cache directory: {:?}", self.dir);
        }
        Ok(removed)
    }
}

#[async_trait]
impl FeedClient for FeedCache {
    fn client_name(&self) -> &str {
        "feed-cache"
    }

    async fn fetch_items(&self, source: &Source) -> Result<Vec<CandidateItem>, SourceError> {
        self.load(&source.id)
            .map_err(|e| SourceError::Other(e.to_string()))?
            .ok_or_else(|| SourceError::NotFound(source.locator.clone()))
    }
}
