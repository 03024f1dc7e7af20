use library_sync_models::{ItemId, SourceId};
use library_sync_sources::SourceError;
use thiserror::Error;
use crate::sync::SyncResult;

/// Rejected library mutation. Aborts the one operation, never a whole run.
#[derive(Debug, Error, PartialEq)]
pub enum LibraryError {
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("unknown source: {0}")]
    UnknownSource(SourceId),

    #[error("index {index} out of range for queue of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("item {0} is not in the queue")]
    NotInQueue(ItemId),

    #[error("item {0} is not in the inbox")]
    NotInInbox(ItemId),
}

/// Failure of the persistence boundary
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("library file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode library: {0}")]
    Encode(String),

    #[error("failed to decode library: {0}")]
    Decode(String),

    #[error("library store task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to load library: {0}")]
    Store(#[from] StoreError),

    /// A commit failed mid-run; `committed` holds everything saved before it
    #[error("commit failed after {} placed items: {source}", .committed.total_new())]
    Commit {
        #[source]
        source: StoreError,
        committed: Box<SyncResult>,
    },
}

#[derive(Debug, Error)]
pub enum ChapterError {
    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("failed to fetch segments: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
