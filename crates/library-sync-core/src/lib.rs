pub mod cache;
pub mod chapter_parse;
pub mod chapters;
pub mod dedup;
pub mod error;
pub mod library;
pub mod queue;
pub mod store;
pub mod sync;
pub mod triage;

pub use cache::FeedCache;
pub use chapter_parse::parse_description;
pub use chapters::{chapters_changed, merge, refresh_chapters, ChapterRefresh, CHAPTER_TIME_TOLERANCE};
pub use dedup::{canonical_url, find_duplicates, find_duplicates_by, remove_duplicates, CleanupReport};
pub use error::{ChapterError, LibraryError, StoreError, SyncError};
pub use library::Library;
pub use queue::QueueIndex;
pub use store::{FileStore, LibraryHandle, LibraryStore, MemoryStore};
pub use sync::{SyncOptions, SyncOrchestrator, SyncResult};
pub use triage::{place_due_deferred, place_items, PlacedItem, PlacementReport, TriageDefaults};
