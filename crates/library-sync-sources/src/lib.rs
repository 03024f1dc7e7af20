pub mod error;
pub mod snapshot;
pub mod traits;

pub use error::SourceError;
pub use snapshot::{SegmentRecord, SnapshotFeedClient, SnapshotSegmentProvider};
pub use traits::{FeedClient, SegmentProvider};
