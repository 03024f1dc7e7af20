pub mod asset;
pub mod candidate;
pub mod chapter;
pub mod ids;
pub mod item;
pub mod placement;
pub mod source;

pub use asset::CachedAsset;
pub use candidate::CandidateItem;
pub use chapter::{Chapter, ChapterCategory};
pub use ids::{ItemId, SourceId};
pub use item::Item;
pub use placement::{Destination, InboxEntry, Placement, PlacementPolicy, QueueEntry, ShortPolicy, TriagePlacement};
pub use source::Source;
