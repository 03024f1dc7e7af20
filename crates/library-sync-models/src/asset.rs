use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::ids::ItemId;

/// Record of a locally cached remote asset (thumbnail, artwork)
///
/// The bytes themselves live with the image cache; the library only tracks
/// which URL is cached and which item it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedAsset {
    pub url: String,
    pub item_id: Option<ItemId>,
    pub cached_at: DateTime<Utc>,
}
