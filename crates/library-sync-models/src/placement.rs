use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::ids::ItemId;

/// Where an item currently lives. An item holds at most one entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    Unplaced,
    Inbox,
    Queue,
}

/// Per-source placement override for newly found items
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// Use the global default placement
    #[default]
    DefaultPlacement,
    Inbox,
    QueueNext,
    QueueLast,
    Discard,
}

/// A resolved placement decision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriagePlacement {
    #[default]
    Inbox,
    /// Insert right after the current queue head
    QueueNext,
    /// Append to the queue tail
    QueueLast,
    /// Create no entry (the cursor still advances)
    Discard,
}

impl PlacementPolicy {
    pub fn resolve(self, default: TriagePlacement) -> TriagePlacement {
        match self {
            PlacementPolicy::DefaultPlacement => default,
            PlacementPolicy::Inbox => TriagePlacement::Inbox,
            PlacementPolicy::QueueNext => TriagePlacement::QueueNext,
            PlacementPolicy::QueueLast => TriagePlacement::QueueLast,
            PlacementPolicy::Discard => TriagePlacement::Discard,
        }
    }
}

/// Per-source handling of short-form items
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShortPolicy {
    Show,
    Hide,
    #[default]
    UseDefault,
}

impl ShortPolicy {
    /// Source-level policy takes precedence over the global one
    pub fn hides(self, global_hide: bool) -> bool {
        match self {
            ShortPolicy::Show => false,
            ShortPolicy::Hide => true,
            ShortPolicy::UseDefault => global_hide,
        }
    }
}

/// Destination of a newly placed item, used for grouping sync results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Inbox,
    Queue,
}

impl TriagePlacement {
    pub fn destination(self) -> Option<Destination> {
        match self {
            TriagePlacement::Inbox => Some(Destination::Inbox),
            TriagePlacement::QueueNext | TriagePlacement::QueueLast => Some(Destination::Queue),
            TriagePlacement::Discard => None,
        }
    }
}

/// Queue slot of an item. At rest, orders form 0..N-1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    pub item_id: ItemId,
    pub order: usize,
}

/// Inbox slot of an item; `date` mirrors the item's published date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboxEntry {
    pub item_id: ItemId,
    pub date: DateTime<Utc>,
}
