use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::ids::SourceId;
use crate::placement::{PlacementPolicy, ShortPolicy};

/// A subscribed feed (channel or playlist)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub id: SourceId,
    pub title: String,
    /// Feed locator handed to the feed client
    pub locator: String,
    #[serde(default)]
    pub placement: PlacementPolicy,
    #[serde(default)]
    pub short_policy: ShortPolicy,
    /// Watermark of the newest published item seen so far
    #[serde(default)]
    pub most_recent_item_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived: bool,
    pub subscribed_at: DateTime<Utc>,
}

impl Source {
    pub fn new(id: SourceId, title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            locator: locator.into(),
            placement: PlacementPolicy::default(),
            short_policy: ShortPolicy::default(),
            most_recent_item_date: None,
            archived: false,
            subscribed_at: Utc::now(),
        }
    }

    /// True until the first successful sync sets the cursor
    pub fn is_first_sync(&self) -> bool {
        self.most_recent_item_date.is_none()
    }

    /// Move the cursor forward; never moves it backward.
    /// Returns whether the cursor changed.
    pub fn advance_cursor(&mut self, date: DateTime<Utc>) -> bool {
        match self.most_recent_item_date {
            Some(current) if current >= date => false,
            _ => {
                self.most_recent_item_date = Some(date);
                true
            }
        }
    }
}
