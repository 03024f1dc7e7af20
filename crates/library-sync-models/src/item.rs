use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::candidate::CandidateItem;
use crate::chapter::Chapter;
use crate::ids::{ItemId, SourceId};
use crate::placement::Placement;

/// A single piece of content tracked by the library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub source_id: Option<SourceId>,
    pub title: String,
    pub url: String,
    pub playlist_id: Option<String>,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Seconds
    pub duration: Option<f64>,
    /// Unknown until duration or tags tell us
    pub is_short: Option<bool>,
    /// Badge flag for freshly placed items
    pub is_new: bool,
    pub watched: bool,
    /// Set when the user cleared the item from inbox or queue
    pub cleared_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,
    pub defer_date: Option<DateTime<Utc>>,
    /// Chapters reported by the item itself
    pub chapters: Vec<Chapter>,
    /// Native chapters merged with external segments, when any were applied
    pub merged_chapters: Option<Vec<Chapter>>,
    /// Mirrors the library's entry lists; only the library changes it
    pub placement: Placement,
}

impl Item {
    pub fn from_candidate(candidate: &CandidateItem, source_id: Option<SourceId>) -> Self {
        Self {
            id: candidate.id.clone(),
            source_id,
            title: candidate.title.clone(),
            url: candidate.url.clone(),
            playlist_id: None,
            thumbnail_url: candidate.thumbnail_url.clone(),
            description: candidate.description.clone(),
            published_at: candidate.published_at,
            updated_at: candidate.updated_at,
            duration: candidate.duration,
            is_short: None,
            is_new: false,
            watched: false,
            cleared_at: None,
            elapsed_seconds: 0.0,
            defer_date: None,
            chapters: Vec::new(),
            merged_chapters: None,
            placement: Placement::Unplaced,
        }
    }

    /// The timeline playback should use: merged when present, native otherwise
    pub fn resolved_chapters(&self) -> &[Chapter] {
        self.merged_chapters.as_deref().unwrap_or(&self.chapters)
    }

    pub fn is_placed(&self) -> bool {
        self.placement != Placement::Unplaced
    }
}
