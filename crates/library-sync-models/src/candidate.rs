use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::ids::ItemId;

/// Normalized item as returned by a feed client, before it enters the library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateItem {
    pub id: ItemId,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Raw description text; chapter markers are parsed out of it on ingestion
    #[serde(default)]
    pub description: Option<String>,
    /// Duration in seconds when the feed reports one
    #[serde(default)]
    pub duration: Option<f64>,
}

impl CandidateItem {
    /// Reason this candidate cannot become an item, if any
    pub fn shape_error(&self) -> Option<&'static str> {
        if self.id.as_str().trim().is_empty() {
            return Some("empty id");
        }
        if self.url.trim().is_empty() {
            return Some("empty url");
        }
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Some("invalid duration");
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, url: &str) -> CandidateItem {
        CandidateItem {
            id: ItemId::new(id),
            title: "Title".to_string(),
            url: url.to_string(),
            thumbnail_url: None,
            published_at: Utc::now(),
            updated_at: None,
            description: None,
            duration: None,
        }
    }

    #[test]
    fn test_shape_error() {
        assert_eq!(candidate("abc", "https://example.com/watch?v=abc").shape_error(), None);
        assert_eq!(candidate(" ", "https://example.com").shape_error(), Some("empty id"));
        assert_eq!(candidate("abc", "").shape_error(), Some("empty url"));

        let mut negative = candidate("abc", "https://example.com");
        negative.duration = Some(-1.0);
        assert_eq!(negative.shape_error(), Some("invalid duration"));
    }
}
