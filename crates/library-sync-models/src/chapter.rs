use serde::{Deserialize, Serialize};

/// Segment category. Anything but `Chapter` comes from an external annotation source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChapterCategory {
    #[default]
    Chapter,
    Sponsor,
    #[serde(rename = "selfpromo")]
    SelfPromo,
    Interaction,
    Intro,
    Outro,
    Preview,
    #[serde(rename = "music_offtopic")]
    MusicOfftopic,
}

/// A span of an item's timeline, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chapter {
    #[serde(default)]
    pub title: Option<String>,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    /// Inactive chapters are skipped during playback
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub category: ChapterCategory,
    #[serde(default)]
    pub is_external: bool,
}

fn default_active() -> bool {
    true
}

impl Chapter {
    /// Chapter reported by the item itself
    pub fn native(title: Option<String>, start_time: f64, end_time: Option<f64>) -> Self {
        let mut chapter = Self {
            title,
            start_time,
            end_time,
            duration: None,
            is_active: true,
            category: ChapterCategory::Chapter,
            is_external: false,
        };
        chapter.update_duration();
        chapter
    }

    /// Externally supplied segment overlay
    pub fn segment(category: ChapterCategory, start_time: f64, end_time: f64, is_active: bool) -> Self {
        let mut chapter = Self {
            title: None,
            start_time,
            end_time: Some(end_time),
            duration: None,
            is_active,
            category,
            is_external: true,
        };
        chapter.update_duration();
        chapter
    }

    /// Synthesized chapter covering a gap between known segments
    pub fn filler(start_time: f64, end_time: f64) -> Self {
        Self::native(None, start_time, Some(end_time))
    }

    pub fn update_duration(&mut self) {
        self.duration = self.end_time.map(|end| (end - self.start_time).max(0.0));
    }

    pub fn set_start(&mut self, start_time: f64) {
        self.start_time = start_time;
        self.update_duration();
    }

    pub fn set_end(&mut self, end_time: f64) {
        self.end_time = Some(end_time);
        self.update_duration();
    }
}
