use library_sync_models::{ChapterCategory, TriagePlacement};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub chapters: ChapterConfig,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

/// Global triage defaults, overridable per source
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LibraryConfig {
    /// Items placed on a source's first sync
    #[serde(default = "default_triage_limit")]
    pub triage_limit: usize,
    #[serde(default)]
    pub default_placement: TriagePlacement,
    #[serde(default)]
    pub hide_shorts: bool,
    #[serde(default = "default_short_max_duration_seconds")]
    pub short_max_duration_seconds: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Concurrent feed fetches per run; 0 runs one task per source
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// Replay cached feed results instead of calling the feed client
    #[serde(default)]
    pub use_feed_cache: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChapterConfig {
    /// Timestamps closer than this are treated as equal
    #[serde(default = "default_tolerance_seconds")]
    pub tolerance_seconds: f64,
    /// External segment categories that playback skips
    #[serde(default = "default_skip_categories")]
    pub skip_categories: Vec<ChapterCategory>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Six-field cron expression (seconds first)
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
    /// Log file for scheduled runs; defaults to the log directory
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_triage_limit() -> usize {
    5
}

fn default_short_max_duration_seconds() -> f64 {
    60.0
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_tolerance_seconds() -> f64 {
    2.0
}

fn default_skip_categories() -> Vec<ChapterCategory> {
    vec![ChapterCategory::Sponsor, ChapterCategory::SelfPromo]
}

fn default_schedule() -> String {
    "0 0 */6 * * *".to_string()  // Every 6 hours
}

pub fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        schedule: default_schedule(),
        run_on_startup: default_true(),
        log_file: None,
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            triage_limit: default_triage_limit(),
            default_placement: TriagePlacement::default(),
            hide_shorts: false,
            short_max_duration_seconds: default_short_max_duration_seconds(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            use_feed_cache: false,
        }
    }
}

impl Default for ChapterConfig {
    fn default() -> Self {
        Self {
            tolerance_seconds: default_tolerance_seconds(),
            skip_categories: default_skip_categories(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if present, otherwise fall back to defaults
    pub fn load_or_default(path: &PathBuf) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.chapters.tolerance_seconds.is_finite() || self.chapters.tolerance_seconds < 0.0 {
            return Err(anyhow::anyhow!("chapters.tolerance_seconds must be non-negative"));
        }

        if !self.library.short_max_duration_seconds.is_finite() || self.library.short_max_duration_seconds < 0.0 {
            return Err(anyhow::anyhow!("library.short_max_duration_seconds must be non-negative"));
        }

        if let Some(ref scheduler) = self.scheduler {
            if scheduler.schedule.trim().is_empty() {
                return Err(anyhow::anyhow!("scheduler.schedule cannot be empty"));
            }
        }

        Ok(())
    }

    pub fn scheduler_or_default(&self) -> SchedulerConfig {
        self.scheduler.clone().unwrap_or_else(default_scheduler_config)
    }
}
