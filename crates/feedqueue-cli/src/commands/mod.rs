pub mod chapters;
pub mod cleanup;
pub mod config;
pub mod daemon;
pub mod inbox;
pub mod library;
pub mod queue;
pub mod sources;
pub mod sync;

use chrono::{DateTime, Utc};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use library_sync_config::{Config, PathManager};
use library_sync_core::{FileStore, LibraryHandle};
use library_sync_models::Item;
use std::sync::Arc;

/// Config file if present, defaults otherwise; always validated
pub(crate) fn load_config(path_manager: &PathManager) -> Result<Config> {
    let config_file = path_manager.config_file();
    let config = Config::load_or_default(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

pub(crate) fn open_library(path_manager: &PathManager) -> Result<Arc<LibraryHandle>> {
    let library_file = path_manager.library_file();
    let handle = LibraryHandle::open(Box::new(FileStore::new(library_file.clone())))
        .wrap_err_with(|| format!("Failed to open library at {}", library_file.display()))?;
    Ok(Arc::new(handle))
}

pub(crate) fn format_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M").to_string()
}

pub(crate) fn format_duration(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => {
            let total = s.round() as u64;
            let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
            if h > 0 {
                format!("{}:{:02}:{:02}", h, m, s)
            } else {
                format!("{}:{:02}", m, s)
            }
        }
        _ => "-".to_string(),
    }
}

/// One row per item: position, id, title, source, published, length, badges
pub(crate) fn item_row(position: String, item: &Item) -> Vec<String> {
    let mut badges = Vec::new();
    if item.is_new {
        badges.push("new");
    }
    if item.is_short == Some(true) {
        badges.push("short");
    }
    vec![
        position,
        item.id.to_string(),
        item.title.clone(),
        item.source_id.as_ref().map(|s| s.to_string()).unwrap_or_default(),
        format_date(item.published_at),
        format_duration(item.duration),
        badges.join(","),
    ]
}

pub(crate) const ITEM_HEADER: [&str; 7] = ["#", "Item", "Title", "Source", "Published", "Length", ""];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Some(59.6)), "1:00");
        assert_eq!(format_duration(Some(3725.0)), "1:02:05");
        assert_eq!(format_duration(None), "-");
        assert_eq!(format_duration(Some(f64::NAN)), "-");
    }
}
