use crate::commands::open_library;
use crate::output::Output;
use color_eyre::Result;
use library_sync_config::PathManager;
use library_sync_core::{remove_duplicates, FeedCache};
use serde_json::json;
use std::convert::Infallible;

pub async fn run_cleanup(path_manager: &PathManager, feed_cache: bool, output: &Output) -> Result<()> {
    let handle = open_library(path_manager)?;

    let report = handle
        .mutate(|library| Ok::<_, Infallible>(remove_duplicates(library)))
        .await??;

    output.json(&json!({ "type": "cleanup", "report": report }));
    if report.is_empty() {
        output.info("No duplicates found");
    } else {
        output.success(format!(
            "Removed {} duplicate sources, {} duplicate items, {} duplicate assets and {} broken entries",
            report.sources_removed,
            report.items_removed.len(),
            report.assets_removed,
            report.entries_removed,
        ));
    }

    if feed_cache {
        let cache = FeedCache::new(path_manager)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to open feed cache: {}", e))?;
        let removed = cache
            .clear()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to clear feed cache at {}: {}", cache.dir().display(), e))?;
        output.success(format!("Cleared {} cached feeds", removed));
    }

    Ok(())
}
