use crate::commands::{format_duration, load_config, open_library};
use crate::output::{self, Output};
use color_eyre::Result;
use library_sync_config::PathManager;
use library_sync_core::refresh_chapters;
use library_sync_models::ItemId;
use library_sync_sources::SnapshotSegmentProvider;
use serde_json::json;

pub async fn run_chapters(path_manager: &PathManager, item: String, output: &Output) -> Result<()> {
    let config = load_config(path_manager)?;
    let handle = open_library(path_manager)?;
    let provider = SnapshotSegmentProvider::new(path_manager.segments_dir(), config.chapters.skip_categories.clone());

    let refresh = refresh_chapters(&handle, &provider, &ItemId::new(item), config.chapters.tolerance_seconds).await?;

    output.json(&json!({ "type": "chapters", "refresh": refresh }));

    if refresh.segments == 0 {
        output.info(format!("No external segments for {}", refresh.item_id));
    }
    if !refresh.chapters.is_empty() {
        let mut table = output::table(["Start", "End", "Title", "Category", "Playback"]);
        for chapter in &refresh.chapters {
            table.add_row(vec![
                format_duration(Some(chapter.start_time)),
                format_duration(chapter.end_time),
                chapter.title.clone().unwrap_or_default(),
                format!("{:?}", chapter.category),
                if chapter.is_active { "play" } else { "skip" }.to_string(),
            ]);
        }
        output.table(&table);
    }

    if refresh.changed {
        output.success(format!("Saved {} chapters for {}", refresh.chapters.len(), refresh.item_id));
    } else {
        output.info("Chapters unchanged");
    }
    Ok(())
}
