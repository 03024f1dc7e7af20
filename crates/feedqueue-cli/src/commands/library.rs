use crate::commands::{format_date, open_library};
use crate::output::Output;
use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use library_sync_config::PathManager;
use library_sync_core::LibraryError;
use library_sync_models::ItemId;

pub async fn run_defer(
    path_manager: &PathManager,
    item: String,
    until: Option<DateTime<Utc>>,
    days: Option<u32>,
    output: &Output,
) -> Result<()> {
    let until = match (until, days) {
        (Some(date), _) => date,
        (None, Some(days)) => Utc::now() + Duration::days(i64::from(days)),
        (None, None) => return Err(color_eyre::eyre::eyre!("Pass --until or --days")),
    };

    let handle = open_library(path_manager)?;
    let id = ItemId::new(item);
    handle.mutate(|library| library.defer_item(&id, until)).await??;
    output.success(format!("Deferred {} until {}; the first sync after that places it again", id, format_date(until)));
    Ok(())
}

pub async fn run_watched(path_manager: &PathManager, items: Vec<String>, output: &Output) -> Result<()> {
    let handle = open_library(path_manager)?;
    let ids: Vec<ItemId> = items.into_iter().map(ItemId::new).collect();

    // All or nothing: an unknown id leaves the library untouched
    handle
        .mutate(|library| {
            for id in &ids {
                library.mark_watched(id)?;
            }
            Ok::<_, LibraryError>(())
        })
        .await??;

    output.success(format!("Marked {} items as watched", ids.len()));
    Ok(())
}
