use crate::commands::{load_config, open_library};
use crate::output::{self, Output};
use color_eyre::Result;
use library_sync_config::{Config, PathManager};
use library_sync_core::{FeedCache, SyncError, SyncOptions, SyncOrchestrator, SyncResult, TriageDefaults};
use library_sync_models::{Destination, SourceId};
use library_sync_sources::SnapshotFeedClient;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Orchestrator over the library file, reading feed snapshots and writing
/// through to the feed cache
pub(crate) fn build_orchestrator(
    path_manager: &PathManager,
    config: &Config,
    cancel: CancellationToken,
) -> Result<SyncOrchestrator> {
    let handle = open_library(path_manager)?;
    let client = Arc::new(SnapshotFeedClient::new(path_manager.feeds_dir()));
    let feed_cache = FeedCache::new(path_manager)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to prepare feed cache: {}", e))?;

    Ok(SyncOrchestrator::new(handle, client)
        .with_defaults(TriageDefaults::from(&config.library))
        .with_max_concurrent_fetches(config.sync.max_concurrent_fetches)
        .with_feed_cache(feed_cache)
        .with_cancellation(cancel))
}

pub async fn run_sync(path_manager: &PathManager, sources: Vec<String>, use_cache: bool, output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");

    let config = load_config(path_manager)?;
    let cancel = CancellationToken::new();
    let orchestrator = build_orchestrator(path_manager, &config, cancel.clone())?;

    // Ctrl-C stops the run at the next source boundary
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(operation = "sync_interrupt", "Interrupt received, stopping after the current source");
            cancel.cancel();
        }
    });

    let options = SyncOptions {
        sources: if sources.is_empty() {
            None
        } else {
            Some(sources.into_iter().map(SourceId::new).collect())
        },
        use_feed_cache: use_cache || config.sync.use_feed_cache,
    };

    match orchestrator.sync(&options).await {
        Ok(result) => {
            print_result(&result, output);
            Ok(())
        }
        Err(SyncError::Commit { source, committed }) => {
            print_result(&committed, output);
            Err(color_eyre::eyre::eyre!("Sync stopped, saving the library failed: {}", source))
        }
        Err(e) => Err(color_eyre::eyre::eyre!("Sync failed: {}", e)),
    }
}

pub(crate) fn print_result(result: &SyncResult, output: &Output) {
    output.json(&json!({
        "type": "sync_result",
        "result": result,
        "total_new": result.total_new(),
    }));
    if !output.is_human() {
        return;
    }

    if result.cancelled {
        output.warn("Sync cancelled; results below are partial");
    }

    if !result.new_items_by_source.is_empty() {
        let mut table = output::table(["Source", "New items"]);
        for (source, items) in &result.new_items_by_source {
            table.add_row(vec![source.to_string(), items.len().to_string()]);
        }
        output.table(&table);
    }

    for (source, error) in &result.failed_sources {
        output.error(format!("{}: {}", source, error));
    }

    output.success(format!(
        "Synced {} sources in {} ms: {} new in inbox, {} new in queue",
        result.sources_synced,
        result.duration_ms,
        result.new_in(Destination::Inbox),
        result.new_in(Destination::Queue),
    ));
}
