use crate::commands::{format_date, open_library};
use crate::output::{self, Output};
use crate::SourceCommands;
use clap::ValueEnum;
use color_eyre::Result;
use library_sync_config::PathManager;
use library_sync_models::{PlacementPolicy, ShortPolicy, Source, SourceId};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlacementArg {
    /// Follow the global default placement
    Default,
    Inbox,
    QueueNext,
    QueueLast,
    Discard,
}

impl From<PlacementArg> for PlacementPolicy {
    fn from(arg: PlacementArg) -> Self {
        match arg {
            PlacementArg::Default => PlacementPolicy::DefaultPlacement,
            PlacementArg::Inbox => PlacementPolicy::Inbox,
            PlacementArg::QueueNext => PlacementPolicy::QueueNext,
            PlacementArg::QueueLast => PlacementPolicy::QueueLast,
            PlacementArg::Discard => PlacementPolicy::Discard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShortsArg {
    /// Follow the global hide_shorts setting
    Default,
    Show,
    Hide,
}

impl From<ShortsArg> for ShortPolicy {
    fn from(arg: ShortsArg) -> Self {
        match arg {
            ShortsArg::Default => ShortPolicy::UseDefault,
            ShortsArg::Show => ShortPolicy::Show,
            ShortsArg::Hide => ShortPolicy::Hide,
        }
    }
}

pub async fn run_sources(path_manager: &PathManager, cmd: SourceCommands, output: &Output) -> Result<()> {
    let handle = open_library(path_manager)?;

    match cmd {
        SourceCommands::List { all } => {
            let sources: Vec<Source> = handle
                .read(|library| library.sources().iter().filter(|s| all || !s.archived).cloned().collect())
                .await;

            output.json(&json!({ "type": "sources", "sources": sources }));
            if sources.is_empty() {
                output.info("No subscriptions yet. Add one with 'feedqueue sources add'.");
                return Ok(());
            }

            let mut table = output::table(["Source", "Title", "Placement", "Shorts", "Last item", "Status"]);
            for source in &sources {
                table.add_row(vec![
                    source.id.to_string(),
                    source.title.clone(),
                    format!("{:?}", source.placement),
                    format!("{:?}", source.short_policy),
                    source.most_recent_item_date.map(format_date).unwrap_or_else(|| "never synced".to_string()),
                    if source.archived { "archived" } else { "active" }.to_string(),
                ]);
            }
            output.table(&table);
        }
        SourceCommands::Add { id, locator, title, placement, shorts } => {
            let mut source = Source::new(SourceId::new(id.as_str()), title.unwrap_or_else(|| id.clone()), locator);
            source.placement = placement.into();
            source.short_policy = shorts.into();

            let created = handle
                .mutate(|library| Ok::<_, std::convert::Infallible>(library.subscribe(source)))
                .await??;
            if created {
                output.success(format!("Subscribed to {}", id));
            } else {
                output.success(format!("Updated subscription {}", id));
            }
        }
        SourceCommands::Archive { id } => {
            let source_id = SourceId::new(id);
            let dropped = handle.mutate(|library| library.unsubscribe(&source_id)).await??;
            output.success(format!("Archived {} ({} inbox items removed)", source_id, dropped));
        }
    }

    Ok(())
}
