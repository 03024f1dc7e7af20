use crate::commands::{format_date, item_row, open_library, ITEM_HEADER};
use crate::output::{self, Output};
use crate::InboxCommands;
use chrono::Utc;
use color_eyre::Result;
use library_sync_config::PathManager;
use library_sync_core::LibraryError;
use library_sync_models::{Item, ItemId};
use serde_json::json;

pub async fn run_inbox(path_manager: &PathManager, cmd: InboxCommands, output: &Output) -> Result<()> {
    let handle = open_library(path_manager)?;

    match cmd {
        InboxCommands::List => {
            let items: Vec<Item> = handle
                .read(|library| {
                    library
                        .inbox_entries()
                        .iter()
                        .filter_map(|entry| library.item(&entry.item_id).cloned())
                        .collect()
                })
                .await;

            output.json(&json!({ "type": "inbox", "items": items }));
            if items.is_empty() {
                output.info("Inbox is empty");
                return Ok(());
            }

            let mut table = output::table(ITEM_HEADER);
            for (index, item) in items.iter().enumerate() {
                table.add_row(item_row((index + 1).to_string(), item));
            }
            output.table(&table);
        }
        InboxCommands::Add { items } => {
            let ids: Vec<ItemId> = items.into_iter().map(ItemId::new).collect();
            let added = handle.mutate(|library| library.add_to_inbox(&ids)).await??;
            output.success(format!("Added {} items to the inbox", added));
        }
        InboxCommands::Remove { item } => {
            let id = ItemId::new(item);
            let now = Utc::now();
            handle.mutate(|library| library.delete_inbox_entry(&id, now)).await??;
            output.success(format!("Cleared {} from the inbox", id));
        }
        InboxCommands::Clear { above, below } => {
            let now = Utc::now();
            let (cleared, pivot) = handle
                .mutate(|library| {
                    Ok::<_, LibraryError>(match (above, below) {
                        (Some(pivot), _) => (library.clear_inbox_above(pivot, now), pivot),
                        (_, Some(pivot)) => (library.clear_inbox_below(pivot, now), pivot),
                        (None, None) => (0, now),
                    })
                })
                .await??;
            let side = if above.is_some() { "newer" } else { "older" };
            output.success(format!("Cleared {} inbox entries {} than {}", cleared, side, format_date(pivot)));
        }
    }

    Ok(())
}
