use crate::commands::{item_row, open_library, ITEM_HEADER};
use crate::output::{self, Output};
use crate::QueueCommands;
use chrono::Utc;
use color_eyre::Result;
use library_sync_config::PathManager;
use library_sync_core::QueueIndex;
use library_sync_models::{Item, ItemId};
use serde_json::json;

pub async fn run_queue(path_manager: &PathManager, cmd: QueueCommands, output: &Output) -> Result<()> {
    let handle = open_library(path_manager)?;

    match cmd {
        QueueCommands::List => {
            let items: Vec<Item> = handle
                .read(|library| library.queue_items().into_iter().cloned().collect())
                .await;

            output.json(&json!({ "type": "queue", "items": items }));
            if items.is_empty() {
                output.info("Queue is empty");
                return Ok(());
            }

            let mut table = output::table(ITEM_HEADER);
            for (order, item) in items.iter().enumerate() {
                table.add_row(item_row(order.to_string(), item));
            }
            output.table(&table);
        }
        QueueCommands::Add { items, at } => {
            let ids: Vec<ItemId> = items.into_iter().map(ItemId::new).collect();
            let position = handle
                .mutate(|library| library.insert_into_queue(&ids, QueueIndex::from_signed(at)))
                .await??;
            output.success(format!("Queued {} items at position {}", ids.len(), position));
        }
        QueueCommands::Move { from, to, keep_new } => {
            handle
                .mutate(|library| library.move_in_queue(&from, to, !keep_new))
                .await??;
            output.success(format!("Moved {} entries", from.len()));
        }
        QueueCommands::Remove { item } => {
            let id = ItemId::new(item);
            let entry = handle.mutate(|library| library.delete_queue_entry(&id)).await??;
            output.success(format!("Removed {} from position {}", id, entry.order));
        }
        QueueCommands::Clear { above, below, at } => {
            let now = Utc::now();
            let cleared = handle
                .mutate(|library| match (above, below, at) {
                    (Some(pivot), _, _) => Ok(library.clear_queue_above(pivot, now)),
                    (_, Some(pivot), _) => Ok(library.clear_queue_below(pivot, now)),
                    (_, _, Some(order)) => library.clear_queue_entry_at(order, now).map(|_| 1),
                    (None, None, None) => Ok(0),
                })
                .await??;
            output.success(format!("Cleared {} queue entries", cleared));
        }
    }

    Ok(())
}
