// In-memory library snapshot and its typed repository methods.
//
// The snapshot is loaded whole, mutated in memory and committed whole
// (see `store::LibraryHandle`). Placement is tracked twice on purpose:
// the tag on each item and the queue/inbox entry lists; only the
// methods here and in `queue.rs` touch either, and they always change both.

use chrono::{DateTime, Utc};
use library_sync_models::{CachedAsset, Chapter, InboxEntry, Item, ItemId, Placement, QueueEntry, Source, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use crate::error::LibraryError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Library {
    /// Kept as a list: replicas can deliver the same subscription twice
    pub(crate) sources: Vec<Source>,
    pub(crate) items: BTreeMap<ItemId, Item>,
    pub(crate) queue: Vec<QueueEntry>,
    pub(crate) inbox: Vec<InboxEntry>,
    pub(crate) assets: Vec<CachedAsset>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- sources -----

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// First live source with this id, falling back to an archived one
    pub fn source(&self, id: &SourceId) -> Option<&Source> {
        self.sources
            .iter()
            .find(|s| &s.id == id && !s.archived)
            .or_else(|| self.sources.iter().find(|s| &s.id == id))
    }

    pub(crate) fn source_mut(&mut self, id: &SourceId) -> Option<&mut Source> {
        let index = self
            .sources
            .iter()
            .position(|s| &s.id == id && !s.archived)
            .or_else(|| self.sources.iter().position(|s| &s.id == id))?;
        self.sources.get_mut(index)
    }

    pub fn active_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(|s| !s.archived)
    }

    /// Whether the item belongs to a source that is still subscribed
    pub fn has_live_source(&self, item: &Item) -> bool {
        item.source_id
            .as_ref()
            .map(|id| self.sources.iter().any(|s| &s.id == id && !s.archived))
            .unwrap_or(false)
    }

    /// Sources a sync run should fetch: every active source, or the
    /// requested subset (unknown ids are skipped)
    pub fn sources_to_sync(&self, filter: Option<&[SourceId]>) -> Vec<Source> {
        match filter {
            None => self.active_sources().cloned().collect(),
            Some(ids) => {
                let mut selected = Vec::new();
                for id in ids {
                    match self.source(id) {
                        Some(source) if !selected.iter().any(|s: &Source| &s.id == id) => {
                            selected.push(source.clone());
                        }
                        Some(_) => {}
                        None => debug!(source = %id, "Requested source is not subscribed, skipping"),
                    }
                }
                selected
            }
        }
    }

    /// Add a subscription. Re-subscribing an archived source revives it
    /// and keeps its cursor. Returns true when a new source was created.
    pub fn subscribe(&mut self, source: Source) -> bool {
        if let Some(existing) = self.source_mut(&source.id) {
            existing.archived = false;
            existing.title = source.title;
            existing.locator = source.locator;
            existing.placement = source.placement;
            existing.short_policy = source.short_policy;
            return false;
        }
        self.sources.push(source);
        true
    }

    /// Archive a subscription and drop its items from the inbox.
    /// Queued items stay where they are.
    pub fn unsubscribe(&mut self, id: &SourceId) -> Result<usize, LibraryError> {
        let mut found = false;
        for source in self.sources.iter_mut().filter(|s| &s.id == id) {
            source.archived = true;
            found = true;
        }
        if !found {
            return Err(LibraryError::UnknownSource(id.clone()));
        }

        let in_inbox: Vec<ItemId> = self
            .inbox
            .iter()
            .filter(|e| {
                self.items
                    .get(&e.item_id)
                    .map(|item| item.source_id.as_ref() == Some(id))
                    .unwrap_or(false)
            })
            .map(|e| e.item_id.clone())
            .collect();
        for item_id in &in_inbox {
            self.vacate(item_id);
        }
        Ok(in_inbox.len())
    }

    // ----- items -----

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn contains_item(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn item_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    /// Insert a new item, unplaced. An existing item with the same id is
    /// left untouched and false is returned.
    pub(crate) fn insert_item(&mut self, mut item: Item) -> bool {
        if self.items.contains_key(&item.id) {
            return false;
        }
        item.placement = Placement::Unplaced;
        self.items.insert(item.id.clone(), item);
        true
    }

    /// Delete an item together with its entry and cached assets
    pub fn delete_item(&mut self, id: &ItemId) -> Option<Item> {
        if !self.items.contains_key(id) {
            return None;
        }
        self.vacate(id);
        self.assets.retain(|a| a.item_id.as_ref() != Some(id));
        self.items.remove(id)
    }

    /// Consume an item: mark it watched and destroy its entry
    pub fn mark_watched(&mut self, id: &ItemId) -> Result<(), LibraryError> {
        if !self.items.contains_key(id) {
            return Err(LibraryError::UnknownItem(id.clone()));
        }
        self.vacate(id);
        if let Some(item) = self.items.get_mut(id) {
            item.watched = true;
            item.is_new = false;
            item.defer_date = None;
        }
        Ok(())
    }

    /// Take an item out of inbox/queue until `until`; the next sync after
    /// that moment places it again
    pub fn defer_item(&mut self, id: &ItemId, until: DateTime<Utc>) -> Result<(), LibraryError> {
        if !self.items.contains_key(id) {
            return Err(LibraryError::UnknownItem(id.clone()));
        }
        self.vacate(id);
        if let Some(item) = self.items.get_mut(id) {
            item.defer_date = Some(until);
            item.is_new = false;
        }
        Ok(())
    }

    /// Items whose defer date has passed, oldest defer date first
    pub fn due_deferred(&self, now: DateTime<Utc>) -> Vec<ItemId> {
        let mut due: Vec<&Item> = self
            .items
            .values()
            .filter(|item| item.defer_date.map(|d| d <= now).unwrap_or(false))
            .collect();
        due.sort_by(|a, b| a.defer_date.cmp(&b.defer_date).then_with(|| a.id.cmp(&b.id)));
        due.into_iter().map(|item| item.id.clone()).collect()
    }

    pub fn set_elapsed(&mut self, id: &ItemId, seconds: f64) -> Result<(), LibraryError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| LibraryError::UnknownItem(id.clone()))?;
        item.elapsed_seconds = seconds.max(0.0);
        Ok(())
    }

    /// Store a merged timeline; `None` falls back to the native chapters
    pub fn set_merged_chapters(&mut self, id: &ItemId, chapters: Option<Vec<Chapter>>) -> Result<(), LibraryError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| LibraryError::UnknownItem(id.clone()))?;
        item.merged_chapters = chapters;
        Ok(())
    }

    // ----- cached assets -----

    pub fn assets(&self) -> &[CachedAsset] {
        &self.assets
    }

    pub fn add_asset(&mut self, asset: CachedAsset) {
        self.assets.push(asset);
    }

    // ----- placement primitives -----

    /// Remove whatever entry the item holds and close the queue gap it
    /// leaves. No-op for unplaced items.
    pub(crate) fn vacate(&mut self, id: &ItemId) {
        if let Some(position) = self.queue.iter().position(|e| &e.item_id == id) {
            let removed = self.queue.remove(position);
            for entry in self.queue.iter_mut().filter(|e| e.order > removed.order) {
                entry.order -= 1;
            }
        }
        self.inbox.retain(|e| &e.item_id != id);
        if let Some(item) = self.items.get_mut(id) {
            item.placement = Placement::Unplaced;
        }
    }

    /// Entry lists and item tags agree, and queue orders are exactly 0..N-1
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut orders: Vec<usize> = self.queue.iter().map(|e| e.order).collect();
        orders.sort_unstable();
        if orders.iter().enumerate().any(|(i, &order)| i != order) {
            return Err(format!("queue orders are not dense: {:?}", orders));
        }

        for item in self.items.values() {
            let queued = self.queue.iter().filter(|e| e.item_id == item.id).count();
            let inboxed = self.inbox.iter().filter(|e| e.item_id == item.id).count();
            let expected = match item.placement {
                Placement::Unplaced => (0, 0),
                Placement::Inbox => (0, 1),
                Placement::Queue => (1, 0),
            };
            if (queued, inboxed) != expected {
                return Err(format!(
                    "item {} tagged {:?} has {} queue and {} inbox entries",
                    item.id, item.placement, queued, inboxed
                ));
            }
        }
        Ok(())
    }
}
