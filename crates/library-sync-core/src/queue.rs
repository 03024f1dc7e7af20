// Ordered queue and inbox operations.
//
// Every queue mutation works on a snapshot of item ids sorted by order
// and writes it back renumbered 0..N-1, except single deletes which close
// the gap by decrementing the orders above the removed entry.

use chrono::{DateTime, Utc};
use library_sync_models::{InboxEntry, Item, ItemId, Placement, QueueEntry};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;
use crate::error::LibraryError;
use crate::library::Library;

/// Insertion point for queue inserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueIndex {
    /// Before the entry currently at this position; past the end appends
    At(usize),
    Tail,
}

impl QueueIndex {
    /// Map the legacy `-1` sentinel to `Tail`
    pub fn from_signed(index: i64) -> Self {
        if index < 0 {
            QueueIndex::Tail
        } else {
            QueueIndex::At(index as usize)
        }
    }
}

impl Library {
    /// Item ids in queue order
    pub fn queue_ids(&self) -> Vec<ItemId> {
        let mut entries: Vec<&QueueEntry> = self.queue.iter().collect();
        entries.sort_by_key(|e| e.order);
        entries.into_iter().map(|e| e.item_id.clone()).collect()
    }

    pub fn queue_entries(&self) -> Vec<QueueEntry> {
        let mut entries = self.queue.clone();
        entries.sort_by_key(|e| e.order);
        entries
    }

    pub fn queue_items(&self) -> Vec<&Item> {
        self.queue_ids().iter().filter_map(|id| self.items.get(id)).collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Replace the queue with `ordered`, numbering it 0..N-1
    fn write_queue(&mut self, ordered: Vec<ItemId>) {
        self.queue = ordered
            .into_iter()
            .enumerate()
            .map(|(order, item_id)| QueueEntry { item_id, order })
            .collect();
        for entry in &self.queue {
            if let Some(item) = self.items.get_mut(&entry.item_id) {
                item.placement = Placement::Queue;
            }
        }
        debug_assert!(self.check_invariants().is_ok(), "queue renumbering left the library inconsistent");
    }

    /// Insert items into the queue. An item that already holds a slot (or
    /// an inbox entry) is vacated first, so it never occupies two places.
    /// Returns the number of items inserted.
    pub fn insert_into_queue(&mut self, ids: &[ItemId], at: QueueIndex) -> Result<usize, LibraryError> {
        if let Some(missing) = ids.iter().find(|id| !self.items.contains_key(id)) {
            return Err(LibraryError::UnknownItem(missing.clone()));
        }

        let mut seen = HashSet::new();
        let batch: Vec<ItemId> = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();
        for id in &batch {
            self.vacate(id);
        }

        let mut ordered = self.queue_ids();
        let index = match at {
            QueueIndex::At(index) => index.min(ordered.len()),
            QueueIndex::Tail => ordered.len(),
        };
        ordered.splice(index..index, batch.iter().cloned());
        self.write_queue(ordered);

        debug!(count = batch.len(), index, "Inserted into queue");
        Ok(batch.len())
    }

    /// Move the entries at `from` (queue positions) so they land before the
    /// entry currently at `to`, keeping their relative order. With
    /// `clear_new`, moved items lose their "new" flag.
    pub fn move_in_queue(&mut self, from: &[usize], to: usize, clear_new: bool) -> Result<(), LibraryError> {
        let ordered = self.queue_ids();
        let len = ordered.len();
        if let Some(&index) = from.iter().find(|&&index| index >= len) {
            return Err(LibraryError::IndexOutOfRange { index, len });
        }
        if to > len {
            return Err(LibraryError::IndexOutOfRange { index: to, len });
        }

        let from: BTreeSet<usize> = from.iter().copied().collect();
        let moved: Vec<ItemId> = from.iter().map(|&i| ordered[i].clone()).collect();
        let shift = from.iter().filter(|&&i| i < to).count();
        let mut remaining: Vec<ItemId> = ordered
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !from.contains(i))
            .map(|(_, id)| id)
            .collect();

        let dest = (to - shift).min(remaining.len());
        remaining.splice(dest..dest, moved.iter().cloned());
        self.write_queue(remaining);

        if clear_new {
            for id in &moved {
                if let Some(item) = self.items.get_mut(id) {
                    item.is_new = false;
                }
            }
        }
        Ok(())
    }

    /// Remove one queue entry and close the gap it leaves
    pub fn delete_queue_entry(&mut self, id: &ItemId) -> Result<QueueEntry, LibraryError> {
        let position = self
            .queue
            .iter()
            .position(|e| &e.item_id == id)
            .ok_or_else(|| LibraryError::NotInQueue(id.clone()))?;

        let removed = self.queue.remove(position);
        for entry in self.queue.iter_mut().filter(|e| e.order > removed.order) {
            entry.order -= 1;
        }
        if let Some(item) = self.items.get_mut(id) {
            item.placement = Placement::Unplaced;
        }
        Ok(removed)
    }

    /// Remove the entry at a queue position and mark the item cleared
    pub fn clear_queue_entry_at(&mut self, order: usize, now: DateTime<Utc>) -> Result<ItemId, LibraryError> {
        let id = self
            .queue
            .iter()
            .find(|e| e.order == order)
            .map(|e| e.item_id.clone())
            .ok_or(LibraryError::IndexOutOfRange { index: order, len: self.queue.len() })?;
        self.delete_queue_entry(&id)?;
        self.mark_cleared(&id, now);
        Ok(id)
    }

    /// Delete every entry ordered before `pivot`
    pub fn clear_queue_above(&mut self, pivot: usize, now: DateTime<Utc>) -> usize {
        self.clear_queue_where(|order| order < pivot, now)
    }

    /// Delete every entry ordered after `pivot`
    pub fn clear_queue_below(&mut self, pivot: usize, now: DateTime<Utc>) -> usize {
        self.clear_queue_where(|order| order > pivot, now)
    }

    fn clear_queue_where(&mut self, remove: impl Fn(usize) -> bool, now: DateTime<Utc>) -> usize {
        let doomed: Vec<ItemId> = self
            .queue
            .iter()
            .filter(|e| remove(e.order))
            .map(|e| e.item_id.clone())
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        let doomed_set: HashSet<&ItemId> = doomed.iter().collect();
        let kept: Vec<ItemId> = self
            .queue_ids()
            .into_iter()
            .filter(|id| !doomed_set.contains(id))
            .collect();
        for id in &doomed {
            self.mark_cleared(id, now);
        }
        self.write_queue(kept);
        doomed.len()
    }

    fn mark_cleared(&mut self, id: &ItemId, now: DateTime<Utc>) {
        if let Some(item) = self.items.get_mut(id) {
            item.placement = Placement::Unplaced;
            item.cleared_at = Some(now);
            item.is_new = false;
        }
    }

    // ----- inbox -----

    /// Inbox entries, newest first
    pub fn inbox_entries(&self) -> Vec<InboxEntry> {
        let mut entries = self.inbox.clone();
        entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.item_id.cmp(&b.item_id)));
        entries
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Put items into the inbox, taking them out of the queue if needed.
    /// Items already in the inbox are left as they are.
    pub fn add_to_inbox(&mut self, ids: &[ItemId]) -> Result<usize, LibraryError> {
        if let Some(missing) = ids.iter().find(|id| !self.items.contains_key(id)) {
            return Err(LibraryError::UnknownItem(missing.clone()));
        }

        let mut added = 0;
        for id in ids {
            if self.inbox.iter().any(|e| &e.item_id == id) {
                continue;
            }
            self.vacate(id);
            if let Some(item) = self.items.get_mut(id) {
                item.placement = Placement::Inbox;
                self.inbox.push(InboxEntry {
                    item_id: id.clone(),
                    date: item.published_at,
                });
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn delete_inbox_entry(&mut self, id: &ItemId, now: DateTime<Utc>) -> Result<(), LibraryError> {
        if !self.inbox.iter().any(|e| &e.item_id == id) {
            return Err(LibraryError::NotInInbox(id.clone()));
        }
        self.inbox.retain(|e| &e.item_id != id);
        self.mark_cleared(id, now);
        Ok(())
    }

    /// Delete inbox entries shown above the pivot (newer than `pivot`)
    pub fn clear_inbox_above(&mut self, pivot: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        self.clear_inbox_where(|date| date > pivot, now)
    }

    /// Delete inbox entries shown below the pivot (older than `pivot`)
    pub fn clear_inbox_below(&mut self, pivot: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        self.clear_inbox_where(|date| date < pivot, now)
    }

    fn clear_inbox_where(&mut self, remove: impl Fn(DateTime<Utc>) -> bool, now: DateTime<Utc>) -> usize {
        let doomed: Vec<ItemId> = self
            .inbox
            .iter()
            .filter(|e| remove(e.date))
            .map(|e| e.item_id.clone())
            .collect();
        self.inbox.retain(|e| !remove(e.date));
        for id in &doomed {
            self.mark_cleared(id, now);
        }
        doomed.len()
    }
}
