use chrono::{DateTime, Utc};
use library_sync_models::{CachedAsset, Item, ItemId, Placement, Source};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{debug, info};
use url::Url;
use crate::library::Library;

/// Indices of the items to remove, keeping the first item of every group
/// that shares a key. Items without a key are never duplicates.
pub fn find_duplicates<T, K, F>(items: &[T], key_fn: F) -> Vec<usize>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    find_duplicates_by(items, key_fn, |_, _| Ordering::Equal)
}

/// Like [`find_duplicates`], but keeps the most preferred member of each
/// group. `prefer(a, b)` returns `Greater` when `a` should be kept over `b`;
/// ties keep the earlier item. Returned indices are ascending.
pub fn find_duplicates_by<T, K, F, P>(items: &[T], key_fn: F, prefer: P) -> Vec<usize>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
    P: Fn(&T, &T) -> Ordering,
{
    let mut groups: HashMap<K, Vec<usize>> = HashMap::new();
    for (index, item) in items.iter().enumerate() {
        if let Some(key) = key_fn(item) {
            groups.entry(key).or_default().push(index);
        }
    }

    let mut remove = Vec::new();
    for members in groups.into_values().filter(|m| m.len() > 1) {
        let mut keeper = members[0];
        for &candidate in &members[1..] {
            if prefer(&items[candidate], &items[keeper]) == Ordering::Greater {
                keeper = candidate;
            }
        }
        remove.extend(members.into_iter().filter(|&i| i != keeper));
    }
    remove.sort_unstable();
    remove
}

/// URL normalized for duplicate detection: scheme, `www.`/`m.` prefixes,
/// fragments and tracking parameters are dropped, short links expanded
pub fn canonical_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host)
        .to_string();

    if host == "youtu.be" {
        let id = url.path_segments()?.next().filter(|s| !s.is_empty())?;
        return Some(format!("youtube.com/watch?v={}", id));
    }

    let path = url.path().trim_end_matches('/');
    match url.query_pairs().find(|(key, _)| key == "v") {
        Some((_, video)) => Some(format!("{}{}?v={}", host, path, video)),
        None => Some(format!("{}{}", host, path)),
    }
}

fn item_key(item: &Item) -> Option<(String, Option<String>)> {
    let url = canonical_url(&item.url).unwrap_or_else(|| item.url.trim().to_string());
    if url.is_empty() {
        return None;
    }
    Some((url, item.playlist_id.clone()))
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Keep order for items: attached to a live source, watched, cleared,
/// further along, holding an entry
fn prefer_item(library: &Library) -> impl Fn(&&Item, &&Item) -> Ordering + '_ {
    move |a, b| {
        library
            .has_live_source(a)
            .cmp(&library.has_live_source(b))
            .then_with(|| a.watched.cmp(&b.watched))
            .then_with(|| a.cleared_at.is_some().cmp(&b.cleared_at.is_some()))
            .then_with(|| compare_f64(a.elapsed_seconds, b.elapsed_seconds))
            .then_with(|| a.is_placed().cmp(&b.is_placed()))
    }
}

/// Keep order for sources: still subscribed, further cursor, older subscription
fn prefer_source(a: &Source, b: &Source) -> Ordering {
    (!a.archived)
        .cmp(&!b.archived)
        .then_with(|| a.most_recent_item_date.cmp(&b.most_recent_item_date))
        .then_with(|| b.subscribed_at.cmp(&a.subscribed_at))
}

fn prefer_asset<'a>(items: &'a HashSet<ItemId>) -> impl Fn(&CachedAsset, &CachedAsset) -> Ordering + 'a {
    move |a, b| {
        let attached = |asset: &CachedAsset| asset.item_id.as_ref().map(|id| items.contains(id)).unwrap_or(false);
        attached(a)
            .cmp(&attached(b))
            .then_with(|| a.cached_at.cmp(&b.cached_at))
    }
}

fn remove_indices<T>(list: &mut Vec<T>, indices: &[usize]) {
    for &index in indices.iter().rev() {
        list.remove(index);
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CleanupReport {
    pub sources_removed: usize,
    pub items_removed: Vec<ItemId>,
    pub assets_removed: usize,
    /// Orphaned or conflicting queue/inbox entries
    pub entries_removed: usize,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.sources_removed + self.items_removed.len() + self.assets_removed + self.entries_removed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Remove duplicate sources, items, cached assets and entries, then repair
/// the queue order. Running it again without new data removes nothing.
pub fn remove_duplicates(library: &mut Library) -> CleanupReport {
    let mut report = CleanupReport::default();

    let duplicate_sources = find_duplicates_by(&library.sources, |s| Some(s.id.clone()), prefer_source);
    remove_indices(&mut library.sources, &duplicate_sources);
    report.sources_removed = duplicate_sources.len();

    let doomed: Vec<ItemId> = {
        let items: Vec<&Item> = library.items().collect();
        find_duplicates_by(&items, |item| item_key(item), prefer_item(library))
            .into_iter()
            .map(|index| items[index].id.clone())
            .collect()
    };
    for id in &doomed {
        debug!(item = %id, "Removing duplicate item");
        library.delete_item(id);
    }
    report.items_removed = doomed;

    let item_ids: HashSet<ItemId> = library.items.keys().cloned().collect();
    let duplicate_assets = find_duplicates_by(&library.assets, |a| Some(a.url.clone()), prefer_asset(&item_ids));
    remove_indices(&mut library.assets, &duplicate_assets);
    report.assets_removed = duplicate_assets.len();

    report.entries_removed = repair_entries(library, &item_ids);

    if !report.is_empty() {
        info!(
            operation = "cleanup",
            sources = report.sources_removed,
            items = report.items_removed.len(),
            assets = report.assets_removed,
            entries = report.entries_removed,
            "Removed duplicates"
        );
    }
    report.finished_at = Some(Utc::now());
    report
}

/// Drop entries pointing at missing items, second entries for the same
/// item (a queue entry wins over an inbox entry), renumber the queue and
/// bring every item's placement tag in line with the entries
fn repair_entries(library: &mut Library, item_ids: &HashSet<ItemId>) -> usize {
    let before = library.queue.len() + library.inbox.len();

    library.queue.sort_by_key(|e| e.order);
    let mut queued: HashSet<ItemId> = HashSet::new();
    library
        .queue
        .retain(|e| item_ids.contains(&e.item_id) && queued.insert(e.item_id.clone()));
    for (order, entry) in library.queue.iter_mut().enumerate() {
        entry.order = order;
    }

    let mut inboxed: HashSet<ItemId> = HashSet::new();
    library.inbox.retain(|e| {
        item_ids.contains(&e.item_id) && !queued.contains(&e.item_id) && inboxed.insert(e.item_id.clone())
    });

    for item in library.items.values_mut() {
        item.placement = if queued.contains(&item.id) {
            Placement::Queue
        } else if inboxed.contains(&item.id) {
            Placement::Inbox
        } else {
            Placement::Unplaced
        };
    }

    before - (library.queue.len() + library.inbox.len())
}
