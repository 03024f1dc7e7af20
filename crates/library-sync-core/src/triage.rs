use chrono::{DateTime, Utc};
use library_sync_config::LibraryConfig;
use library_sync_models::{CandidateItem, Destination, Item, ItemId, Source, SourceId, TriagePlacement};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;
use crate::chapter_parse::parse_description;
use crate::error::LibraryError;
use crate::library::Library;
use crate::queue::QueueIndex;

const SHORTS_TAG: &str = "#shorts";

/// Global placement settings that sources may override
#[derive(Debug, Clone)]
pub struct TriageDefaults {
    /// Items placed on a source's first sync
    pub triage_limit: usize,
    pub default_placement: TriagePlacement,
    pub hide_shorts: bool,
    pub short_max_duration: f64,
}

impl From<&LibraryConfig> for TriageDefaults {
    fn from(config: &LibraryConfig) -> Self {
        Self {
            triage_limit: config.triage_limit,
            default_placement: config.default_placement,
            hide_shorts: config.hide_shorts,
            short_max_duration: config.short_max_duration_seconds,
        }
    }
}

impl Default for TriageDefaults {
    fn default() -> Self {
        Self::from(&LibraryConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlacedItem {
    pub item_id: ItemId,
    pub source_id: Option<SourceId>,
    pub destination: Destination,
}

/// What one source's candidates did to the library
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlacementReport {
    pub placed: Vec<PlacedItem>,
    pub new_items: usize,
    pub updated_items: usize,
    pub discarded: usize,
    /// Malformed candidates
    pub dropped: usize,
    pub cursor: Option<DateTime<Utc>>,
}

impl PlacementReport {
    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }
}

/// Short-form when tagged `#shorts`, or when the known duration is within
/// `max_duration`. Unknown without a tag or a positive duration.
pub fn detect_short(title: &str, description: Option<&str>, duration: Option<f64>, max_duration: f64) -> Option<bool> {
    let tagged = |text: &str| text.to_lowercase().contains(SHORTS_TAG);
    if tagged(title) || description.map(tagged).unwrap_or(false) {
        return Some(true);
    }
    duration.filter(|d| *d > 0.0).map(|d| d <= max_duration)
}

/// Playlist id carried by a feed locator (`playlist_id=` or `list=` query)
pub fn playlist_from_locator(locator: &str) -> Option<String> {
    let url = Url::parse(locator).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "playlist_id" || key == "list")
        .map(|(_, value)| value.into_owned())
}

fn effective_placement(source: Option<&Source>, item: &Item, defaults: &TriageDefaults) -> TriagePlacement {
    let placement = source
        .map(|s| s.placement.resolve(defaults.default_placement))
        .unwrap_or(defaults.default_placement);
    let hides_shorts = source
        .map(|s| s.short_policy.hides(defaults.hide_shorts))
        .unwrap_or(defaults.hide_shorts);

    if item.is_short == Some(true) && hides_shorts {
        TriagePlacement::Discard
    } else {
        placement
    }
}

/// Refresh the fields a feed may change after publication. Placement is
/// left alone. Returns whether anything changed.
fn apply_metadata(item: &mut Item, candidate: &CandidateItem, defaults: &TriageDefaults) -> bool {
    let mut changed = false;

    if item.title != candidate.title {
        item.title = candidate.title.clone();
        changed = true;
    }
    if candidate.thumbnail_url.is_some() && item.thumbnail_url != candidate.thumbnail_url {
        item.thumbnail_url = candidate.thumbnail_url.clone();
        changed = true;
    }
    if candidate.duration.is_some() && item.duration != candidate.duration {
        item.duration = candidate.duration;
        changed = true;
    }
    if candidate.description.is_some() && item.description != candidate.description {
        item.description = candidate.description.clone();
        item.chapters = candidate
            .description
            .as_deref()
            .map(|d| parse_description(d, item.duration))
            .unwrap_or_default();
        changed = true;
    }
    if let Some(updated) = candidate.updated_at {
        if item.updated_at.map(|current| updated > current).unwrap_or(true) {
            item.updated_at = Some(updated);
            changed = true;
        }
    }
    if item.is_short.is_none() {
        item.is_short = detect_short(&item.title, item.description.as_deref(), item.duration, defaults.short_max_duration);
    }
    changed
}

fn new_item(candidate: &CandidateItem, source: &Source, defaults: &TriageDefaults) -> Item {
    let mut item = Item::from_candidate(candidate, Some(source.id.clone()));
    item.playlist_id = playlist_from_locator(&source.locator);
    item.chapters = candidate
        .description
        .as_deref()
        .map(|d| parse_description(d, candidate.duration))
        .unwrap_or_default();
    item.is_short = detect_short(
        &candidate.title,
        candidate.description.as_deref(),
        candidate.duration,
        defaults.short_max_duration,
    );
    item
}

/// Place each batch where its placement says, oldest first. Returns what
/// was placed; a failed batch is logged and skipped.
fn place_batches(library: &mut Library, batches: Vec<(TriagePlacement, Vec<ItemId>)>) -> Vec<(ItemId, Destination)> {
    let mut placed = Vec::new();
    for (placement, ids) in batches {
        let Some(destination) = placement.destination() else { continue };
        if ids.is_empty() {
            continue;
        }

        let result = match placement {
            TriagePlacement::Inbox => library.add_to_inbox(&ids),
            TriagePlacement::QueueNext => {
                let at = if library.queue_len() == 0 { QueueIndex::At(0) } else { QueueIndex::At(1) };
                library.insert_into_queue(&ids, at)
            }
            TriagePlacement::QueueLast => library.insert_into_queue(&ids, QueueIndex::Tail),
            TriagePlacement::Discard => continue,
        };

        match result {
            Ok(_) => {
                for id in ids {
                    if let Some(item) = library.item_mut(&id) {
                        item.is_new = true;
                    }
                    placed.push((id, destination));
                }
            }
            Err(e) => warn!(?placement, count = ids.len(), "Failed to place items: {}", e),
        }
    }
    placed
}

/// Triage one source's fetched candidates.
///
/// New candidates become items. On a source's first sync only the newest
/// `triage_limit` of them are placed, afterwards only those published after
/// the source's cursor. The cursor then moves to the newest published date
/// among all well-formed candidates.
pub fn place_items(
    library: &mut Library,
    source_id: &SourceId,
    candidates: &[CandidateItem],
    defaults: &TriageDefaults,
) -> Result<PlacementReport, LibraryError> {
    let source = library
        .source(source_id)
        .cloned()
        .ok_or_else(|| LibraryError::UnknownSource(source_id.clone()))?;
    let mut report = PlacementReport::default();

    let mut seen = HashSet::new();
    let mut valid: Vec<&CandidateItem> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if let Some(reason) = candidate.shape_error() {
            warn!(source = %source_id, item = %candidate.id, reason, "Dropping malformed candidate");
            report.dropped += 1;
            continue;
        }
        if seen.insert(&candidate.id) {
            valid.push(candidate);
        }
    }

    let mut fresh: Vec<(DateTime<Utc>, ItemId)> = Vec::new();
    for candidate in &valid {
        if let Some(existing) = library.item_mut(&candidate.id) {
            if apply_metadata(existing, candidate, defaults) {
                report.updated_items += 1;
            }
            continue;
        }
        if library.insert_item(new_item(candidate, &source, defaults)) {
            fresh.push((candidate.published_at, candidate.id.clone()));
        }
    }
    report.new_items = fresh.len();

    // Newest first for the first-sync cap, then oldest first for placement
    fresh.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    let mut eligible: Vec<ItemId> = match source.most_recent_item_date {
        None => fresh.into_iter().take(defaults.triage_limit).map(|(_, id)| id).collect(),
        Some(cursor) => fresh
            .into_iter()
            .filter(|(published, _)| *published > cursor)
            .map(|(_, id)| id)
            .collect(),
    };
    eligible.reverse();

    let mut batches: Vec<(TriagePlacement, Vec<ItemId>)> = vec![
        (TriagePlacement::Inbox, Vec::new()),
        (TriagePlacement::QueueNext, Vec::new()),
        (TriagePlacement::QueueLast, Vec::new()),
    ];
    for id in eligible {
        let Some(item) = library.item(&id) else { continue };
        let placement = effective_placement(Some(&source), item, defaults);
        match batches.iter_mut().find(|(p, _)| *p == placement) {
            Some((_, ids)) => ids.push(id),
            None => {
                debug!(source = %source_id, item = %id, "Discarding item");
                report.discarded += 1;
            }
        }
    }

    report.placed = place_batches(library, batches)
        .into_iter()
        .map(|(item_id, destination)| PlacedItem {
            item_id,
            source_id: Some(source_id.clone()),
            destination,
        })
        .collect();

    if let Some(newest) = valid.iter().map(|c| c.published_at).max() {
        if let Some(source) = library.source_mut(source_id) {
            source.advance_cursor(newest);
        }
    }
    report.cursor = library.source(source_id).and_then(|s| s.most_recent_item_date);

    info!(
        operation = "triage",
        source = %source_id,
        candidates = candidates.len(),
        new_items = report.new_items,
        placed = report.placed.len(),
        discarded = report.discarded,
        "Triaged source"
    );
    Ok(report)
}

/// Place every item whose defer date has passed. Discard placements fall
/// back to the inbox: the user asked to see the item again.
pub fn place_due_deferred(library: &mut Library, now: DateTime<Utc>, defaults: &TriageDefaults) -> Vec<PlacedItem> {
    let mut batches: Vec<(TriagePlacement, Vec<ItemId>)> = vec![
        (TriagePlacement::Inbox, Vec::new()),
        (TriagePlacement::QueueNext, Vec::new()),
        (TriagePlacement::QueueLast, Vec::new()),
    ];

    for id in library.due_deferred(now) {
        let Some(item) = library.item_mut(&id) else { continue };
        item.defer_date = None;
        if item.is_placed() || item.watched {
            continue;
        }

        let item = item.clone();
        let source = item.source_id.as_ref().and_then(|s| library.source(s));
        let placement = source
            .map(|s| s.placement.resolve(defaults.default_placement))
            .unwrap_or(defaults.default_placement);
        let placement = match placement {
            TriagePlacement::Discard => TriagePlacement::Inbox,
            other => other,
        };
        if let Some((_, ids)) = batches.iter_mut().find(|(p, _)| *p == placement) {
            ids.push(id);
        }
    }

    let placed: Vec<PlacedItem> = place_batches(library, batches)
        .into_iter()
        .map(|(item_id, destination)| PlacedItem {
            source_id: library.item(&item_id).and_then(|i| i.source_id.clone()),
            item_id,
            destination,
        })
        .collect();

    if !placed.is_empty() {
        info!(operation = "deferred", placed = placed.len(), "Placed deferred items");
    }
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_support::*;
    use library_sync_models::{Placement, PlacementPolicy, ShortPolicy};

    fn feed(days: std::ops::RangeInclusive<u32>) -> Vec<CandidateItem> {
        days.map(|day| candidate(&format!("v{}", day), day)).collect()
    }

    fn library_with_source(source: Source) -> Library {
        let mut library = Library::new();
        library.subscribe(source);
        library
    }

    fn uc1() -> SourceId {
        SourceId::new("UC1")
    }

    #[test]
    fn test_first_sync_places_newest_only() {
        let mut library = library_with_source(source("UC1"));
        let report = place_items(&mut library, &uc1(), &feed(1..=20), &TriageDefaults::default()).unwrap();

        assert_eq!(report.new_items, 20);
        assert_eq!(library.item_count(), 20);
        let placed: Vec<ItemId> = report.placed.iter().map(|p| p.item_id.clone()).collect();
        assert_eq!(placed, ids(&["v16", "v17", "v18", "v19", "v20"]));
        assert!(report.placed.iter().all(|p| p.destination == Destination::Inbox));
        assert_eq!(library.inbox_len(), 5);
        assert_eq!(report.cursor, Some(at(20)));
        assert!(library.item(&ItemId::new("v20")).unwrap().is_new);
        assert!(!library.item(&ItemId::new("v1")).unwrap().is_placed());
        library.check_invariants().unwrap();
    }

    #[test]
    fn test_later_sync_places_only_items_past_cursor() {
        let mut library = library_with_source(source("UC1"));
        let defaults = TriageDefaults::default();
        place_items(&mut library, &uc1(), &feed(1..=3), &defaults).unwrap();

        let report = place_items(&mut library, &uc1(), &feed(2..=5), &defaults).unwrap();
        assert_eq!(report.new_items, 2);
        let placed: Vec<ItemId> = report.placed.iter().map(|p| p.item_id.clone()).collect();
        assert_eq!(placed, ids(&["v4", "v5"]));
        assert_eq!(report.cursor, Some(at(5)));
    }

    #[test]
    fn test_cursor_never_moves_backward() {
        let mut library = library_with_source(source("UC1"));
        let defaults = TriageDefaults::default();
        place_items(&mut library, &uc1(), &feed(10..=12), &defaults).unwrap();

        let report = place_items(&mut library, &uc1(), &feed(1..=2), &defaults).unwrap();
        assert!(report.placed.is_empty());
        assert_eq!(report.cursor, Some(at(12)));
        assert_eq!(library.item_count(), 5);
    }

    #[test]
    fn test_queue_next_inserts_after_head() {
        let mut library = library_with_items(2);
        library.insert_into_queue(&ids(&["v0", "v1"]), QueueIndex::Tail).unwrap();
        let mut channel = source("UC2");
        channel.placement = PlacementPolicy::QueueNext;
        channel.most_recent_item_date = Some(at(1));
        library.subscribe(channel);

        place_items(&mut library, &SourceId::new("UC2"), &feed(5..=6), &TriageDefaults::default()).unwrap();
        assert_eq!(library.queue_ids(), ids(&["v0", "v5", "v6", "v1"]));
        library.check_invariants().unwrap();
    }

    #[test]
    fn test_queue_last_and_discard() {
        let mut library = library_with_items(1);
        library.insert_into_queue(&ids(&["v0"]), QueueIndex::Tail).unwrap();
        let defaults = TriageDefaults {
            default_placement: TriagePlacement::QueueLast,
            ..TriageDefaults::default()
        };
        let mut muted = source("UC3");
        muted.placement = PlacementPolicy::Discard;
        library.subscribe(source("UC2"));
        library.subscribe(muted);

        place_items(&mut library, &SourceId::new("UC2"), &feed(5..=6), &defaults).unwrap();
        assert_eq!(library.queue_ids(), ids(&["v0", "v5", "v6"]));

        let report = place_items(&mut library, &SourceId::new("UC3"), &feed(7..=8), &defaults).unwrap();
        assert!(report.placed.is_empty());
        assert_eq!(report.discarded, 2);
        assert_eq!(report.cursor, Some(at(8)));
        assert_eq!(library.item(&ItemId::new("v7")).unwrap().placement, Placement::Unplaced);
    }

    #[test]
    fn test_shorts_follow_source_policy_first() {
        let defaults = TriageDefaults {
            hide_shorts: true,
            ..TriageDefaults::default()
        };
        let mut short = candidate("s1", 3);
        short.duration = Some(45.0);
        let mut tagged = candidate("s2", 4);
        tagged.title = "Quick tip #Shorts".to_string();
        tagged.duration = None;
        let candidates = vec![candidate("long", 2), short, tagged];

        let mut library = library_with_source(source("UC1"));
        let report = place_items(&mut library, &uc1(), &candidates, &defaults).unwrap();
        assert_eq!(report.placed.len(), 1);
        assert_eq!(report.discarded, 2);
        assert_eq!(library.item(&ItemId::new("s2")).unwrap().is_short, Some(true));

        let mut showing = source("UC2");
        showing.short_policy = ShortPolicy::Show;
        let mut library = library_with_source(showing);
        let report = place_items(&mut library, &SourceId::new("UC2"), &candidates, &defaults).unwrap();
        assert_eq!(report.placed.len(), 3);
    }

    #[test]
    fn test_malformed_and_duplicate_candidates() {
        let mut broken = candidate("bad", 3);
        broken.url = String::new();
        let candidates = vec![candidate("a", 1), broken, candidate("a", 1), candidate("b", 2)];

        let mut library = library_with_source(source("UC1"));
        let report = place_items(&mut library, &uc1(), &candidates, &TriageDefaults::default()).unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.new_items, 2);
        assert_eq!(library.inbox_len(), 2);
        assert_eq!(report.cursor, Some(at(2)));
    }

    #[test]
    fn test_existing_items_get_metadata_only() {
        let mut library = library_with_source(source("UC1"));
        let defaults = TriageDefaults::default();
        place_items(&mut library, &uc1(), &feed(1..=2), &defaults).unwrap();
        library.delete_inbox_entry(&ItemId::new("v1"), at(5)).unwrap();

        let mut edited = candidate("v1", 1);
        edited.title = "Renamed".to_string();
        edited.description = Some("0:00 Start\n5:00 End".to_string());
        let report = place_items(&mut library, &uc1(), &[edited], &defaults).unwrap();

        assert_eq!(report.updated_items, 1);
        assert!(report.placed.is_empty());
        let item = library.item(&ItemId::new("v1")).unwrap();
        assert_eq!(item.title, "Renamed");
        assert_eq!(item.chapters.len(), 2);
        assert_eq!(item.chapters[1].end_time, Some(600.0));
        assert_eq!(item.placement, Placement::Unplaced);
    }

    #[test]
    fn test_unknown_source() {
        let mut library = Library::new();
        let result = place_items(&mut library, &uc1(), &feed(1..=1), &TriageDefaults::default());
        assert_eq!(result.unwrap_err(), LibraryError::UnknownSource(uc1()));
        assert_eq!(library.item_count(), 0);
    }

    #[test]
    fn test_playlist_and_short_detection() {
        assert_eq!(
            playlist_from_locator("https://www.youtube.com/feeds/videos.xml?playlist_id=PL123"),
            Some("PL123".to_string())
        );
        assert_eq!(playlist_from_locator("https://www.youtube.com/feeds/videos.xml?channel_id=UC1"), None);
        assert_eq!(playlist_from_locator("not a url"), None);

        assert_eq!(detect_short("Title", Some("watch #shorts"), Some(600.0), 60.0), Some(true));
        assert_eq!(detect_short("Title", None, Some(60.0), 60.0), Some(true));
        assert_eq!(detect_short("Title", None, Some(61.0), 60.0), Some(false));
        assert_eq!(detect_short("Title", None, None, 60.0), None);
        assert_eq!(detect_short("Title", None, Some(0.0), 60.0), None);
    }

    #[test]
    fn test_due_deferred_items_are_placed() {
        let mut library = library_with_items(3);
        let mut muted = source("UC2");
        muted.placement = PlacementPolicy::Discard;
        library.subscribe(muted);
        library.insert_item(item("m1", Some("UC2"), 4));

        library.defer_item(&ItemId::new("v0"), at(10)).unwrap();
        library.defer_item(&ItemId::new("m1"), at(10)).unwrap();
        library.defer_item(&ItemId::new("v1"), at(15)).unwrap();

        let placed = place_due_deferred(&mut library, at(12), &TriageDefaults::default());
        let placed_ids: Vec<ItemId> = placed.iter().map(|p| p.item_id.clone()).collect();
        assert_eq!(placed_ids, ids(&["m1", "v0"]));
        assert!(placed.iter().all(|p| p.destination == Destination::Inbox));
        assert_eq!(placed[0].source_id, Some(SourceId::new("UC2")));
        assert!(library.item(&ItemId::new("v0")).unwrap().defer_date.is_none());
        assert_eq!(library.due_deferred(at(20)), ids(&["v1"]));
        library.check_invariants().unwrap();
    }
}
