// Chapter merge engine: native chapter markers combined with external
// segment overlays into one contiguous, non-overlapping timeline.

use library_sync_models::{Chapter, ItemId};
use library_sync_sources::SegmentProvider;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info, warn};
use crate::error::ChapterError;
use crate::store::LibraryHandle;

/// Seconds within which two chapter boundaries count as the same boundary
pub const CHAPTER_TIME_TOLERANCE: f64 = 2.0;

const COMPARE_EPSILON: f64 = 1e-3;

/// Resolve a timeline from native chapters and external segments.
///
/// Without external segments the native chapters are only completed
/// (repeated starts dropped, end times backfilled, overlaps resolved,
/// gaps filled); without native chapters the timeline is generated from
/// the segments.
pub fn merge(native: &[Chapter], external: &[Chapter], duration: Option<f64>, tolerance: f64) -> Vec<Chapter> {
    match (native.is_empty(), external.is_empty()) {
        (true, true) => Vec::new(),
        (true, false) => generate_from_segments(external, duration, tolerance),
        (false, _) => merge_overlay(native, external, duration, tolerance),
    }
}

/// Timeline made of external segments, with filler chapters in every gap
/// wider than `tolerance` (including before the first segment and up to
/// `duration` after the last)
pub fn generate_from_segments(segments: &[Chapter], duration: Option<f64>, tolerance: f64) -> Vec<Chapter> {
    let mut sorted = segments.to_vec();
    sorted.sort_by(by_start);

    let mut trimmed: Vec<Chapter> = Vec::with_capacity(sorted.len());
    let mut covered_until = 0.0_f64;
    for mut segment in sorted {
        let Some(end) = segment.end_time else {
            warn!(start = segment.start_time, "Segment has no end time, keeping it unmodified");
            trimmed.push(segment);
            continue;
        };
        if is_degenerate(&segment) {
            debug!(start = segment.start_time, end, "Empty segment, dropping");
            continue;
        }
        if segment.start_time < covered_until {
            // Only the part past the covered span is new
            if end - covered_until <= tolerance {
                debug!(start = segment.start_time, end, "Segment already covered, dropping");
                continue;
            }
            segment.set_start(covered_until);
        }
        covered_until = end;
        trimmed.push(segment);
    }

    fill_gaps(trimmed, duration, tolerance)
}

/// Overlay external segments on native chapters.
///
/// Chapters are taken from a start-ordered pending stack and settled one by
/// one into an accumulator whose members never contain one another and never
/// overlap by more than `tolerance`. A pending chapter that conflicts with a
/// settled one is resolved against it: pieces of the settled chapter stay
/// settled, pieces of the incoming chapter go back on the stack.
pub fn merge_overlay(native: &[Chapter], external: &[Chapter], duration: Option<f64>, tolerance: f64) -> Vec<Chapter> {
    let mut native = drop_repeated_starts(native.to_vec(), tolerance);
    backfill_end_times(&mut native, duration);

    let mut pending: Vec<Chapter> = native
        .into_iter()
        .chain(external.iter().cloned())
        .filter(|chapter| {
            let empty = is_degenerate(chapter);
            if empty {
                debug!(start = chapter.start_time, end = ?chapter.end_time, "Empty chapter, dropping");
            }
            !empty
        })
        .collect();
    sort_pending(&mut pending);

    let mut settled: Vec<Chapter> = Vec::with_capacity(pending.len());
    while let Some(incoming) = pending.pop() {
        if incoming.end_time.is_none() {
            warn!(
                start = incoming.start_time,
                title = incoming.title.as_deref().unwrap_or(""),
                "Chapter has no end time, emitting it unmodified"
            );
            insert_by_start(&mut settled, incoming);
            continue;
        }

        let conflict = settled.iter().position(|existing| conflicts(existing, &incoming, tolerance));

        match conflict {
            None => insert_by_start(&mut settled, incoming),
            Some(index) => {
                let existing = settled.remove(index);
                let resolution = resolve_pair(existing, incoming, tolerance);
                for chapter in resolution.settled {
                    insert_by_start(&mut settled, chapter);
                }
                if !resolution.pending.is_empty() {
                    pending.extend(resolution.pending);
                    sort_pending(&mut pending);
                }
            }
        }
    }

    for chapter in &mut settled {
        chapter.update_duration();
    }
    fill_gaps(settled, duration, tolerance)
}

/// Native chapters starting within `tolerance` of an earlier one mark the
/// same boundary; the first of them is kept. Sorts by start time.
fn drop_repeated_starts(mut chapters: Vec<Chapter>, tolerance: f64) -> Vec<Chapter> {
    chapters.sort_by(by_start);
    let mut kept: Vec<Chapter> = Vec::with_capacity(chapters.len());
    for chapter in chapters {
        match kept.last() {
            Some(previous) if chapter.start_time - previous.start_time <= tolerance => {
                debug!(
                    start = chapter.start_time,
                    kept = previous.start_time,
                    "Native chapter repeats a start, dropping"
                );
            }
            _ => kept.push(chapter),
        }
    }
    kept
}

/// Outcome of resolving one overlapping pair
#[derive(Debug, Default)]
struct Resolution {
    /// Pieces of the already settled chapter
    settled: Vec<Chapter>,
    /// Pieces of the incoming chapter, to be checked against the rest
    pending: Vec<Chapter>,
}

#[derive(Clone, Copy, PartialEq)]
enum Origin {
    Settled,
    Incoming,
}

impl Resolution {
    fn keep(&mut self, origin: Origin, chapter: Chapter) {
        match origin {
            Origin::Settled => self.settled.push(chapter),
            Origin::Incoming => self.pending.push(chapter),
        }
    }
}

/// A native chapter lying inside an external block is dropped
fn suppressed(inner: &Chapter, outer: &Chapter) -> bool {
    !inner.is_external && outer.is_external
}

fn resolve_pair(existing: Chapter, incoming: Chapter, tolerance: f64) -> Resolution {
    let mut resolution = Resolution::default();
    let near = |x: f64, y: f64| (x - y).abs() <= tolerance;

    let (a_start, a_end) = (existing.start_time, end_of(&existing));
    let (b_start, b_end) = (incoming.start_time, end_of(&incoming));

    // Same span: the external annotation replaces a native chapter
    if near(a_start, b_start) && near(a_end, b_end) {
        if incoming.is_external && !existing.is_external {
            resolution.keep(Origin::Incoming, incoming);
        } else {
            resolution.keep(Origin::Settled, existing);
        }
        return resolution;
    }

    let labelled = [(Origin::Settled, existing), (Origin::Incoming, incoming)];

    // Same start: shorter first, longer resumes where the shorter ends
    if near(a_start, b_start) {
        let [(short_origin, short), (long_origin, mut long)] = order_pair(labelled, |c| end_of(c));
        if suppressed(&short, &long) {
            resolution.keep(long_origin, long);
        } else {
            long.set_start(end_of(&short));
            resolution.keep(short_origin, short);
            resolution.keep(long_origin, long);
        }
        return resolution;
    }

    // Same end: the outer one stops where the inner one starts
    if near(a_end, b_end) {
        let [(outer_origin, mut outer), (inner_origin, inner)] = order_pair(labelled, |c| c.start_time);
        if suppressed(&inner, &outer) {
            resolution.keep(outer_origin, outer);
        } else {
            outer.set_end(inner.start_time);
            resolution.keep(outer_origin, outer);
            resolution.keep(inner_origin, inner);
        }
        return resolution;
    }

    let [(first_origin, mut first), (second_origin, mut second)] = order_pair(labelled, |c| c.start_time);

    // Nested: split the outer one around the inner one
    if end_of(&second) < end_of(&first) {
        let (outer, inner) = (first, second);
        if suppressed(&inner, &outer) {
            resolution.keep(first_origin, outer);
            return resolution;
        }
        let mut before = outer.clone();
        before.set_end(inner.start_time);
        let mut after = outer;
        after.set_start(end_of(&inner));
        resolution.keep(first_origin, before);
        resolution.keep(second_origin, inner);
        resolution.keep(first_origin, after);
        return resolution;
    }

    // Plain overlap: the external side keeps the shared span
    if first.is_external && !second.is_external {
        second.set_start(end_of(&first));
    } else {
        first.set_end(second.start_time);
    }
    resolution.keep(first_origin, first);
    resolution.keep(second_origin, second);
    resolution
}

/// Sort a labelled pair by `key`, earlier first
fn order_pair(
    pair: [(Origin, Chapter); 2],
    key: impl Fn(&Chapter) -> f64,
) -> [(Origin, Chapter); 2] {
    let [x, y] = pair;
    if key(&y.1) < key(&x.1) {
        [y, x]
    } else {
        [x, y]
    }
}

/// Fill missing end times from the next chapter's start, or from
/// `duration` for the last one. Sorts by start time.
pub fn backfill_end_times(chapters: &mut [Chapter], duration: Option<f64>) {
    chapters.sort_by(by_start);
    let starts: Vec<f64> = chapters.iter().map(|c| c.start_time).skip(1).collect();
    let len = chapters.len();
    for (index, chapter) in chapters.iter_mut().enumerate() {
        if chapter.end_time.is_some() {
            continue;
        }
        let next = if index + 1 < len { starts.get(index).copied() } else { duration };
        if let Some(end) = next {
            chapter.set_end(end);
        }
    }
}

/// Insert filler chapters wherever the sorted timeline leaves a gap wider
/// than `tolerance`: from 0, between chapters, and up to `duration`
pub fn fill_gaps(mut chapters: Vec<Chapter>, duration: Option<f64>, tolerance: f64) -> Vec<Chapter> {
    chapters.sort_by(by_start);
    let mut filled = Vec::with_capacity(chapters.len() + 2);
    let mut cursor = Some(0.0_f64);

    for chapter in chapters {
        if let Some(previous_end) = cursor {
            if chapter.start_time - previous_end > tolerance {
                filled.push(Chapter::filler(previous_end, chapter.start_time));
            }
        }
        cursor = match (cursor, chapter.end_time) {
            (Some(previous_end), Some(end)) => Some(previous_end.max(end)),
            (None, Some(end)) => Some(end),
            (_, None) => None,
        };
        filled.push(chapter);
    }

    if let (Some(previous_end), Some(duration)) = (cursor, duration) {
        if duration - previous_end > tolerance {
            filled.push(Chapter::filler(previous_end, duration));
        }
    }
    filled
}

/// Whether two timelines differ in a way worth persisting. Both sides are
/// compared position by position after sorting by start time.
pub fn chapters_changed(old: &[Chapter], new: &[Chapter]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    let mut old = old.to_vec();
    let mut new = new.to_vec();
    old.sort_by(by_start);
    new.sort_by(by_start);

    old.iter().zip(new.iter()).any(|(a, b)| {
        !same_time(Some(a.start_time), Some(b.start_time))
            || !same_time(a.end_time, b.end_time)
            || a.category != b.category
            || a.title != b.title
            || a.is_active != b.is_active
    })
}

/// Result of refreshing an item's external segments
#[derive(Debug, Clone, Serialize)]
pub struct ChapterRefresh {
    pub item_id: ItemId,
    pub segments: usize,
    pub changed: bool,
    pub chapters: Vec<Chapter>,
}

/// Fetch external segments for an item, merge them with its native
/// chapters and persist the timeline when it differs from the stored one
pub async fn refresh_chapters(
    handle: &LibraryHandle,
    provider: &dyn SegmentProvider,
    item_id: &ItemId,
    tolerance: f64,
) -> Result<ChapterRefresh, ChapterError> {
    let (native, duration, current) = handle
        .read(|library| {
            library.item(item_id).map(|item| {
                (item.chapters.clone(), item.duration, item.resolved_chapters().to_vec())
            })
        })
        .await
        .ok_or_else(|| crate::error::LibraryError::UnknownItem(item_id.clone()))?;

    let segments = provider.fetch_segments(item_id).await?;
    let merged = if segments.is_empty() {
        None
    } else {
        Some(merge(&native, &segments, duration, tolerance))
    };
    let resolved = merged.clone().unwrap_or_else(|| native.clone());

    let changed = chapters_changed(&current, &resolved);
    if changed {
        handle
            .mutate(|library| library.set_merged_chapters(item_id, merged))
            .await??;
        info!(
            operation = "chapters_refreshed",
            item = %item_id,
            provider = provider.provider_name(),
            segments = segments.len(),
            chapters = resolved.len(),
            "Stored merged chapters"
        );
    } else {
        debug!(item = %item_id, "Chapters unchanged, skipping write");
    }

    Ok(ChapterRefresh {
        item_id: item_id.clone(),
        segments: segments.len(),
        changed,
        chapters: resolved,
    })
}

fn same_time(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() < COMPARE_EPSILON,
        (None, None) => true,
        _ => false,
    }
}

fn end_of(chapter: &Chapter) -> f64 {
    chapter.end_time.unwrap_or(chapter.start_time)
}

/// Length of the shared span, if both chapters are closed
fn overlap(a: &Chapter, b: &Chapter) -> Option<f64> {
    let (a_end, b_end) = (a.end_time?, b.end_time?);
    Some(a_end.min(b_end) - a.start_time.max(b.start_time))
}

/// Two closed chapters need resolving when one lies inside the other, or
/// when they share more than `tolerance`
fn conflicts(a: &Chapter, b: &Chapter, tolerance: f64) -> bool {
    match overlap(a, b) {
        Some(shared) if shared > COMPARE_EPSILON => shared > tolerance || contains(a, b) || contains(b, a),
        _ => false,
    }
}

fn contains(outer: &Chapter, inner: &Chapter) -> bool {
    inner.start_time >= outer.start_time && end_of(inner) <= end_of(outer)
}

/// Closed chapter without any length
fn is_degenerate(chapter: &Chapter) -> bool {
    chapter.end_time.map(|end| end - chapter.start_time <= COMPARE_EPSILON).unwrap_or(false)
}

fn by_start(a: &Chapter, b: &Chapter) -> Ordering {
    a.start_time
        .partial_cmp(&b.start_time)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.is_external.cmp(&b.is_external))
}

/// Latest start first, so `pop` yields the earliest chapter
fn sort_pending(pending: &mut [Chapter]) {
    pending.sort_by(|a, b| by_start(b, a));
}

fn insert_by_start(chapters: &mut Vec<Chapter>, chapter: Chapter) {
    let index = chapters.partition_point(|c| by_start(c, &chapter) != Ordering::Greater);
    chapters.insert(index, chapter);
}

#[cfg(test)]
mod tests;
