use super::*;
use crate::error::LibraryError;
use crate::library::test_support::*;
use crate::store::{LibraryStore, MemoryStore};
use async_trait::async_trait;
use library_sync_models::ChapterCategory;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use library_sync_sources::SourceError;
use std::sync::Arc;

const TOL: f64 = CHAPTER_TIME_TOLERANCE;

fn native(title: &str, start: f64, end: Option<f64>) -> Chapter {
    Chapter::native(Some(title.to_string()), start, end)
}

fn sponsor(start: f64, end: f64) -> Chapter {
    Chapter::segment(ChapterCategory::Sponsor, start, end, false)
}

fn spans(chapters: &[Chapter]) -> Vec<(f64, Option<f64>, bool)> {
    chapters.iter().map(|c| (c.start_time, c.end_time, c.is_external)).collect()
}

fn assert_contiguous(chapters: &[Chapter]) {
    assert!(!chapters.is_empty());
    assert!(chapters[0].start_time.abs() <= TOL, "timeline starts at {}", chapters[0].start_time);
    for pair in chapters.windows(2) {
        let end = pair[0].end_time.expect("closed chapter");
        assert!(
            (end - pair[1].start_time).abs() <= TOL,
            "gap between {} and {}",
            end,
            pair[1].start_time
        );
    }
}

#[test]
fn test_identical_end_splits_native() {
    let merged = merge(&[native("Intro", 0.0, Some(10.0))], &[sponsor(5.0, 10.0)], Some(10.0), TOL);
    assert_eq!(spans(&merged), vec![(0.0, Some(5.0), false), (5.0, Some(10.0), true)]);
    assert_eq!(merged[0].title.as_deref(), Some("Intro"));
    assert_eq!(merged[0].duration, Some(5.0));
    assert_contiguous(&merged);
}

#[test]
fn test_segments_only_get_fillers() {
    let merged = merge(&[], &[sponsor(40.0, 50.0), sponsor(10.0, 20.0)], Some(60.0), TOL);
    assert_eq!(
        spans(&merged),
        vec![
            (0.0, Some(10.0), false),
            (10.0, Some(20.0), true),
            (20.0, Some(40.0), false),
            (40.0, Some(50.0), true),
            (50.0, Some(60.0), false),
        ]
    );
    assert!(merged[0].title.is_none());
    assert_eq!(merged[1].category, ChapterCategory::Sponsor);
    assert_contiguous(&merged);
}

#[test]
fn test_overlapping_segments_are_trimmed() {
    let merged = generate_from_segments(&[sponsor(10.0, 30.0), sponsor(20.0, 40.0), sponsor(25.0, 31.0)], None, TOL);
    assert_eq!(
        spans(&merged),
        vec![(0.0, Some(10.0), false), (10.0, Some(30.0), true), (30.0, Some(40.0), true)]
    );
    assert_contiguous(&merged);
}

#[test]
fn test_small_gaps_within_tolerance_get_no_filler() {
    let merged = merge(&[], &[sponsor(1.0, 20.0), sponsor(21.5, 30.0)], Some(31.0), TOL);
    assert_eq!(spans(&merged), vec![(1.0, Some(20.0), true), (21.5, Some(30.0), true)]);
}

#[test]
fn test_nothing_to_merge() {
    assert!(merge(&[], &[], Some(100.0), TOL).is_empty());
}

#[test]
fn test_native_only_is_backfilled() {
    let merged = merge(
        &[native("B", 30.0, None), native("A", 0.0, None)],
        &[],
        Some(90.0),
        TOL,
    );
    assert_eq!(spans(&merged), vec![(0.0, Some(30.0), false), (30.0, Some(90.0), false)]);
    assert_eq!(merged[0].title.as_deref(), Some("A"));
}

#[test]
fn test_same_span_prefers_external() {
    let chapters = vec![
        native("One", 0.0, None),
        native("Two", 10.0, None),
        native("Three", 20.0, None),
    ];
    let merged = merge(&chapters, &[sponsor(10.5, 20.5)], Some(30.0), TOL);
    assert_eq!(
        spans(&merged),
        vec![(0.0, Some(10.0), false), (10.5, Some(20.5), true), (20.0, Some(30.0), false)]
    );
    assert_contiguous(&merged);
}

#[test]
fn test_same_start_shorter_goes_first() {
    let merged = merge(&[native("Part 1", 0.0, Some(30.0))], &[sponsor(0.0, 10.0)], Some(30.0), TOL);
    assert_eq!(spans(&merged), vec![(0.0, Some(10.0), true), (10.0, Some(30.0), false)]);
    assert_eq!(merged[1].title.as_deref(), Some("Part 1"));
    assert_contiguous(&merged);
}

#[test]
fn test_same_start_native_inside_external_is_suppressed() {
    let chapters = vec![native("Hook", 0.0, None), native("Topic", 5.0, None)];
    let merged = merge(&chapters, &[sponsor(0.0, 20.0)], Some(40.0), TOL);
    assert_eq!(spans(&merged), vec![(0.0, Some(20.0), true), (20.0, Some(40.0), false)]);
    assert_eq!(merged[1].title.as_deref(), Some("Topic"));
    assert_contiguous(&merged);
}

#[test]
fn test_nested_segment_splits_outer_chapter() {
    let merged = merge(&[native("Main", 0.0, Some(60.0))], &[sponsor(20.0, 30.0)], Some(60.0), TOL);
    assert_eq!(
        spans(&merged),
        vec![(0.0, Some(20.0), false), (20.0, Some(30.0), true), (30.0, Some(60.0), false)]
    );
    assert_eq!(merged[0].title, merged[2].title);
    assert_eq!(merged[2].duration, Some(30.0));
    assert_contiguous(&merged);
}

#[test]
fn test_external_block_swallows_native_chapters() {
    let chapters = vec![
        native("A", 0.0, None),
        native("B", 20.0, None),
        native("C", 30.0, None),
    ];
    let merged = merge(&chapters, &[sponsor(10.0, 50.0)], Some(60.0), TOL);
    assert_eq!(
        spans(&merged),
        vec![(0.0, Some(10.0), false), (10.0, Some(50.0), true), (50.0, Some(60.0), false)]
    );
    let titles: Vec<Option<&str>> = merged.iter().map(|c| c.title.as_deref()).collect();
    assert_eq!(titles, vec![Some("A"), None, Some("C")]);
    assert_contiguous(&merged);
}

#[test]
fn test_missing_end_time_is_emitted_unmodified() {
    let chapters = vec![native("Start", 0.0, None), native("Open", 30.0, None)];
    let merged = merge(&chapters, &[sponsor(10.0, 20.0)], None, TOL);
    assert_eq!(
        spans(&merged),
        vec![
            (0.0, Some(10.0), false),
            (10.0, Some(20.0), true),
            (20.0, Some(30.0), false),
            (30.0, None, false),
        ]
    );
}

#[test]
fn test_short_segment_inside_long_chapter_splits_it() {
    let chapters = vec![native("Opening", 0.0, Some(121.0)), native("Middle", 121.0, Some(160.0))];
    let merged = merge(&chapters, &[sponsor(37.0, 39.0)], Some(429.0), TOL);
    assert_eq!(
        spans(&merged),
        vec![
            (0.0, Some(37.0), false),
            (37.0, Some(39.0), true),
            (39.0, Some(121.0), false),
            (121.0, Some(160.0), false),
            (160.0, Some(429.0), false),
        ]
    );
    assert_eq!(merged[2].title.as_deref(), Some("Opening"));
    assert!(merged[4].title.is_none());
    assert_contiguous(&merged);
}

#[test]
fn test_short_segment_near_chapter_edges() {
    let merged = merge(&[native("Main", 0.0, Some(60.0))], &[sponsor(1.0, 2.5)], Some(60.0), TOL);
    assert_eq!(spans(&merged), vec![(1.0, Some(2.5), true), (2.5, Some(60.0), false)]);

    let merged = merge(&[native("Main", 0.0, Some(60.0))], &[sponsor(58.0, 59.5)], Some(60.0), TOL);
    assert_eq!(spans(&merged), vec![(0.0, Some(58.0), false), (58.0, Some(59.5), true)]);
    assert_contiguous(&merged);
}

#[test]
fn test_repeated_native_starts_keep_the_first() {
    let chapters = vec![native("First", 0.0, None), native("Again", 0.0, None), native("Next", 137.0, None)];
    let merged = merge(&chapters, &[], Some(300.0), TOL);
    assert_eq!(spans(&merged), vec![(0.0, Some(137.0), false), (137.0, Some(300.0), false)]);
    assert_eq!(merged[0].title.as_deref(), Some("First"));

    let merged = merge(&chapters, &[sponsor(200.0, 220.0)], Some(300.0), TOL);
    assert_eq!(
        spans(&merged),
        vec![
            (0.0, Some(137.0), false),
            (137.0, Some(200.0), false),
            (200.0, Some(220.0), true),
            (220.0, Some(300.0), false),
        ]
    );
}

#[test]
fn test_overlapping_native_chapters_are_resolved() {
    let chapters = vec![native("Long", 0.0, Some(50.0)), native("Inner", 10.0, Some(30.0))];
    let merged = merge(&chapters, &[], Some(50.0), TOL);
    assert_eq!(
        spans(&merged),
        vec![(0.0, Some(10.0), false), (10.0, Some(30.0), false), (30.0, Some(50.0), false)]
    );
    assert_contiguous(&merged);
}

#[test]
fn test_adjacent_short_segments_are_kept() {
    let merged = generate_from_segments(&[sponsor(10.0, 11.0), sponsor(11.0, 12.0), sponsor(12.0, 13.0)], Some(20.0), TOL);
    assert_eq!(
        spans(&merged),
        vec![
            (0.0, Some(10.0), false),
            (10.0, Some(11.0), true),
            (11.0, Some(12.0), true),
            (12.0, Some(13.0), true),
            (13.0, Some(20.0), false),
        ]
    );
}

#[test]
fn test_empty_segments_are_dropped() {
    let merged = merge(&[native("Main", 0.0, None)], &[sponsor(20.0, 20.0)], Some(40.0), TOL);
    assert_eq!(spans(&merged), vec![(0.0, Some(40.0), false)]);

    let merged = generate_from_segments(&[sponsor(5.0, 5.0), sponsor(10.0, 20.0)], Some(20.0), TOL);
    assert_eq!(spans(&merged), vec![(0.0, Some(10.0), false), (10.0, Some(20.0), true)]);
}

fn random_natives(rng: &mut StdRng, duration: f64) -> Vec<Chapter> {
    let count = rng.gen_range(1..8);
    let mut starts: Vec<f64> = (0..count).map(|_| rng.gen_range(0.0..duration)).collect();
    starts.push(0.0);
    starts.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mut chapters = Vec::new();
    for (index, start) in starts.into_iter().enumerate() {
        let end = if rng.gen_bool(0.2) { Some(start + rng.gen_range(0.5..duration / 2.0)) } else { None };
        chapters.push(native(&format!("c{}", index), start, end));
        if rng.gen_bool(0.15) {
            chapters.push(native(&format!("c{}-again", index), start, None));
        }
    }
    chapters
}

fn random_segments(rng: &mut StdRng, duration: f64) -> Vec<Chapter> {
    let count = rng.gen_range(0..6);
    (0..count)
        .map(|_| {
            let start = rng.gen_range(0.0..duration);
            let length = if rng.gen_bool(0.4) { rng.gen_range(0.1..TOL) } else { rng.gen_range(TOL..duration / 2.0) };
            sponsor(start, start + length)
        })
        .collect()
}

#[test]
fn test_random_timelines_stay_contiguous() {
    let mut rng = StdRng::seed_from_u64(7);
    for case in 0..3000 {
        let duration = rng.gen_range(30.0..900.0);
        let natives = random_natives(&mut rng, duration);
        let segments = random_segments(&mut rng, duration);

        for merged in [
            merge(&natives, &segments, Some(duration), TOL),
            merge(&[], &segments, Some(duration), TOL),
        ] {
            if segments.is_empty() && merged.is_empty() {
                continue;
            }
            assert!(merged.iter().all(|c| c.end_time.is_some()), "case {}: open chapter", case);
            assert!(
                merged.iter().all(|c| c.end_time.unwrap() > c.start_time),
                "case {}: empty chapter in {:?}",
                case,
                spans(&merged)
            );
            assert!(
                merged.windows(2).all(|pair| pair[0].start_time <= pair[1].start_time),
                "case {}: unordered {:?}",
                case,
                spans(&merged)
            );
            assert!(merged[0].start_time <= TOL, "case {}: {:?}", case, spans(&merged));
            for pair in merged.windows(2) {
                let end = pair[0].end_time.unwrap();
                assert!(
                    (end - pair[1].start_time).abs() <= TOL + 1e-9,
                    "case {}: {} then {} in {:?}",
                    case,
                    end,
                    pair[1].start_time,
                    spans(&merged)
                );
            }
        }
    }
}

#[test]
fn test_backfill_end_times() {
    let mut chapters = vec![native("b", 12.0, None), native("a", 0.0, Some(10.0)), native("c", 40.0, None)];
    backfill_end_times(&mut chapters, Some(50.0));
    assert_eq!(
        spans(&chapters),
        vec![(0.0, Some(10.0), false), (12.0, Some(40.0), false), (40.0, Some(50.0), false)]
    );

    let mut open = vec![native("a", 0.0, None)];
    backfill_end_times(&mut open, None);
    assert_eq!(open[0].end_time, None);
}

#[test]
fn test_chapters_changed() {
    let old = vec![native("a", 0.0, Some(10.0)), sponsor(10.0, 20.0)];
    let reordered = vec![sponsor(10.0, 20.0), native("a", 0.0, Some(10.0))];
    assert!(!chapters_changed(&old, &reordered));

    let jitter = vec![native("a", 0.0, Some(10.0001)), sponsor(10.0001, 20.0)];
    assert!(!chapters_changed(&old, &jitter));

    let retitled = vec![native("b", 0.0, Some(10.0)), sponsor(10.0, 20.0)];
    assert!(chapters_changed(&old, &retitled));

    let mut reactivated = old.clone();
    reactivated[1].is_active = true;
    assert!(chapters_changed(&old, &reactivated));

    let moved = vec![native("a", 0.0, Some(11.0)), sponsor(11.0, 20.0)];
    assert!(chapters_changed(&old, &moved));

    assert!(chapters_changed(&old, &old[..1]));
    assert!(!chapters_changed(&[], &[]));
}

struct FixedSegments(Vec<Chapter>);

#[async_trait]
impl SegmentProvider for FixedSegments {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    async fn fetch_segments(&self, _item_id: &ItemId) -> Result<Vec<Chapter>, SourceError> {
        Ok(self.0.clone())
    }
}

fn handle_with_chaptered_item() -> (LibraryHandle, Arc<MemoryStore>) {
    let mut library = library_with_items(1);
    if let Some(item) = library.item_mut(&ItemId::new("v0")) {
        item.chapters = vec![native("Part 1", 0.0, Some(300.0)), native("Part 2", 300.0, None)];
    }
    let store = Arc::new(MemoryStore::with_library(library));
    let handle = LibraryHandle::open(Box::new(store.clone())).unwrap();
    (handle, store)
}

#[tokio::test]
async fn test_refresh_persists_only_changes() {
    let (handle, store) = handle_with_chaptered_item();
    let provider = FixedSegments(vec![sponsor(100.0, 160.0)]);
    let id = ItemId::new("v0");

    let first = refresh_chapters(&handle, &provider, &id, TOL).await.unwrap();
    assert!(first.changed);
    assert_eq!(first.segments, 1);
    assert_eq!(
        spans(&first.chapters),
        vec![
            (0.0, Some(100.0), false),
            (100.0, Some(160.0), true),
            (160.0, Some(300.0), false),
            (300.0, Some(600.0), false),
        ]
    );
    assert_eq!(store.commit_count(), 1);
    let stored = store.load().unwrap();
    assert_eq!(stored.item(&id).unwrap().resolved_chapters().len(), 4);

    let second = refresh_chapters(&handle, &provider, &id, TOL).await.unwrap();
    assert!(!second.changed);
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test]
async fn test_refresh_without_segments_falls_back_to_native() {
    let (handle, store) = handle_with_chaptered_item();
    let id = ItemId::new("v0");

    refresh_chapters(&handle, &FixedSegments(vec![sponsor(100.0, 160.0)]), &id, TOL)
        .await
        .unwrap();
    let cleared = refresh_chapters(&handle, &FixedSegments(Vec::new()), &id, TOL).await.unwrap();

    assert!(cleared.changed);
    assert_eq!(store.commit_count(), 2);
    let merged = handle.read(|library| library.item(&id).unwrap().merged_chapters.clone()).await;
    assert!(merged.is_none());
}

#[tokio::test]
async fn test_refresh_unknown_item() {
    let (handle, store) = handle_with_chaptered_item();
    let result = refresh_chapters(&handle, &FixedSegments(Vec::new()), &ItemId::new("ghost"), TOL).await;
    assert!(matches!(
        result,
        Err(ChapterError::Library(LibraryError::UnknownItem(_)))
    ));
    assert_eq!(store.commit_count(), 0);
}
