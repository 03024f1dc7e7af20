// Chapter markers from free-text descriptions ("0:00 Intro", "Outro - 12:30").

use library_sync_models::Chapter;
use regex::Regex;
use std::sync::OnceLock;
use crate::chapters::{backfill_end_times, CHAPTER_TIME_TOLERANCE};

const TIMESTAMP: &str = r"[\[(]?(?P<ts>(?:\d{1,2}:)?\d{1,2}:\d{2})[\])]?";

static LEADING: OnceLock<Option<Regex>> = OnceLock::new();
static TRAILING: OnceLock<Option<Regex>> = OnceLock::new();

fn leading() -> Option<&'static Regex> {
    LEADING
        .get_or_init(|| Regex::new(&format!(r"^\s*(?:[-*•]\s*)?{}\s*(?:[-–—:|.]\s*)?(?P<title>.*?)\s*$", TIMESTAMP)).ok())
        .as_ref()
}

fn trailing() -> Option<&'static Regex> {
    TRAILING
        .get_or_init(|| Regex::new(&format!(r"^\s*(?P<title>.*?)\s*(?:[-–—:|]\s*)?{}\s*$", TIMESTAMP)).ok())
        .as_ref()
}

/// `h:mm:ss` or `m:ss` in seconds; components past 59 are rejected
pub fn parse_timestamp(text: &str) -> Option<f64> {
    let parts: Vec<u32> = text.split(':').map(|p| p.parse().ok()).collect::<Option<_>>()?;
    let seconds = match parts.as_slice() {
        [m, s] if *s < 60 => m * 60 + s,
        [h, m, s] if *m < 60 && *s < 60 => h * 3600 + m * 60 + s,
        _ => return None,
    };
    Some(f64::from(seconds))
}

fn parse_line(line: &str) -> Option<(f64, Option<String>)> {
    let captures = leading()
        .and_then(|re| re.captures(line))
        .or_else(|| trailing().and_then(|re| re.captures(line)))?;
    let start = parse_timestamp(captures.name("ts")?.as_str())?;
    let title = captures
        .name("title")
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    Some((start, title))
}

/// Native chapters listed in a description.
///
/// A description counts as a chapter list only with at least two
/// timestamps, the first at (about) zero. Duplicate start times keep the
/// first line. End times come from the next chapter, the last one from
/// `duration`.
pub fn parse_description(description: &str, duration: Option<f64>) -> Vec<Chapter> {
    let mut chapters: Vec<Chapter> = Vec::new();
    for (start, title) in description.lines().filter_map(parse_line) {
        if chapters.iter().any(|c| (c.start_time - start).abs() < f64::EPSILON) {
            continue;
        }
        if duration.map(|d| start >= d).unwrap_or(false) {
            continue;
        }
        chapters.push(Chapter::native(title, start, None));
    }

    if chapters.len() < 2 {
        return Vec::new();
    }
    backfill_end_times(&mut chapters, duration);
    if chapters[0].start_time > CHAPTER_TIME_TOLERANCE {
        return Vec::new();
    }
    chapters
}
