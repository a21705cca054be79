//! Date phrase resolution.
//!
//! Every recognised phrase in the question becomes a candidate range. Overlapping candidates keep
//! only the most specific one, then the earliest-mentioned survivor wins.

use crate::state::RetrievedChunk;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

/// How a date phrase was recognised, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PhraseKind {
    /// Calendar event named in a retrieved document
    Event,
    Range,
    Day,
    Season,
    Quarter,
    Month,
    Year,
}

/// A date phrase found in the question
#[derive(Debug, Clone, PartialEq)]
pub struct DatePhrase {
    pub kind: PhraseKind,
    pub text: String,
    /// Byte span in the question
    pub span: (usize, usize),
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Retrieved chunks that state or mention this period
    pub sources: Vec<String>,
}

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{4}-\d{2}-\d{2})\s*(?:to|through|until|and|–|-)\s*(\d{4}-\d{2}-\d{2})\b",
    )
    .expect("date pattern is valid")
});

static DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("date pattern is valid"));

static SEASON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(spring|summer|fall|autumn|winter)\s+(?:of\s+)?((?:19|20)\d{2})\b",
    )
    .expect("date pattern is valid")
});

static SEASON_REV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b((?:19|20)\d{2})\s+(spring|summer|fall|autumn|winter)\b",
    )
    .expect("date pattern is valid")
});

static QUARTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bq([1-4])\s*(?:of\s+)?((?:19|20)\d{2})\b",
    )
    .expect("date pattern is valid")
});

static QUARTER_WORDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(first|second|third|fourth)\s+quarter\s+(?:of\s+)?((?:19|20)\d{2})\b",
    )
    .expect("date pattern is valid")
});

static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?\s+(?:of\s+)?((?:19|20)\d{2})\b",
    )
    .expect("date pattern is valid")
});

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("date pattern is valid"));

static EVENT_DATES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)dates?:\s*(\d{4}-\d{2}-\d{2})\s*(?:to|through|until|–|-)\s*(\d{4}-\d{2}-\d{2})",
    )
    .expect("date pattern is valid")
});

fn parse_iso(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

fn months_bounds(year: i32, first: u32, last: u32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, first, 1)?,
        last_day_of_month(year, last)?,
    ))
}

/// Meteorological seasons; winter runs from December into the following February.
pub fn season_bounds(season: &str, year: i32) -> Option<(NaiveDate, NaiveDate)> {
    match season.to_ascii_lowercase().as_str() {
        "spring" => months_bounds(year, 3, 5),
        "summer" => months_bounds(year, 6, 8),
        "fall" | "autumn" => months_bounds(year, 9, 11),
        "winter" => Some((
            NaiveDate::from_ymd_opt(year, 12, 1)?,
            last_day_of_month(year + 1, 2)?,
        )),
        _ => None,
    }
}

pub fn quarter_bounds(quarter: u32, year: i32) -> Option<(NaiveDate, NaiveDate)> {
    if !(1..=4).contains(&quarter) {
        return None;
    }
    months_bounds(year, quarter * 3 - 2, quarter * 3)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_ascii_lowercase().trim_end_matches('.') {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn quarter_number(word: &str) -> Option<u32> {
    match word.to_ascii_lowercase().as_str() {
        "first" => Some(1),
        "second" => Some(2),
        "third" => Some(3),
        "fourth" => Some(4),
        _ => None,
    }
}

/// Chunks mentioning every term, else chunks mentioning the fallback term.
fn mentioning(context: &[RetrievedChunk], terms: &[String], fallback: &str) -> Vec<String> {
    let lowered: Vec<String> = context.iter().map(|c| c.text.to_lowercase()).collect();
    let all: Vec<String> = context
        .iter()
        .zip(&lowered)
        .filter(|(_, text)| terms.iter().all(|t| text.contains(t.as_str())))
        .map(|(c, _)| c.source_id.clone())
        .collect();
    if !all.is_empty() {
        return all;
    }
    context
        .iter()
        .zip(&lowered)
        .filter(|(_, text)| text.contains(fallback))
        .map(|(c, _)| c.source_id.clone())
        .collect()
}

/// Calendar events defined in retrieved chunks: heading title plus a `Dates:` line.
fn events_in(chunk: &RetrievedChunk) -> Vec<(String, NaiveDate, NaiveDate)> {
    let mut events = Vec::new();
    let mut title: Option<String> = None;
    for line in chunk.text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            title = (!heading.is_empty()).then(|| heading.to_string());
            continue;
        }
        if let (Some(current), Some(caps)) = (&title, EVENT_DATES_RE.captures(trimmed)) {
            if let (Some(start), Some(end)) = (parse_iso(&caps[1]), parse_iso(&caps[2])) {
                if start <= end {
                    events.push((current.clone(), start, end));
                }
            }
        }
    }
    events
}

fn collect_candidates(question: &str, context: &[RetrievedChunk]) -> Vec<DatePhrase> {
    let mut candidates = Vec::new();
    let lowered = question.to_ascii_lowercase();

    for chunk in context {
        for (title, start, end) in events_in(chunk) {
            let needle = title.to_ascii_lowercase();
            if needle.len() < 3 {
                continue;
            }
            if let Some(pos) = lowered.find(&needle) {
                candidates.push(DatePhrase {
                    kind: PhraseKind::Event,
                    text: question[pos..pos + needle.len()].to_string(),
                    span: (pos, pos + needle.len()),
                    start,
                    end,
                    sources: vec![chunk.source_id.clone()],
                });
            }
        }
    }

    for caps in RANGE_RE.captures_iter(question) {
        let whole = caps.get(0).map(|m| (m.start(), m.end(), m.as_str()));
        if let (Some((s, e, text)), Some(start), Some(end)) =
            (whole, parse_iso(&caps[1]), parse_iso(&caps[2]))
        {
            if start <= end {
                candidates.push(DatePhrase {
                    kind: PhraseKind::Range,
                    text: text.to_string(),
                    span: (s, e),
                    start,
                    end,
                    sources: mentioning(context, &[caps[1].to_string()], &caps[1]),
                });
            }
        }
    }

    for m in DAY_RE.find_iter(question) {
        if let Some(day) = parse_iso(m.as_str()) {
            candidates.push(DatePhrase {
                kind: PhraseKind::Day,
                text: m.as_str().to_string(),
                span: (m.start(), m.end()),
                start: day,
                end: day,
                sources: mentioning(context, &[m.as_str().to_string()], m.as_str()),
            });
        }
    }

    let mut push_season = |m: regex::Match, season: &str, year: &str| {
        if let Some((start, end)) = year
            .parse::<i32>()
            .ok()
            .and_then(|y| season_bounds(season, y))
        {
            candidates.push(DatePhrase {
                kind: PhraseKind::Season,
                text: m.as_str().to_string(),
                span: (m.start(), m.end()),
                start,
                end,
                sources: mentioning(
                    context,
                    &[season.to_ascii_lowercase(), year.to_string()],
                    year,
                ),
            });
        }
    };
    for caps in SEASON_RE.captures_iter(question) {
        if let Some(m) = caps.get(0) {
            push_season(m, &caps[1], &caps[2]);
        }
    }
    for caps in SEASON_REV_RE.captures_iter(question) {
        if let Some(m) = caps.get(0) {
            push_season(m, &caps[2], &caps[1]);
        }
    }

    let quarter_matches = QUARTER_RE
        .captures_iter(question)
        .filter_map(|caps| Some((caps.get(0)?, caps[1].parse::<u32>().ok()?, caps[2].to_string())))
        .chain(QUARTER_WORDS_RE.captures_iter(question).filter_map(|caps| {
            Some((caps.get(0)?, quarter_number(&caps[1])?, caps[2].to_string()))
        }))
        .collect::<Vec<_>>();
    for (m, quarter, year) in quarter_matches {
        if let Some((start, end)) = year
            .parse::<i32>()
            .ok()
            .and_then(|y| quarter_bounds(quarter, y))
        {
            candidates.push(DatePhrase {
                kind: PhraseKind::Quarter,
                text: m.as_str().to_string(),
                span: (m.start(), m.end()),
                start,
                end,
                sources: mentioning(context, &[year.clone()], &year),
            });
        }
    }

    for caps in MONTH_RE.captures_iter(question) {
        let Some(m) = caps.get(0) else { continue };
        let bounds = month_number(&caps[1]).zip(caps[2].parse::<i32>().ok()).and_then(
            |(month, year)| {
                Some((
                    NaiveDate::from_ymd_opt(year, month, 1)?,
                    last_day_of_month(year, month)?,
                ))
            },
        );
        if let Some((start, end)) = bounds {
            candidates.push(DatePhrase {
                kind: PhraseKind::Month,
                text: m.as_str().to_string(),
                span: (m.start(), m.end()),
                start,
                end,
                sources: mentioning(
                    context,
                    &[caps[1].to_ascii_lowercase(), caps[2].to_string()],
                    &caps[2],
                ),
            });
        }
    }

    for m in YEAR_RE.find_iter(question) {
        if let Some((start, end)) = m
            .as_str()
            .parse::<i32>()
            .ok()
            .and_then(|y| months_bounds(y, 1, 12))
        {
            candidates.push(DatePhrase {
                kind: PhraseKind::Year,
                text: m.as_str().to_string(),
                span: (m.start(), m.end()),
                start,
                end,
                sources: mentioning(context, &[m.as_str().to_string()], m.as_str()),
            });
        }
    }

    candidates
}

fn overlaps(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// All non-overlapping date phrases in the question, in order of mention.
pub fn find_phrases(question: &str, context: &[RetrievedChunk]) -> Vec<DatePhrase> {
    let mut candidates = collect_candidates(question, context);
    candidates.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then((b.span.1 - b.span.0).cmp(&(a.span.1 - a.span.0)))
            .then(a.span.0.cmp(&b.span.0))
    });

    let mut accepted: Vec<DatePhrase> = Vec::new();
    for candidate in candidates {
        if accepted.iter().all(|kept| !overlaps(kept.span, candidate.span)) {
            accepted.push(candidate);
        }
    }
    accepted.sort_by_key(|phrase| phrase.span.0);
    accepted
}

/// The earliest-mentioned date phrase, if any.
pub fn resolve(question: &str, context: &[RetrievedChunk]) -> Option<DatePhrase> {
    find_phrases(question, context).into_iter().next()
}

/// Clamp a range to the dataset bounds; `None` when nothing is left.
pub fn clamp(
    start: NaiveDate,
    end: NaiveDate,
    valid_start: NaiveDate,
    valid_end: NaiveDate,
) -> Option<(NaiveDate, NaiveDate)> {
    let start = start.max(valid_start);
    let end = end.min(valid_end);
    (start <= end).then_some((start, end))
}
