use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::rating::Rating;

// ---------------------------------------------------------------------------
// Canonical rows
// ---------------------------------------------------------------------------

/// One canonical export row. Built once per run, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchEvent {
    /// TMDB id, when the source could resolve one.
    pub content_id: Option<String>,
    pub title: String,
    pub year: Option<i32>,
    pub directors: Vec<String>,
    pub watched_at: NaiveDateTime,
    pub rating: Rating,
    /// Ordered, de-duplicated.
    pub tags: Vec<String>,
    pub rewatch: bool,
    /// Further watches folded into this row when rewatches are collapsed.
    pub rewatch_count: u32,
}

impl WatchEvent {
    pub fn watched_date(&self) -> NaiveDate {
        self.watched_at.date()
    }
}

// ---------------------------------------------------------------------------
// Source input
// ---------------------------------------------------------------------------

/// Timestamp as delivered by a watch source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTimestamp {
    /// Unix seconds, interpreted in the local timezone.
    Epoch(i64),
    /// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]` or `YYYY-MM-DDTHH:MM[:SS]`.
    Text(String),
}

/// One raw play event, before identity resolution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPlay {
    /// Source-local item key (Plex `ratingKey`).
    pub rating_key: String,
    pub content_id: Option<String>,
    pub title: String,
    pub year: Option<i32>,
    pub directors: Vec<String>,
    pub genres: Vec<String>,
    pub viewed_at: Option<RawTimestamp>,
    /// Source scale (1–10).
    pub user_rating: Option<f64>,
}

/// A movie in the library that the queried account has never played.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LibraryItem {
    pub rating_key: String,
    pub content_id: Option<String>,
    pub title: String,
    pub year: Option<i32>,
}

// ---------------------------------------------------------------------------
// Counterpart log
// ---------------------------------------------------------------------------

/// A row of the log site's own export. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub date: NaiveDate,
    pub title: String,
    pub year: Option<i32>,
    pub uri: String,
    pub content_id: Option<String>,
    pub rating: Rating,
    pub rewatch: bool,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// The shape both datasets are reduced to before matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompareRow {
    /// Position in the originating dataset.
    pub index: usize,
    pub content_id: Option<String>,
    pub title: String,
    pub year: Option<i32>,
    pub date: NaiveDate,
}

impl CompareRow {
    pub fn from_event(index: usize, e: &WatchEvent) -> Self {
        Self {
            index,
            content_id: e.content_id.clone(),
            title: e.title.clone(),
            year: e.year,
            date: e.watched_date(),
        }
    }

    pub fn from_log(index: usize, e: &LogEntry) -> Self {
        Self {
            index,
            content_id: e.content_id.clone(),
            title: e.title.clone(),
            year: e.year,
            date: e.date,
        }
    }
}

/// Closed date interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Min/max of the given dates; `None` when empty.
    pub fn of<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Option<Self> {
        let mut it = dates.into_iter();
        let first = it.next()?;
        let (start, end) = it.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Some(Self { start, end })
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        self.start <= d && d <= self.end
    }

    pub fn covers(&self, other: &DateSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersect(&self, other: &DateSpan) -> Option<DateSpan> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateSpan { start, end })
    }

    pub fn union(&self, other: &DateSpan) -> DateSpan {
        DateSpan {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// `end - start` in days (a single-day span has length 0).
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl std::fmt::Display for DateSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Identifier,
    TitleYear,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedPair {
    pub a: CompareRow,
    pub b: CompareRow,
    pub method: MatchMethod,
    /// `a.date - b.date` in days.
    pub date_offset_days: i64,
}

#[derive(Debug, Default)]
pub struct PairMatchOutput {
    pub matched: Vec<MatchedPair>,
    pub a_only: Vec<CompareRow>,
    pub b_only: Vec<CompareRow>,
    pub ambiguous_a: Vec<CompareRow>,
    pub ambiguous_b: Vec<CompareRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketRow {
    pub period: NaiveDate,
    pub label: String,
    pub count_a: usize,
    pub count_b: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CumulativeRow {
    pub period: NaiveDate,
    pub label: String,
    pub total_a: usize,
    pub total_b: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overlap {
    pub span: DateSpan,
    pub days: i64,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverlapSummary {
    pub rows_a: usize,
    pub rows_b: usize,
    pub matched: usize,
    pub matched_by_identifier: usize,
    pub matched_by_title_year: usize,
    /// Watched but unlogged.
    pub source_only: usize,
    /// Logged but not present in the primary source.
    pub counterpart_only: usize,
    pub ambiguous: usize,
    pub distinct_titles_a: usize,
    pub distinct_titles_b: usize,
    pub distinct_titles_both: usize,
}

/// Watched vs unwatched titles of one library, as `Title (Year)` labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStatus {
    pub watched: BTreeSet<String>,
    pub unwatched: BTreeSet<String>,
}

impl LibraryStatus {
    /// Distinct titles across both sets.
    pub fn total(&self) -> usize {
        self.watched.union(&self.unwatched).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlapResult {
    pub summary: OverlapSummary,
    pub span_a: Option<DateSpan>,
    pub span_b: Option<DateSpan>,
    /// `None` reports "no overlapping period".
    pub overlap: Option<Overlap>,
    pub matched: Vec<MatchedPair>,
    pub source_only: Vec<CompareRow>,
    pub counterpart_only: Vec<CompareRow>,
    pub ambiguous: Vec<CompareRow>,
    pub buckets: Vec<BucketRow>,
    pub cumulative: Vec<CumulativeRow>,
}
