//! Snapshot files: the canonical export schema, written by `export` and read
//! back in cached mode.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::error::{ReconError, RowError, RowErrorKind};
use crate::model::WatchEvent;
use crate::rating::Rating;
use crate::window::{parse_timestamp, Precision};

pub const HEADER: [&str; 9] = [
    "tmdbID",
    "Title",
    "Year",
    "Directors",
    "WatchedDate",
    "Rating",
    "Review",
    "Tags",
    "Rewatch",
];

pub const DEFAULT_MAX_ROWS: usize = 1900;
pub const DEFAULT_FILE_PATTERN: &str = "plex-watched-{user}-{timestamp}.csv";

const SOURCE_LABEL: &str = "snapshot";
const REWATCHES_TAG: &str = "rewatches:";

// ── Writing ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SnapshotRecord<'a> {
    #[serde(rename = "tmdbID")]
    tmdb_id: &'a str,
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Year")]
    year: String,
    #[serde(rename = "Directors")]
    directors: String,
    #[serde(rename = "WatchedDate")]
    watched_date: String,
    #[serde(rename = "Rating")]
    rating: String,
    #[serde(rename = "Review")]
    review: &'a str,
    #[serde(rename = "Tags")]
    tags: String,
    #[serde(rename = "Rewatch")]
    rewatch: &'a str,
}

impl<'a> From<&'a WatchEvent> for SnapshotRecord<'a> {
    fn from(e: &'a WatchEvent) -> Self {
        Self {
            tmdb_id: e.content_id.as_deref().unwrap_or(""),
            title: &e.title,
            year: e.year.map(|y| y.to_string()).unwrap_or_default(),
            directors: e.directors.join(", "),
            watched_date: e.watched_date().format("%Y-%m-%d").to_string(),
            rating: e.rating.export_cell(),
            review: "",
            tags: e.tags.join(", "),
            rewatch: if e.rewatch { "Yes" } else { "No" },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
    /// Rows dropped by the row cap.
    pub truncated: usize,
}

/// Write events in canonical form. The header is written even for zero rows;
/// at most `max_rows` rows follow it.
pub fn write_snapshot<W: Write>(
    events: &[WatchEvent],
    out: W,
    max_rows: usize,
) -> Result<WriteReport, ReconError> {
    let csv_err = |e: csv::Error| ReconError::Csv {
        source_label: SOURCE_LABEL.into(),
        message: e.to_string(),
    };

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);

    let take = events.len().min(max_rows);
    if take == 0 {
        writer.write_record(HEADER).map_err(csv_err)?;
    }
    for e in &events[..take] {
        writer.serialize(SnapshotRecord::from(e)).map_err(csv_err)?;
    }
    writer.flush()?;

    Ok(WriteReport {
        written: take,
        truncated: events.len() - take,
    })
}

// ── Reading ─────────────────────────────────────────────────────────

/// Column positions resolved from a header row.
pub(crate) struct Columns {
    names: Vec<String>,
}

impl Columns {
    pub(crate) fn new(headers: &csv::StringRecord) -> Self {
        Self {
            names: headers
                .iter()
                .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
                .collect(),
        }
    }

    pub(crate) fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    pub(crate) fn require(&self, source_label: &str, name: &str) -> Result<usize, ReconError> {
        self.find(name).ok_or_else(|| ReconError::MissingColumn {
            source_label: source_label.to_string(),
            column: name.to_string(),
        })
    }
}

pub(crate) fn cell<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> &'r str {
    idx.and_then(|i| record.get(i)).map(str::trim).unwrap_or("")
}

pub(crate) fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "1" | "y"
    )
}

pub(crate) fn csv_reader(input: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes())
}

#[derive(Debug, Default)]
pub struct SnapshotRows {
    pub events: Vec<WatchEvent>,
    pub issues: Vec<RowError>,
}

/// Parse canonical snapshot text. Rows without a usable `WatchedDate` are
/// reported and skipped; rewatch flags are taken as written.
pub fn read_snapshot(input: &str) -> Result<SnapshotRows, ReconError> {
    let csv_err = |e: csv::Error| ReconError::Csv {
        source_label: SOURCE_LABEL.into(),
        message: e.to_string(),
    };

    let mut reader = csv_reader(input);
    let cols = Columns::new(reader.headers().map_err(csv_err)?);
    let title_col = cols.require(SOURCE_LABEL, "Title")?;
    let date_col = cols.require(SOURCE_LABEL, "WatchedDate")?;
    let id_col = cols.find("tmdbID");
    let year_col = cols.find("Year");
    let directors_col = cols.find("Directors");
    let rating_col = cols.find("Rating");
    let tags_col = cols.find("Tags");
    let rewatch_col = cols.find("Rewatch");

    let mut out = SnapshotRows::default();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let row = i + 1;
        let title = cell(&record, Some(title_col));

        let raw_date = cell(&record, Some(date_col));
        if raw_date.is_empty() {
            out.issues
                .push(RowError::new(SOURCE_LABEL, row, title, RowErrorKind::MissingDate));
            continue;
        }
        let Some(watched_at) = parse_timestamp(raw_date) else {
            out.issues.push(RowError::new(
                SOURCE_LABEL,
                row,
                title,
                RowErrorKind::BadDate { value: raw_date.to_string() },
            ));
            continue;
        };

        let tags = split_list(cell(&record, tags_col));
        let rewatch_count = tags
            .iter()
            .find_map(|t| t.strip_prefix(REWATCHES_TAG))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        let rating_text = cell(&record, rating_col);

        out.events.push(WatchEvent {
            content_id: Some(cell(&record, id_col))
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            title: title.to_string(),
            year: cell(&record, year_col).parse().ok(),
            directors: split_list(cell(&record, directors_col)),
            watched_at,
            rating: Rating::parse_stars(rating_text).unwrap_or_else(|| {
                debug!(row, value = rating_text, "unreadable rating, treating as blank");
                Rating::Blank
            }),
            tags,
            rewatch: parse_flag(cell(&record, rewatch_col)),
            rewatch_count,
        });
    }

    debug!(
        rows = out.events.len(),
        skipped = out.issues.len(),
        "read snapshot"
    );
    Ok(out)
}

// ── File naming and discovery ───────────────────────────────────────

fn stamp_format(precision: Precision) -> &'static str {
    match precision {
        Precision::Minute => "%Y-%m-%d-%H-%M",
        Precision::Date => "%Y-%m-%d",
    }
}

fn file_safe(user: &str) -> String {
    user.chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

/// Substitute `{user}` and `{timestamp}` in a file-name pattern.
pub fn render_file_name(
    pattern: &str,
    user: &str,
    now: NaiveDateTime,
    precision: Precision,
) -> String {
    pattern
        .replace("{user}", &file_safe(user))
        .replace("{timestamp}", &now.format(stamp_format(precision)).to_string())
}

/// Like [`render_file_name`], with `slice-` ahead of the stamp. The stamp
/// then fails to parse, so [`latest_snapshot`] never picks a slice up as the
/// full history or as a checkpoint.
pub fn render_slice_name(
    pattern: &str,
    user: &str,
    now: NaiveDateTime,
    precision: Precision,
) -> String {
    render_file_name(&pattern.replace("{timestamp}", "slice-{timestamp}"), user, now, precision)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    /// Parsed from the file name. Date-only stamps are midnight.
    pub taken_at: NaiveDateTime,
}

/// The newest snapshot in `dir` for `user`, judged by the timestamp in the
/// file name. Files whose stamp does not parse are ignored.
pub fn latest_snapshot(
    dir: &Path,
    pattern: &str,
    user: &str,
) -> Result<Option<SnapshotFile>, ReconError> {
    let named = pattern.replace("{user}", &file_safe(user));
    let Some((prefix, suffix)) = named.split_once("{timestamp}") else {
        let path = dir.join(&named);
        debug!(path = %path.display(), "file pattern has no timestamp token");
        return Ok(None);
    };

    let glob_pattern = dir.join(format!(
        "{}*{}",
        glob::Pattern::escape(prefix),
        glob::Pattern::escape(suffix)
    ));
    let glob_pattern = glob_pattern.to_string_lossy();
    let entries = glob::glob(&glob_pattern)
        .map_err(|e| ReconError::Io(format!("bad snapshot pattern '{glob_pattern}': {e}")))?;

    let mut best: Option<SnapshotFile> = None;
    for path in entries.flatten() {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let stamp = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix));
        let Some(taken_at) = stamp.and_then(parse_timestamp) else {
            debug!(file = name, "skipping file without a readable stamp");
            continue;
        };
        if best.as_ref().map_or(true, |b| taken_at > b.taken_at) {
            best = Some(SnapshotFile { path, taken_at });
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn event(id: Option<&str>, title: &str, at: &str, rewatch: bool) -> WatchEvent {
        WatchEvent {
            content_id: id.map(str::to_string),
            title: title.into(),
            year: Some(1995),
            directors: vec!["Michael Mann".into()],
            watched_at: ts(at),
            rating: Rating::HalfStars(9),
            tags: vec!["Crime".into(), "Drama".into()],
            rewatch,
            rewatch_count: 0,
        }
    }

    fn written(events: &[WatchEvent], max_rows: usize) -> (String, WriteReport) {
        let mut buf = Vec::new();
        let report = write_snapshot(events, &mut buf, max_rows).unwrap();
        (String::from_utf8(buf).unwrap(), report)
    }

    #[test]
    fn header_written_for_empty_export() {
        let (text, report) = written(&[], DEFAULT_MAX_ROWS);
        assert_eq!(
            text,
            "tmdbID,Title,Year,Directors,WatchedDate,Rating,Review,Tags,Rewatch\n"
        );
        assert_eq!(report.written, 0);
    }

    #[test]
    fn canonical_row_layout() {
        let (text, _) = written(&[event(Some("949"), "Heat", "2025-04-02 21:15", true)], 10);
        let line = text.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "949,Heat,1995,Michael Mann,2025-04-02,4.5,,\"Crime, Drama\",Yes"
        );
    }

    #[test]
    fn blank_rating_is_empty_cell() {
        let mut e = event(None, "Heat", "2025-04-02", false);
        e.rating = Rating::Blank;
        let (text, _) = written(&[e], 10);
        assert!(text.lines().nth(1).unwrap().starts_with(",Heat,1995,Michael Mann,2025-04-02,,,"));
    }

    #[test]
    fn row_cap_truncates() {
        let events: Vec<_> = (1..=5)
            .map(|d| event(None, "Heat", &format!("2025-04-0{d}"), d > 1))
            .collect();
        let (text, report) = written(&events, 3);
        assert_eq!(text.lines().count(), 4);
        assert_eq!(report, WriteReport { written: 3, truncated: 2 });
    }

    #[test]
    fn reads_back_written_rows() {
        let mut e = event(Some("949"), "Heat", "2025-04-02", false);
        e.tags.push("rewatches:2".into());
        let (text, _) = written(&[e], 10);
        let back = read_snapshot(&text).unwrap();
        assert!(back.issues.is_empty());
        let got = &back.events[0];
        assert_eq!(got.content_id.as_deref(), Some("949"));
        assert_eq!(got.rating, Rating::HalfStars(9));
        assert_eq!(got.rewatch_count, 2);
        assert!(!got.rewatch);
    }

    #[test]
    fn bad_and_missing_dates_are_row_errors() {
        let text = "tmdbID,Title,Year,Directors,WatchedDate,Rating,Review,Tags,Rewatch\n\
                    1,Alien,1979,,,,,,No\n\
                    2,Aliens,1986,,2025-13-01,,,,No\n\
                    3,Alien 3,1992,,2025-01-01,,,,Yes\n";
        let back = read_snapshot(text).unwrap();
        assert_eq!(back.events.len(), 1);
        assert!(back.events[0].rewatch);
        assert_eq!(back.issues.len(), 2);
        assert_eq!(back.issues[0].row, 1);
        assert_eq!(back.issues[1].to_string(), "snapshot row 2 ('Aliens'): cannot parse date '2025-13-01'");
    }

    #[test]
    fn missing_date_column_is_fatal() {
        let err = read_snapshot("Title,Year\nHeat,1995\n").unwrap_err();
        assert_eq!(err.to_string(), "snapshot: missing column 'WatchedDate'");
    }

    #[test]
    fn renders_file_names() {
        let now = ts("2025-06-01 09:05");
        assert_eq!(
            render_file_name(DEFAULT_FILE_PATTERN, "alice", now, Precision::Minute),
            "plex-watched-alice-2025-06-01-09-05.csv"
        );
        assert_eq!(
            render_file_name(DEFAULT_FILE_PATTERN, "alice", now, Precision::Date),
            "plex-watched-alice-2025-06-01.csv"
        );
    }

    #[test]
    fn latest_snapshot_by_stamp() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "plex-watched-alice-2025-05-01-10-00.csv",
            "plex-watched-alice-2025-06-01-08-30.csv",
            "plex-watched-alice-2025-05-20.csv",
            "plex-watched-bob-2025-07-01-00-00.csv",
            "plex-watched-alice-garbage.csv",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let latest = latest_snapshot(dir.path(), DEFAULT_FILE_PATTERN, "alice")
            .unwrap()
            .unwrap();
        assert_eq!(latest.taken_at, ts("2025-06-01 08:30"));
        assert!(latest.path.ends_with("plex-watched-alice-2025-06-01-08-30.csv"));

        assert!(latest_snapshot(dir.path(), DEFAULT_FILE_PATTERN, "carol")
            .unwrap()
            .is_none());
    }

    #[test]
    fn slices_are_not_snapshots() {
        let now = ts("2025-09-01 07:15");
        let slice = render_slice_name(DEFAULT_FILE_PATTERN, "alice", now, Precision::Minute);
        assert_eq!(slice, "plex-watched-alice-slice-2025-09-01-07-15.csv");

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plex-watched-alice-2025-06-01-08-30.csv"), "").unwrap();
        std::fs::write(dir.path().join(&slice), "").unwrap();
        let latest = latest_snapshot(dir.path(), DEFAULT_FILE_PATTERN, "alice")
            .unwrap()
            .unwrap();
        assert_eq!(latest.taken_at, ts("2025-06-01 08:30"));
    }
}
