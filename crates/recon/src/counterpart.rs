//! Reader for the log site's own diary export.
//!
//! Columns: `Date, Name, Year, Letterboxd URI, Rating, Rewatch, Tags,
//! Watched Date`, plus an optional `tmdbID`. `Watched Date` wins over `Date`
//! when both are filled in.

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{ReconError, RowError, RowErrorKind};
use crate::model::LogEntry;
use crate::rating::Rating;
use crate::snapshot::{cell, csv_reader, parse_flag, split_list, Columns};
use crate::window::parse_timestamp;

const SOURCE_LABEL: &str = "letterboxd";

#[derive(Debug, Default)]
pub struct LogRows {
    pub entries: Vec<LogEntry>,
    pub issues: Vec<RowError>,
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    parse_timestamp(s).map(|dt| dt.date())
}

pub fn read_log(input: &str) -> Result<LogRows, ReconError> {
    let csv_err = |e: csv::Error| ReconError::Csv {
        source_label: SOURCE_LABEL.into(),
        message: e.to_string(),
    };

    let mut reader = csv_reader(input);
    let cols = Columns::new(reader.headers().map_err(csv_err)?);
    let name_col = cols.require(SOURCE_LABEL, "Name")?;
    let watched_col = cols.find("Watched Date");
    let date_col = cols.find("Date");
    if watched_col.is_none() && date_col.is_none() {
        return Err(ReconError::MissingColumn {
            source_label: SOURCE_LABEL.into(),
            column: "Watched Date".into(),
        });
    }
    let year_col = cols.find("Year");
    let uri_col = cols.find("Letterboxd URI");
    let rating_col = cols.find("Rating");
    let rewatch_col = cols.find("Rewatch");
    let tags_col = cols.find("Tags");
    let id_col = cols.find("tmdbID");

    let mut out = LogRows::default();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let row = i + 1;
        let title = cell(&record, Some(name_col));

        let watched = cell(&record, watched_col);
        let raw_date = if watched.is_empty() {
            cell(&record, date_col)
        } else {
            watched
        };
        if raw_date.is_empty() {
            out.issues
                .push(RowError::new(SOURCE_LABEL, row, title, RowErrorKind::MissingDate));
            continue;
        }
        let Some(date) = parse_date(raw_date) else {
            out.issues.push(RowError::new(
                SOURCE_LABEL,
                row,
                title,
                RowErrorKind::BadDate { value: raw_date.to_string() },
            ));
            continue;
        };

        out.entries.push(LogEntry {
            date,
            title: title.to_string(),
            year: cell(&record, year_col).parse().ok(),
            uri: cell(&record, uri_col).to_string(),
            content_id: Some(cell(&record, id_col))
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            rating: Rating::parse_stars(cell(&record, rating_col)).unwrap_or_default(),
            rewatch: parse_flag(cell(&record, rewatch_col)),
            tags: split_list(cell(&record, tags_col)),
        });
    }

    debug!(
        rows = out.entries.len(),
        skipped = out.issues.len(),
        "read log export"
    );
    Ok(out)
}
