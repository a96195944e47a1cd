//! Inclusive date-range selection over watch datasets.
//!
//! Two precision modes:
//! - `date`: calendar dates are compared; the `to` date includes the whole
//!   day, so an event at 23:59 on the `to` date passes.
//! - `minute` (default): timestamps are truncated to the minute. A bound
//!   written with a time is exact to the minute; a bound written as a bare
//!   date still covers the whole day. Re-import workflows rely on this to
//!   avoid losing end-of-range entries.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::WatchEvent;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d-%H-%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    #[serde(alias = "datetime")]
    Minute,
    Date,
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Date => write!(f, "date"),
        }
    }
}

/// Parse a textual timestamp. Bare dates become midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    pub at: NaiveDateTime,
    /// Whether the bound was written with a time of day.
    pub has_time: bool,
}

impl Bound {
    pub fn date(d: NaiveDate) -> Self {
        Self {
            at: d.and_time(NaiveTime::MIN),
            has_time: false,
        }
    }

    pub fn at(at: NaiveDateTime) -> Self {
        Self {
            at: to_minute(at),
            has_time: true,
        }
    }

    pub fn parse(which: &'static str, s: &str) -> Result<Self, ReconError> {
        let trimmed = s.trim();
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::date(d));
        }
        parse_timestamp(trimmed)
            .map(Self::at)
            .ok_or_else(|| ReconError::BoundParse {
                which,
                value: s.to_string(),
            })
    }

    fn lower(&self, precision: Precision) -> NaiveDateTime {
        match (precision, self.has_time) {
            (Precision::Minute, true) => self.at,
            _ => self.at.date().and_time(NaiveTime::MIN),
        }
    }

    fn upper(&self, precision: Precision) -> NaiveDateTime {
        match (precision, self.has_time) {
            (Precision::Minute, true) => self.at,
            _ => end_of_day(self.at.date()),
        }
    }

    pub fn label(&self) -> String {
        if self.has_time {
            self.at.format("%Y-%m-%d %H:%M").to_string()
        } else {
            self.at.date().to_string()
        }
    }
}

fn end_of_day(d: NaiveDate) -> NaiveDateTime {
    // Comparisons run on minute-truncated timestamps.
    d.and_hms_opt(23, 59, 0).unwrap_or_else(|| d.and_time(NaiveTime::MIN))
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub from: Option<Bound>,
    /// `None` = now.
    pub to: Option<Bound>,
    pub precision: Precision,
}

impl TimeWindow {
    pub fn new(
        from: Option<Bound>,
        to: Option<Bound>,
        precision: Precision,
    ) -> Result<Self, ReconError> {
        if let (Some(f), Some(t)) = (from, to) {
            if f.lower(precision) > t.upper(precision) {
                return Err(ReconError::InvalidWindow {
                    from: f.label(),
                    to: t.label(),
                });
            }
        }
        Ok(Self { from, to, precision })
    }

    pub fn parse(
        from: Option<&str>,
        to: Option<&str>,
        precision: Precision,
    ) -> Result<Self, ReconError> {
        let from = from.map(|s| Bound::parse("from", s)).transpose()?;
        let to = to.map(|s| Bound::parse("to", s)).transpose()?;
        Self::new(from, to, precision)
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Whether a timestamp falls inside `[from, to]`.
    pub fn admits(&self, at: NaiveDateTime, now: NaiveDateTime) -> bool {
        let t = to_minute(at);
        if let Some(from) = self.from {
            if t < from.lower(self.precision) {
                return false;
            }
        }
        let upper = match self.to {
            Some(to) => to.upper(self.precision),
            None => match self.precision {
                Precision::Minute => to_minute(now),
                Precision::Date => end_of_day(now.date()),
            },
        };
        t <= upper
    }

    pub fn admits_date(&self, d: NaiveDate, now: NaiveDateTime) -> bool {
        self.admits(d.and_time(NaiveTime::MIN), now)
    }

    /// Select the events inside the window, sorted ascending by watch time.
    /// The input is left untouched.
    pub fn apply(&self, events: &[WatchEvent], now: NaiveDateTime) -> Vec<WatchEvent> {
        self.apply_by(events, |e| e.watched_at, now)
    }

    pub fn apply_by<T: Clone>(
        &self,
        items: &[T],
        key: impl Fn(&T) -> NaiveDateTime,
        now: NaiveDateTime,
    ) -> Vec<T> {
        let mut out: Vec<T> = items
            .iter()
            .filter(|item| self.admits(key(item), now))
            .cloned()
            .collect();
        out.sort_by_key(|item| key(item));
        out
    }
}
