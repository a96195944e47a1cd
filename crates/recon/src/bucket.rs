use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{BucketRow, CumulativeRow, DateSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    /// ISO weeks, starting Monday.
    Week,
    #[default]
    Month,
    Year,
}

impl Granularity {
    /// First day of the period containing `d`.
    pub fn period_start(self, d: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => d,
            Self::Week => d - Days::new(u64::from(d.weekday().num_days_from_monday())),
            Self::Month => d.with_day(1).unwrap_or(d),
            Self::Year => d.with_ordinal(1).unwrap_or(d),
        }
    }

    fn next(self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Day => start.succ_opt(),
            Self::Week => start.checked_add_days(Days::new(7)),
            Self::Month => start.checked_add_months(Months::new(1)),
            Self::Year => start.checked_add_months(Months::new(12)),
        }
    }

    pub fn label(self, start: NaiveDate) -> String {
        match self {
            Self::Day => start.format("%Y-%m-%d").to_string(),
            Self::Week => start.format("%G-W%V").to_string(),
            Self::Month => start.format("%Y-%m").to_string(),
            Self::Year => start.format("%Y").to_string(),
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            "year" | "yearly" => Ok(Self::Year),
            other => Err(format!(
                "unknown granularity '{other}' (expected day, week, month or year)"
            )),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        };
        f.write_str(s)
    }
}

/// Count both datasets per period over the union of their spans. Empty
/// periods inside the span are emitted with zero counts. The cumulative
/// series runs parallel to the buckets.
pub fn bucketize(
    a: &[NaiveDate],
    b: &[NaiveDate],
    granularity: Granularity,
) -> (Vec<BucketRow>, Vec<CumulativeRow>) {
    let Some(span) = DateSpan::of(a.iter().chain(b).copied()) else {
        return (Vec::new(), Vec::new());
    };

    let mut counts: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for d in a {
        counts.entry(granularity.period_start(*d)).or_default().0 += 1;
    }
    for d in b {
        counts.entry(granularity.period_start(*d)).or_default().1 += 1;
    }

    let last = granularity.period_start(span.end);
    let mut period = Some(granularity.period_start(span.start));
    let mut buckets = Vec::new();
    let mut cumulative = Vec::new();
    let (mut total_a, mut total_b) = (0, 0);

    while let Some(start) = period.filter(|p| *p <= last) {
        let (count_a, count_b) = counts.get(&start).copied().unwrap_or_default();
        total_a += count_a;
        total_b += count_b;
        let label = granularity.label(start);
        buckets.push(BucketRow {
            period: start,
            label: label.clone(),
            count_a,
            count_b,
        });
        cumulative.push(CumulativeRow {
            period: start,
            label,
            total_a,
            total_b,
        });
        period = granularity.next(start);
    }

    (buckets, cumulative)
}
