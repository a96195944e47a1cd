//! Overlap engine: match two datasets, measure how their date ranges
//! intersect, and bucket both over time.

use tracing::debug;

use crate::bucket::{bucketize, Granularity};
use crate::matcher::match_rows;
use crate::model::{CompareRow, DateSpan, LogEntry, Overlap, OverlapResult, WatchEvent};
use crate::summary::compute_summary;

pub fn rows_from_events(events: &[WatchEvent]) -> Vec<CompareRow> {
    events
        .iter()
        .enumerate()
        .map(|(i, e)| CompareRow::from_event(i, e))
        .collect()
}

pub fn rows_from_log(entries: &[LogEntry]) -> Vec<CompareRow> {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| CompareRow::from_log(i, e))
        .collect()
}

/// Compare A (primary) against B (counterpart). Two empty datasets give an
/// empty result with no spans and no overlap.
pub fn run(a: &[CompareRow], b: &[CompareRow], granularity: Granularity) -> OverlapResult {
    let out = match_rows(a, b);
    let summary = compute_summary(a, b, &out);

    let span_a = DateSpan::of(a.iter().map(|r| r.date));
    let span_b = DateSpan::of(b.iter().map(|r| r.date));
    let overlap = match (span_a, span_b) {
        (Some(x), Some(y)) => x.intersect(&y).map(|span| Overlap {
            span,
            days: span.days() + 1,
        }),
        _ => None,
    };

    let dates_a: Vec<_> = a.iter().map(|r| r.date).collect();
    let dates_b: Vec<_> = b.iter().map(|r| r.date).collect();
    let (buckets, cumulative) = bucketize(&dates_a, &dates_b, granularity);

    debug!(
        matched = summary.matched,
        source_only = summary.source_only,
        counterpart_only = summary.counterpart_only,
        ambiguous = summary.ambiguous,
        buckets = buckets.len(),
        "comparison complete"
    );

    let mut ambiguous = out.ambiguous_a;
    ambiguous.extend(out.ambiguous_b);

    OverlapResult {
        summary,
        span_a,
        span_b,
        overlap,
        matched: out.matched,
        source_only: out.a_only,
        counterpart_only: out.b_only,
        ambiguous,
        buckets,
        cumulative,
    }
}
