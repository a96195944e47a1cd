use std::collections::BTreeSet;

use crate::identity::IdentityKey;
use crate::model::{
    CompareRow, LibraryItem, LibraryStatus, MatchMethod, OverlapSummary, PairMatchOutput, WatchEvent,
};

fn identity(row: &CompareRow) -> IdentityKey {
    IdentityKey::resolve(row.content_id.as_deref(), &row.title, row.year)
}

/// Compute summary counts from a pair-match output.
pub fn compute_summary(a: &[CompareRow], b: &[CompareRow], out: &PairMatchOutput) -> OverlapSummary {
    let by_identifier = out
        .matched
        .iter()
        .filter(|p| p.method == MatchMethod::Identifier)
        .count();

    let titles_a: BTreeSet<IdentityKey> = a.iter().map(identity).collect();
    let titles_b: BTreeSet<IdentityKey> = b.iter().map(identity).collect();
    let titles_both: BTreeSet<IdentityKey> = out.matched.iter().map(|p| identity(&p.a)).collect();

    OverlapSummary {
        rows_a: a.len(),
        rows_b: b.len(),
        matched: out.matched.len(),
        matched_by_identifier: by_identifier,
        matched_by_title_year: out.matched.len() - by_identifier,
        source_only: out.a_only.len(),
        counterpart_only: out.b_only.len(),
        ambiguous: out.ambiguous_a.len() + out.ambiguous_b.len(),
        distinct_titles_a: titles_a.len(),
        distinct_titles_b: titles_b.len(),
        distinct_titles_both: titles_both.len(),
    }
}

fn label(title: &str, year: Option<i32>) -> String {
    match year {
        Some(y) => format!("{title} ({y})"),
        None => title.to_string(),
    }
}

/// Watched titles from the exported rows next to the library's unwatched ones.
pub fn library_status(watched: &[WatchEvent], unwatched: &[LibraryItem]) -> LibraryStatus {
    LibraryStatus {
        watched: watched.iter().map(|e| label(&e.title, e.year)).collect(),
        unwatched: unwatched.iter().map(|i| label(&i.title, i.year)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_rows;
    use chrono::NaiveDate;

    fn row(index: usize, id: Option<&str>, title: &str, date: &str) -> CompareRow {
        CompareRow {
            index,
            content_id: id.map(str::to_string),
            title: title.into(),
            year: Some(2000),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        }
    }

    #[test]
    fn summary_counts() {
        let a = vec![
            row(0, Some("1"), "One", "2025-01-01"),
            row(1, Some("1"), "One", "2025-02-01"),
            row(2, None, "Two", "2025-01-05"),
            row(3, None, "Three", "2025-01-06"),
        ];
        let b = vec![
            row(0, Some("1"), "One", "2025-01-02"),
            row(1, None, "two", "2025-01-05"),
            row(2, None, "Four", "2025-01-09"),
        ];
        let out = match_rows(&a, &b);
        let s = compute_summary(&a, &b, &out);
        assert_eq!(s.rows_a, 4);
        assert_eq!(s.rows_b, 3);
        assert_eq!(s.matched, 2);
        assert_eq!(s.matched_by_identifier, 1);
        assert_eq!(s.matched_by_title_year, 1);
        assert_eq!(s.source_only, 2);
        assert_eq!(s.counterpart_only, 1);
        assert_eq!(s.ambiguous, 0);
        assert_eq!(s.distinct_titles_a, 3);
        assert_eq!(s.distinct_titles_b, 3);
        assert_eq!(s.distinct_titles_both, 2);
    }

    #[test]
    fn library_status_labels_and_total() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(20, 0, 0).unwrap();
        let event = |title: &str, year| WatchEvent {
            content_id: None,
            title: title.into(),
            year,
            directors: vec![],
            watched_at: at,
            rating: crate::Rating::Blank,
            tags: vec![],
            rewatch: false,
            rewatch_count: 0,
        };
        let watched = vec![event("Heat", Some(1995)), event("Heat", Some(1995)), event("Untitled", None)];
        let unwatched = vec![
            LibraryItem { title: "Alien".into(), year: Some(1979), ..Default::default() },
            LibraryItem { title: "Heat".into(), year: Some(1995), ..Default::default() },
        ];
        let status = library_status(&watched, &unwatched);
        assert_eq!(
            status.watched.iter().collect::<Vec<_>>(),
            ["Heat (1995)", "Untitled"]
        );
        assert_eq!(status.unwatched.len(), 2);
        assert_eq!(status.total(), 3);
    }
}
