//! Raw plays → canonical export rows, with rewatch detection.
//!
//! Plays are grouped by identity (content id, else normalized title/year).
//! Within a group the earliest watch is the first watch; every later one is
//! a rewatch. Plays of the same identity on the same calendar date count as
//! one watch; the extras are reported as `DuplicateWatch` issues.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::{ReconError, RowError, RowErrorKind};
use crate::identity::{clean_id, normalize_title, IdentityKey, TitleYearKey};
use crate::model::{RawPlay, RawTimestamp, WatchEvent};
use crate::rating;
use crate::source::{HistoryQuery, WatchSource};
use crate::window::parse_timestamp;

const SOURCE_LABEL: &str = "history";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How repeat watches of one identity are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RewatchMode {
    /// Every watch is its own row (unless `mark_rewatch` is off).
    #[default]
    All,
    /// One row per identity, dated at the first watch.
    First,
    /// One row per identity, dated at the latest watch.
    Last,
    /// Only the first watch; rewatches are dropped without annotation.
    Off,
}

impl FromStr for RewatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "off" | "false" | "none" => Ok(Self::Off),
            other => Err(format!(
                "unknown rewatch mode '{other}' (expected all, first, last or off)"
            )),
        }
    }
}

impl fmt::Display for RewatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::First => write!(f, "first"),
            Self::Last => write!(f, "last"),
            Self::Off => write!(f, "off"),
        }
    }
}

impl<'de> Deserialize<'de> for RewatchMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(Self::All),
            Repr::Flag(false) => Ok(Self::Off),
            Repr::Name(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub convert_rating: bool,
    pub rewatch: RewatchMode,
    /// Emit repeat watches as separate flagged rows. Off collapses them into
    /// one row carrying a rewatch count.
    pub mark_rewatch: bool,
    pub genres_as_tags: bool,
    pub custom_tags: Vec<String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            convert_rating: false,
            rewatch: RewatchMode::All,
            mark_rewatch: true,
            genres_as_tags: false,
            custom_tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emit {
    Separate,
    Collapse { latest: bool, annotate: bool },
}

impl NormalizeOptions {
    fn emit(&self) -> Emit {
        match (self.rewatch, self.mark_rewatch) {
            (RewatchMode::All, true) => Emit::Separate,
            (RewatchMode::All, false) | (RewatchMode::First, _) => Emit::Collapse {
                latest: false,
                annotate: true,
            },
            (RewatchMode::Last, _) => Emit::Collapse {
                latest: true,
                annotate: true,
            },
            (RewatchMode::Off, _) => Emit::Collapse {
                latest: false,
                annotate: false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Normalized {
    /// Sorted ascending by watch time, then title.
    pub events: Vec<WatchEvent>,
    pub issues: Vec<RowError>,
}

/// Fetch the complete play list from `source`, then normalize it. A fetch
/// failure returns before any processing happens.
pub fn collect(
    source: &dyn WatchSource,
    query: &HistoryQuery,
    opts: &NormalizeOptions,
) -> Result<Normalized, ReconError> {
    let plays = source.plays(query)?;
    info!(plays = plays.len(), library = %query.library, "fetched watch history");
    Ok(normalize(&plays, opts))
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

struct Parsed<'a> {
    row: usize,
    play: &'a RawPlay,
    at: NaiveDateTime,
}

fn parse_viewed_at(ts: &RawTimestamp) -> Option<NaiveDateTime> {
    match ts {
        RawTimestamp::Epoch(secs) => Local
            .timestamp_opt(*secs, 0)
            .single()
            .map(|dt| dt.naive_local()),
        RawTimestamp::Text(s) => parse_timestamp(s),
    }
}

fn directors_key(directors: &[String]) -> String {
    directors
        .iter()
        .map(|d| normalize_title(d))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn normalize(plays: &[RawPlay], opts: &NormalizeOptions) -> Normalized {
    let mut issues = Vec::new();

    // Timestamps
    let mut parsed = Vec::with_capacity(plays.len());
    for (i, play) in plays.iter().enumerate() {
        let row = i + 1;
        let Some(raw) = &play.viewed_at else {
            issues.push(RowError::new(SOURCE_LABEL, row, &play.title, RowErrorKind::MissingDate));
            continue;
        };
        match parse_viewed_at(raw) {
            Some(at) => parsed.push(Parsed { row, play, at }),
            None => {
                let value = match raw {
                    RawTimestamp::Epoch(secs) => secs.to_string(),
                    RawTimestamp::Text(s) => s.clone(),
                };
                issues.push(RowError::new(
                    SOURCE_LABEL,
                    row,
                    &play.title,
                    RowErrorKind::BadDate { value },
                ));
            }
        }
    }

    // Title/year keys claimed by identified plays, and director sets of
    // unidentified ones.
    let mut ids_by_key: BTreeMap<TitleYearKey, BTreeSet<String>> = BTreeMap::new();
    let mut directors_by_key: BTreeMap<TitleYearKey, BTreeSet<String>> = BTreeMap::new();
    for p in &parsed {
        let key = TitleYearKey::new(&p.play.title, p.play.year);
        match clean_id(p.play.content_id.as_deref()) {
            Some(id) => {
                ids_by_key.entry(key).or_default().insert(id);
            }
            None => {
                let dk = directors_key(&p.play.directors);
                if !dk.is_empty() {
                    directors_by_key.entry(key).or_default().insert(dk);
                }
            }
        }
    }

    // Identity resolution
    let mut groups: BTreeMap<IdentityKey, Vec<Parsed>> = BTreeMap::new();
    for p in parsed {
        let identity = match clean_id(p.play.content_id.as_deref()) {
            Some(id) => IdentityKey::Content(id),
            None => {
                let key = TitleYearKey::new(&p.play.title, p.play.year);
                let claimed = ids_by_key.get(&key);
                let directors = directors_by_key.get(&key).map_or(0, BTreeSet::len);
                match claimed.map(|ids| ids.iter().collect::<Vec<_>>()) {
                    Some(ids) if ids.len() == 1 => IdentityKey::Content(ids[0].clone()),
                    Some(_) => {
                        issues.push(RowError::new(
                            SOURCE_LABEL,
                            p.row,
                            &p.play.title,
                            RowErrorKind::AmbiguousIdentity { key: key.to_string() },
                        ));
                        continue;
                    }
                    None if directors > 1 => {
                        issues.push(RowError::new(
                            SOURCE_LABEL,
                            p.row,
                            &p.play.title,
                            RowErrorKind::AmbiguousIdentity { key: key.to_string() },
                        ));
                        continue;
                    }
                    None => IdentityKey::TitleYear(key),
                }
            }
        };
        groups.entry(identity).or_default().push(p);
    }

    debug!(groups = groups.len(), "grouped plays by identity");

    let emit = opts.emit();
    let mut events = Vec::new();
    for (identity, mut group) in groups {
        group.sort_by_key(|p| (p.at, p.row));

        // One watch per calendar date.
        let mut watches: Vec<Parsed> = Vec::with_capacity(group.len());
        for p in group {
            match watches.last() {
                Some(prev) if prev.at.date() == p.at.date() => {
                    issues.push(RowError::new(
                        SOURCE_LABEL,
                        p.row,
                        &p.play.title,
                        RowErrorKind::DuplicateWatch {
                            key: identity.to_string(),
                            date: p.at.date().to_string(),
                        },
                    ));
                }
                _ => watches.push(p),
            }
        }

        let fallback_rating = watches.iter().find_map(|w| w.play.user_rating);
        match emit {
            Emit::Separate => {
                for (i, w) in watches.iter().enumerate() {
                    events.push(build_event(&identity, w, i > 0, 0, fallback_rating, opts));
                }
            }
            Emit::Collapse { latest, annotate } => {
                let chosen = if latest { watches.last() } else { watches.first() };
                if let Some(w) = chosen {
                    let count = if annotate { (watches.len() - 1) as u32 } else { 0 };
                    events.push(build_event(&identity, w, false, count, fallback_rating, opts));
                }
            }
        }
    }

    events.sort_by(|a, b| {
        a.watched_at
            .cmp(&b.watched_at)
            .then_with(|| a.title.cmp(&b.title))
    });
    issues.sort_by_key(|e| e.row);

    debug!(events = events.len(), issues = issues.len(), "normalized watch history");
    Normalized { events, issues }
}

fn build_event(
    identity: &IdentityKey,
    w: &Parsed,
    rewatch: bool,
    rewatch_count: u32,
    fallback_rating: Option<f64>,
    opts: &NormalizeOptions,
) -> WatchEvent {
    let play = w.play;
    let content_id = match identity {
        IdentityKey::Content(id) => Some(id.clone()),
        IdentityKey::TitleYear(_) => None,
    };

    let mut tags: Vec<String> = Vec::new();
    let mut push_tag = |t: &str| {
        let t = t.trim();
        if !t.is_empty() && !tags.iter().any(|x| x == t) {
            tags.push(t.to_string());
        }
    };
    if opts.genres_as_tags {
        play.genres.iter().for_each(|g| push_tag(g));
    }
    opts.custom_tags.iter().for_each(|t| push_tag(t));
    if rewatch_count > 0 {
        push_tag(&format!("rewatches:{rewatch_count}"));
    }

    WatchEvent {
        content_id,
        title: play.title.trim().to_string(),
        year: play.year,
        directors: play.directors.clone(),
        watched_at: w.at,
        rating: rating::convert(play.user_rating.or(fallback_rating), opts.convert_rating),
        tags,
        rewatch,
        rewatch_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::Rating;
    use crate::model::LibraryItem;
    use crate::source::Account;

    fn play(id: Option<&str>, title: &str, at: &str) -> RawPlay {
        RawPlay {
            rating_key: format!("rk-{title}"),
            content_id: id.map(str::to_string),
            title: title.into(),
            year: Some(1995),
            directors: vec![],
            genres: vec!["Crime".into(), "Drama".into()],
            viewed_at: Some(RawTimestamp::Text(at.into())),
            user_rating: None,
        }
    }

    fn flags(n: &Normalized) -> Vec<(String, bool)> {
        n.events
            .iter()
            .map(|e| (e.watched_date().to_string(), e.rewatch))
            .collect()
    }

    #[test]
    fn earliest_watch_is_the_only_first_watch() {
        let plays = vec![
            play(Some("949"), "Heat", "2025-05-02 20:00"),
            play(Some("949"), "Heat", "2025-03-01 20:00"),
            play(Some("949"), "Heat", "2025-04-11 21:00"),
        ];
        let n = normalize(&plays, &NormalizeOptions::default());
        assert_eq!(
            flags(&n),
            vec![
                ("2025-03-01".into(), false),
                ("2025-04-11".into(), true),
                ("2025-05-02".into(), true),
            ]
        );
        assert!(n.issues.is_empty());
    }

    #[test]
    fn falls_back_to_title_year_without_id() {
        let plays = vec![
            play(None, "Heat", "2025-03-01 20:00"),
            play(None, "  HEAT ", "2025-03-09 20:00"),
        ];
        let n = normalize(&plays, &NormalizeOptions::default());
        assert_eq!(n.events.len(), 2);
        assert!(!n.events[0].rewatch);
        assert!(n.events[1].rewatch);
        assert_eq!(n.events[1].title, "HEAT");
        assert_eq!(n.events[0].content_id, None);
    }

    #[test]
    fn idless_play_joins_the_single_claiming_id() {
        let plays = vec![
            play(Some("949"), "Heat", "2025-03-01 20:00"),
            play(None, "Heat", "2025-03-05 20:00"),
        ];
        let n = normalize(&plays, &NormalizeOptions::default());
        assert_eq!(n.events.len(), 2);
        assert_eq!(n.events[1].content_id.as_deref(), Some("949"));
        assert!(n.events[1].rewatch);
    }

    #[test]
    fn idless_play_with_two_claiming_ids_is_ambiguous() {
        let plays = vec![
            play(Some("1"), "Solaris", "2025-03-01 20:00"),
            play(Some("2"), "Solaris", "2025-03-02 20:00"),
            play(None, "Solaris", "2025-03-03 20:00"),
        ];
        let n = normalize(&plays, &NormalizeOptions::default());
        assert_eq!(n.events.len(), 2);
        assert!(n.events.iter().all(|e| !e.rewatch));
        assert_eq!(n.issues.len(), 1);
        assert_eq!(n.issues[0].row, 3);
        assert!(matches!(n.issues[0].kind, RowErrorKind::AmbiguousIdentity { .. }));
    }

    #[test]
    fn conflicting_directors_are_not_merged() {
        let mut a = play(None, "Solaris", "2025-03-01 20:00");
        a.directors = vec!["Andrei Tarkovsky".into()];
        let mut b = play(None, "Solaris", "2025-03-04 20:00");
        b.directors = vec!["Steven Soderbergh".into()];
        let n = normalize(&[a, b], &NormalizeOptions::default());
        assert!(n.events.is_empty());
        assert_eq!(n.issues.len(), 2);
    }

    #[test]
    fn same_day_duplicates_fold_and_surface() {
        let plays = vec![
            play(Some("949"), "Heat", "2025-03-01 20:00"),
            play(Some("949"), "Heat", "2025-03-01 23:10"),
        ];
        let n = normalize(&plays, &NormalizeOptions::default());
        assert_eq!(n.events.len(), 1);
        assert_eq!(n.events[0].watched_at.to_string(), "2025-03-01 20:00:00");
        assert_eq!(n.issues.len(), 1);
        assert!(!n.issues[0].is_skip());
    }

    #[test]
    fn bad_and_missing_dates_are_row_errors() {
        let mut missing = play(Some("1"), "Alien", "");
        missing.viewed_at = None;
        let plays = vec![
            missing,
            play(Some("2"), "Aliens", "yesterday"),
            play(Some("3"), "Alien 3", "2025-01-01"),
        ];
        let n = normalize(&plays, &NormalizeOptions::default());
        assert_eq!(n.events.len(), 1);
        assert_eq!(n.issues.len(), 2);
        assert_eq!(n.issues[0].kind, RowErrorKind::MissingDate);
        assert_eq!(
            n.issues[1].kind,
            RowErrorKind::BadDate { value: "yesterday".into() }
        );
    }

    #[test]
    fn unmarked_rewatches_collapse_to_earliest_with_count() {
        let plays = vec![
            play(Some("949"), "Heat", "2025-05-02 20:00"),
            play(Some("949"), "Heat", "2025-03-01 20:00"),
            play(Some("949"), "Heat", "2025-04-11 21:00"),
        ];
        let opts = NormalizeOptions { mark_rewatch: false, ..Default::default() };
        let n = normalize(&plays, &opts);
        assert_eq!(n.events.len(), 1);
        assert_eq!(n.events[0].watched_date().to_string(), "2025-03-01");
        assert_eq!(n.events[0].rewatch_count, 2);
        assert!(!n.events[0].rewatch);
        assert_eq!(n.events[0].tags, vec!["rewatches:2".to_string()]);
    }

    #[test]
    fn last_mode_keeps_latest_date() {
        let plays = vec![
            play(Some("949"), "Heat", "2025-03-01 20:00"),
            play(Some("949"), "Heat", "2025-05-02 20:00"),
        ];
        let opts = NormalizeOptions { rewatch: RewatchMode::Last, ..Default::default() };
        let n = normalize(&plays, &opts);
        assert_eq!(n.events.len(), 1);
        assert_eq!(n.events[0].watched_date().to_string(), "2025-05-02");
        assert_eq!(n.events[0].rewatch_count, 1);
    }

    #[test]
    fn off_mode_drops_rewatches_silently() {
        let plays = vec![
            play(Some("949"), "Heat", "2025-03-01 20:00"),
            play(Some("949"), "Heat", "2025-05-02 20:00"),
        ];
        let opts = NormalizeOptions { rewatch: RewatchMode::Off, ..Default::default() };
        let n = normalize(&plays, &opts);
        assert_eq!(n.events.len(), 1);
        assert_eq!(n.events[0].rewatch_count, 0);
        assert!(n.events[0].tags.is_empty());
    }

    #[test]
    fn tags_and_rating() {
        let mut p = play(Some("949"), "Heat", "2025-03-01 20:00");
        p.user_rating = Some(9.0);
        let opts = NormalizeOptions {
            convert_rating: true,
            genres_as_tags: true,
            custom_tags: vec!["plex".into(), "Drama".into()],
            ..Default::default()
        };
        let n = normalize(&[p], &opts);
        assert_eq!(n.events[0].tags, vec!["Crime", "Drama", "plex"]);
        assert_eq!(n.events[0].rating, Rating::HalfStars(9));
    }

    #[test]
    fn rewatch_mode_parses_bool_and_names() {
        #[derive(Deserialize)]
        struct W {
            m: RewatchMode,
        }
        let w: W = serde_json::from_str(r#"{"m":false}"#).unwrap();
        assert_eq!(w.m, RewatchMode::Off);
        let w: W = serde_json::from_str(r#"{"m":"last"}"#).unwrap();
        assert_eq!(w.m, RewatchMode::Last);
        assert!(serde_json::from_str::<W>(r#"{"m":"sometimes"}"#).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn plays_strategy() -> impl Strategy<Value = Vec<RawPlay>> {
            proptest::collection::vec((0u8..4, 0u32..120, 0u32..24), 0..30).prop_map(|rows| {
                rows.into_iter()
                    .map(|(id, day, hour)| {
                        let date = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
                            + chrono::Duration::days(i64::from(day));
                        RawPlay {
                            content_id: Some(id.to_string()),
                            title: format!("Film {id}"),
                            year: Some(2000),
                            viewed_at: Some(RawTimestamp::Text(format!("{date} {hour:02}:00"))),
                            ..Default::default()
                        }
                    })
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn exactly_one_first_watch_per_identity(plays in plays_strategy()) {
                let n = normalize(&plays, &NormalizeOptions::default());
                let mut firsts: BTreeMap<String, usize> = BTreeMap::new();
                for e in &n.events {
                    let id = e.content_id.clone().unwrap();
                    if !e.rewatch {
                        *firsts.entry(id.clone()).or_default() += 1;
                    }
                    let earliest = n.events.iter()
                        .filter(|o| o.content_id.as_deref() == Some(id.as_str()))
                        .map(|o| o.watched_at)
                        .min()
                        .unwrap();
                    prop_assert_eq!(e.rewatch, e.watched_at != earliest);
                }
                prop_assert!(firsts.values().all(|c| *c == 1));
            }

            #[test]
            fn output_is_sorted(plays in plays_strategy()) {
                let n = normalize(&plays, &NormalizeOptions::default());
                prop_assert!(n.events.windows(2).all(|w| w[0].watched_at <= w[1].watched_at));
            }
        }
    }

    struct FailingSource;

    impl WatchSource for FailingSource {
        fn accounts(&self) -> Result<Vec<Account>, ReconError> {
            Ok(vec![])
        }

        fn plays(&self, _query: &HistoryQuery) -> Result<Vec<RawPlay>, ReconError> {
            Err(ReconError::DataSource("connection refused".into()))
        }

        fn unwatched(&self, _query: &HistoryQuery) -> Result<Vec<LibraryItem>, ReconError> {
            Err(ReconError::DataSource("connection refused".into()))
        }
    }

    #[test]
    fn collect_surfaces_fetch_failure() {
        let err = collect(&FailingSource, &HistoryQuery::default(), &NormalizeOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "data source error: connection refused");
    }
}
