//! Plex Media Server client: accounts, library sections, play history and
//! per-item metadata.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{Local, TimeZone};
use reelsync_recon::{
    Account, HistoryQuery, LibraryItem, RawPlay, RawTimestamp, ReconError, WatchSource,
};
use serde_json::Value;
use tracing::{debug, info};

use super::common::FetchClient;

// ── Constants ───────────────────────────────────────────────────────

const PAGE_SIZE: usize = 500;
const HISTORY_PATH: &str = "/status/sessions/history/all";
const TMDB_PREFIX: &str = "tmdb://";

// ── Metadata ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
struct ItemMeta {
    tmdb_id: Option<String>,
    directors: Vec<String>,
    genres: Vec<String>,
    user_rating: Option<f64>,
}

fn tags(item: &Value, field: &str) -> Vec<String> {
    item[field]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t["tag"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn tmdb_id(item: &Value) -> Option<String> {
    item["Guid"].as_array()?.iter().find_map(|g| {
        g["id"]
            .as_str()
            .and_then(|id| id.strip_prefix(TMDB_PREFIX))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    })
}

fn parse_meta(item: &Value) -> ItemMeta {
    ItemMeta {
        tmdb_id: tmdb_id(item),
        directors: tags(item, "Director"),
        genres: tags(item, "Genre"),
        user_rating: item["userRating"].as_f64(),
    }
}

/// Plex serializes ids as numbers on some endpoints and strings on others.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn year(item: &Value) -> Option<i32> {
    item["year"]
        .as_i64()
        .map(|y| y as i32)
        .or_else(|| item["originallyAvailableAt"].as_str()?.get(..4)?.parse().ok())
}

fn container(body: &Value, field: &str) -> Vec<Value> {
    body["MediaContainer"][field]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

// ── Plex client ─────────────────────────────────────────────────────

pub struct PlexClient {
    client: FetchClient,
    base_url: String,
    token: String,
}

impl PlexClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, ReconError> {
        Ok(Self {
            client: FetchClient::new("Plex", timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ReconError> {
        let url = format!("{}{}", self.base_url, path);
        self.client.request_with_retry(|http| {
            http.get(&url)
                .header("Accept", "application/json")
                .header("X-Plex-Token", &self.token)
                .query(query)
        })
    }

    /// Section key for a library title (case-insensitive).
    fn library_key(&self, library: &str) -> Result<String, ReconError> {
        let body = self.get("/library/sections", &[])?;
        let sections = container(&body, "Directory");
        sections
            .iter()
            .find(|s| {
                s["title"]
                    .as_str()
                    .is_some_and(|t| t.eq_ignore_ascii_case(library))
            })
            .and_then(|s| id_string(&s["key"]))
            .ok_or_else(|| {
                let known: Vec<&str> = sections.iter().filter_map(|s| s["title"].as_str()).collect();
                ReconError::DataSource(format!(
                    "library '{library}' not found (available: {})",
                    known.join(", ")
                ))
            })
    }

    /// Account id for a name or id.
    fn account_id(&self, user: &str) -> Result<String, ReconError> {
        let accounts = self.accounts()?;
        accounts
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(user) || a.id == user)
            .map(|a| a.id.clone())
            .ok_or_else(|| {
                ReconError::DataSource(format!(
                    "unknown user '{user}' (run `reelsync list-users`)"
                ))
            })
    }

    fn metadata(&self, rating_key: &str) -> Result<ItemMeta, ReconError> {
        let body = self.get(&format!("/library/metadata/{rating_key}"), &[])?;
        Ok(container(&body, "Metadata")
            .first()
            .map(parse_meta)
            .unwrap_or_default())
    }

    fn page(
        &self,
        path: &str,
        query: &[(&str, String)],
        start: usize,
    ) -> Result<(Vec<Value>, Option<usize>), ReconError> {
        let mut params = query.to_vec();
        params.push(("X-Plex-Container-Start", start.to_string()));
        params.push(("X-Plex-Container-Size", PAGE_SIZE.to_string()));
        let body = self.get(path, &params)?;
        let total = body["MediaContainer"]["totalSize"]
            .as_u64()
            .map(|n| n as usize);
        Ok((container(&body, "Metadata"), total))
    }

    /// Every page of a paged endpoint.
    fn fetch_all(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>, ReconError> {
        let mut entries = Vec::new();
        let mut start = 0;
        loop {
            let (page, total) = self.page(path, query, start)?;
            let got = page.len();
            entries.extend(page);
            start += got;
            debug!(path, page = got, fetched = start, ?total, "page");
            if got < PAGE_SIZE || total.is_some_and(|t| start >= t) {
                break;
            }
        }
        Ok(entries)
    }

    /// History filters for one library section and the query's account.
    fn history_params(
        &self,
        section: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<(&'static str, String)>, ReconError> {
        let mut params: Vec<(&str, String)> = vec![
            ("librarySectionID", section.to_string()),
            ("sort", "viewedAt:asc".to_string()),
        ];
        if let Some(user) = &query.user {
            params.push(("accountID", self.account_id(user)?));
        }
        Ok(params)
    }
}

impl WatchSource for PlexClient {
    fn accounts(&self) -> Result<Vec<Account>, ReconError> {
        let body = self.get("/accounts", &[])?;
        Ok(container(&body, "Account")
            .iter()
            .filter_map(|a| {
                let id = id_string(&a["id"])?;
                let name = a["name"].as_str().unwrap_or("").trim().to_string();
                // Account 0 is the server's own system account.
                (id != "0" && !name.is_empty()).then_some(Account { id, name })
            })
            .collect())
    }

    fn plays(&self, query: &HistoryQuery) -> Result<Vec<RawPlay>, ReconError> {
        let section = self.library_key(&query.library)?;
        let mut params = self.history_params(&section, query)?;
        if let Some(since) = query.since {
            if let Some(local) = Local.from_local_datetime(&since).earliest() {
                // Plex reads `viewedAt>=N` as key `viewedAt>`, value `N`.
                params.push(("viewedAt>", local.timestamp().to_string()));
            }
        }
        let entries = self.fetch_all(HISTORY_PATH, &params)?;

        let mut cache: HashMap<String, ItemMeta> = HashMap::new();
        let mut plays = Vec::new();
        for entry in &entries {
            if entry["type"].as_str() != Some("movie") {
                continue;
            }
            let rating_key = id_string(&entry["ratingKey"]).unwrap_or_default();
            let meta = match cache.get(&rating_key) {
                Some(m) => m.clone(),
                None if rating_key.is_empty() => ItemMeta::default(),
                None => {
                    let m = self.metadata(&rating_key)?;
                    cache.insert(rating_key.clone(), m.clone());
                    m
                }
            };

            let viewed_at = match &entry["viewedAt"] {
                Value::Number(n) => n.as_i64().map(RawTimestamp::Epoch),
                Value::String(s) if !s.trim().is_empty() => Some(match s.trim().parse::<i64>() {
                    Ok(secs) => RawTimestamp::Epoch(secs),
                    Err(_) => RawTimestamp::Text(s.clone()),
                }),
                _ => None,
            };

            plays.push(RawPlay {
                rating_key,
                content_id: meta.tmdb_id,
                title: entry["title"].as_str().unwrap_or("").to_string(),
                year: year(entry),
                directors: meta.directors,
                genres: meta.genres,
                viewed_at,
                user_rating: meta.user_rating.or_else(|| entry["userRating"].as_f64()),
            });
        }

        info!(
            entries = entries.len(),
            movies = plays.len(),
            items = cache.len(),
            "fetched Plex history"
        );
        Ok(plays)
    }

    fn unwatched(&self, query: &HistoryQuery) -> Result<Vec<LibraryItem>, ReconError> {
        let section = self.library_key(&query.library)?;
        let params = self.history_params(&section, query)?;
        let watched: HashSet<String> = self
            .fetch_all(HISTORY_PATH, &params)?
            .iter()
            .filter(|e| e["type"].as_str() == Some("movie"))
            .filter_map(|e| id_string(&e["ratingKey"]))
            .collect();

        let items = self.fetch_all(
            &format!("/library/sections/{section}/all"),
            &[("type", "1".to_string()), ("includeGuids", "1".to_string())],
        )?;
        let library_size = items.len();
        let unwatched: Vec<LibraryItem> = items
            .iter()
            .filter_map(|item| {
                let rating_key = id_string(&item["ratingKey"])?;
                (!watched.contains(&rating_key)).then(|| LibraryItem {
                    content_id: tmdb_id(item),
                    title: item["title"].as_str().unwrap_or("").to_string(),
                    year: year(item),
                    rating_key,
                })
            })
            .collect();

        info!(
            library = library_size,
            watched = watched.len(),
            unwatched = unwatched.len(),
            "checked library watch status"
        );
        Ok(unwatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> PlexClient {
        let mut c = PlexClient::new(&server.base_url(), "tok".into(), Duration::from_secs(5)).unwrap();
        c.client = c.client.with_backoff(Duration::from_millis(1));
        c
    }

    fn mock_sections(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET).path("/library/sections");
            then.status(200).json_body(json!({
                "MediaContainer": { "Directory": [
                    { "key": "1", "title": "Movies", "type": "movie" },
                    { "key": "2", "title": "TV Shows", "type": "show" }
                ]}
            }));
        });
    }

    fn mock_accounts(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET).path("/accounts");
            then.status(200).json_body(json!({
                "MediaContainer": { "Account": [
                    { "id": 0, "name": "" },
                    { "id": 1, "name": "alice" },
                    { "id": 7, "name": "Bob" }
                ]}
            }));
        });
    }

    #[test]
    fn test_parse_meta() {
        let item = json!({
            "userRating": 8.0,
            "Guid": [{ "id": "imdb://tt0113277" }, { "id": "tmdb://949" }],
            "Director": [{ "tag": "Michael Mann" }],
            "Genre": [{ "tag": "Crime" }, { "tag": "Drama" }]
        });
        let meta = parse_meta(&item);
        assert_eq!(meta.tmdb_id.as_deref(), Some("949"));
        assert_eq!(meta.directors, vec!["Michael Mann"]);
        assert_eq!(meta.genres, vec!["Crime", "Drama"]);
        assert_eq!(meta.user_rating, Some(8.0));
        assert_eq!(parse_meta(&json!({})), ItemMeta::default());
    }

    #[test]
    fn test_accounts_skip_system_account() {
        let server = MockServer::start();
        mock_accounts(&server);
        let accounts = client(&server).accounts().unwrap();
        assert_eq!(
            accounts,
            vec![
                Account { id: "1".into(), name: "alice".into() },
                Account { id: "7".into(), name: "Bob".into() },
            ]
        );
    }

    #[test]
    fn test_plays_with_metadata_cache() {
        let server = MockServer::start();
        mock_sections(&server);
        mock_accounts(&server);

        let history = server.mock(|when, then| {
            when.method(GET)
                .path("/status/sessions/history/all")
                .header("X-Plex-Token", "tok")
                .query_param("librarySectionID", "1")
                .query_param("accountID", "7");
            then.status(200).json_body(json!({
                "MediaContainer": { "size": 4, "totalSize": 4, "Metadata": [
                    { "ratingKey": "100", "title": "Heat", "year": 1995, "type": "movie", "viewedAt": 1740855600 },
                    { "ratingKey": "100", "title": "Heat", "year": 1995, "type": "movie", "viewedAt": 1744740000 },
                    { "ratingKey": "200", "title": "Pilot", "type": "episode", "viewedAt": 1744740000 },
                    { "ratingKey": "300", "title": "Alien", "year": 1979, "type": "movie" }
                ]}
            }));
        });
        let heat = server.mock(|when, then| {
            when.method(GET).path("/library/metadata/100");
            then.status(200).json_body(json!({
                "MediaContainer": { "Metadata": [{
                    "userRating": 9.0,
                    "Guid": [{ "id": "tmdb://949" }],
                    "Director": [{ "tag": "Michael Mann" }]
                }]}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/library/metadata/300");
            then.status(200).json_body(json!({ "MediaContainer": { "Metadata": [{}] } }));
        });

        let query = HistoryQuery {
            user: Some("bob".into()),
            library: "movies".into(),
            since: None,
        };
        let plays = client(&server).plays(&query).unwrap();

        history.assert();
        heat.assert_calls(1);
        assert_eq!(plays.len(), 3);
        assert_eq!(plays[0].content_id.as_deref(), Some("949"));
        assert_eq!(plays[0].user_rating, Some(9.0));
        assert_eq!(plays[0].viewed_at, Some(RawTimestamp::Epoch(1740855600)));
        assert_eq!(plays[1].directors, vec!["Michael Mann"]);
        assert_eq!(plays[2].viewed_at, None);
    }

    #[test]
    fn test_unknown_library() {
        let server = MockServer::start();
        mock_sections(&server);
        let query = HistoryQuery { library: "Films".into(), ..Default::default() };
        let err = client(&server).plays(&query).unwrap_err();
        assert!(err.to_string().contains("library 'Films' not found"), "{err}");
        assert!(err.to_string().contains("Movies, TV Shows"), "{err}");
    }

    #[test]
    fn test_unknown_user() {
        let server = MockServer::start();
        mock_sections(&server);
        mock_accounts(&server);
        let query = HistoryQuery {
            user: Some("carol".into()),
            library: "Movies".into(),
            since: None,
        };
        let err = client(&server).plays(&query).unwrap_err();
        assert!(err.to_string().contains("unknown user 'carol'"), "{err}");
    }

    #[test]
    fn test_auth_failure_is_not_retried() {
        let server = MockServer::start();
        let accounts = server.mock(|when, then| {
            when.method(GET).path("/accounts");
            then.status(401);
        });
        let err = client(&server).accounts().unwrap_err();
        accounts.assert_calls(1);
        assert!(matches!(err, ReconError::DataSource(_)));
        assert!(err.to_string().contains("Plex auth failed (401)"), "{err}");
    }

    #[test]
    fn test_upstream_error_retries_then_fails() {
        let server = MockServer::start();
        let accounts = server.mock(|when, then| {
            when.method(GET).path("/accounts");
            then.status(503);
        });
        let err = client(&server).accounts().unwrap_err();
        accounts.assert_calls(4);
        assert!(err.to_string().contains("upstream error after 3 attempts"), "{err}");
    }

    #[test]
    fn test_pagination() {
        let server = MockServer::start();
        mock_sections(&server);

        let page1: Vec<Value> = (0..PAGE_SIZE)
            .map(|i| json!({ "title": format!("Ep {i}"), "type": "episode", "viewedAt": 1740855600 }))
            .collect();
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/status/sessions/history/all")
                .query_param("X-Plex-Container-Start", "0");
            then.status(200).json_body(json!({
                "MediaContainer": { "totalSize": PAGE_SIZE + 1, "Metadata": page1 }
            }));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/status/sessions/history/all")
                .query_param("X-Plex-Container-Start", PAGE_SIZE.to_string());
            then.status(200).json_body(json!({
                "MediaContainer": { "totalSize": PAGE_SIZE + 1, "Metadata": [
                    { "title": "Heat", "year": 1995, "type": "movie", "viewedAt": 1740855600 }
                ]}
            }));
        });

        let query = HistoryQuery { library: "Movies".into(), ..Default::default() };
        let plays = client(&server).plays(&query).unwrap();
        first.assert();
        second.assert();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].title, "Heat");
    }

    #[test]
    fn test_unwatched_against_account_history() {
        let server = MockServer::start();
        mock_sections(&server);
        mock_accounts(&server);

        let history = server.mock(|when, then| {
            when.method(GET)
                .path("/status/sessions/history/all")
                .query_param("librarySectionID", "1")
                .query_param("accountID", "1");
            then.status(200).json_body(json!({
                "MediaContainer": { "totalSize": 3, "Metadata": [
                    { "ratingKey": "100", "title": "Heat", "type": "movie", "viewedAt": 1740855600 },
                    { "ratingKey": "100", "title": "Heat", "type": "movie", "viewedAt": 1744740000 },
                    { "ratingKey": "300", "title": "Pilot", "type": "episode", "viewedAt": 1744740000 }
                ]}
            }));
        });
        let library = server.mock(|when, then| {
            when.method(GET)
                .path("/library/sections/1/all")
                .query_param("type", "1")
                .query_param("includeGuids", "1");
            then.status(200).json_body(json!({
                "MediaContainer": { "totalSize": 3, "Metadata": [
                    { "ratingKey": "100", "title": "Heat", "year": 1995 },
                    { "ratingKey": 200, "title": "Alien", "year": 1979, "Guid": [{ "id": "tmdb://348" }] },
                    { "ratingKey": "300", "title": "Solaris", "originallyAvailableAt": "1972-03-20" }
                ]}
            }));
        });

        let query = HistoryQuery {
            user: Some("alice".into()),
            library: "Movies".into(),
            since: None,
        };
        let unwatched = client(&server).unwatched(&query).unwrap();

        history.assert();
        library.assert();
        assert_eq!(
            unwatched,
            vec![
                LibraryItem {
                    rating_key: "200".into(),
                    content_id: Some("348".into()),
                    title: "Alien".into(),
                    year: Some(1979),
                },
                LibraryItem {
                    rating_key: "300".into(),
                    content_id: None,
                    title: "Solaris".into(),
                    year: Some(1972),
                },
            ]
        );
    }

    #[test]
    fn test_unwatched_ignores_since() {
        let server = MockServer::start();
        mock_sections(&server);
        let windowed = server.mock(|when, then| {
            when.method(GET)
                .path("/status/sessions/history/all")
                .query_param_exists("viewedAt>");
            then.status(500);
        });
        server.mock(|when, then| {
            when.method(GET).path("/status/sessions/history/all");
            then.status(200).json_body(json!({ "MediaContainer": { "totalSize": 0 } }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/library/sections/1/all");
            then.status(200).json_body(json!({
                "MediaContainer": { "Metadata": [{ "ratingKey": "100", "title": "Heat", "year": 1995 }] }
            }));
        });

        let query = HistoryQuery {
            user: None,
            library: "Movies".into(),
            since: chrono::NaiveDate::from_ymd_opt(2025, 6, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        };
        let unwatched = client(&server).unwatched(&query).unwrap();
        windowed.assert_calls(0);
        assert_eq!(unwatched.len(), 1);
        assert_eq!(unwatched[0].title, "Heat");
    }
}
