//! The data-fetch collaborator. Implementations live outside the engine
//! (the CLI's Plex client); tests use in-memory sources.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::ReconError;
use crate::model::{LibraryItem, RawPlay};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Account name or id; `None` = every account.
    pub user: Option<String>,
    pub library: String,
    /// Server-side lower bound, when the source supports one.
    pub since: Option<NaiveDateTime>,
}

pub trait WatchSource {
    fn accounts(&self) -> Result<Vec<Account>, ReconError>;

    /// Return the complete play list for the query, or an error. Partial
    /// results are never returned.
    fn plays(&self, query: &HistoryQuery) -> Result<Vec<RawPlay>, ReconError>;

    /// Movies in `query.library` the account has never played, over its
    /// whole history. `query.since` is ignored.
    fn unwatched(&self, query: &HistoryQuery) -> Result<Vec<LibraryItem>, ReconError>;
}
