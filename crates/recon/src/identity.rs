//! Identity keys shared by the rewatch detector and the comparator.

use std::fmt;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Case-insensitive, whitespace-collapsed, diacritics-insensitive form.
pub fn normalize_title(title: &str) -> String {
    let stripped: String = title.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trimmed identifier, `None` when blank.
pub fn clean_id(id: Option<&str>) -> Option<String> {
    id.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TitleYearKey {
    pub title: String,
    pub year: Option<i32>,
}

impl TitleYearKey {
    pub fn new(title: &str, year: Option<i32>) -> Self {
        Self {
            title: normalize_title(title),
            year,
        }
    }
}

impl fmt::Display for TitleYearKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(y) => write!(f, "{} ({y})", self.title),
            None => write!(f, "{}", self.title),
        }
    }
}

/// Content id when resolvable, normalized title/year otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    Content(String),
    TitleYear(TitleYearKey),
}

impl IdentityKey {
    pub fn resolve(content_id: Option<&str>, title: &str, year: Option<i32>) -> Self {
        match clean_id(content_id) {
            Some(id) => Self::Content(id),
            None => Self::TitleYear(TitleYearKey::new(title, year)),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(id) => write!(f, "tmdb:{id}"),
            Self::TitleYear(k) => write!(f, "{k}"),
        }
    }
}
