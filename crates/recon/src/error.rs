use std::fmt;

use serde::Serialize;

/// Run-level errors. Any of these aborts the run before output is written.
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// Missing required column in an input CSV.
    #[error("{source_label}: missing column '{column}'")]
    MissingColumn { source_label: String, column: String },
    /// A window bound that cannot be parsed.
    #[error("cannot parse {which} bound '{value}' (expected YYYY-MM-DD or YYYY-MM-DD-HH-MM)")]
    BoundParse { which: &'static str, value: String },
    /// `from` lies after `to`.
    #[error("invalid window: from ({from}) is after to ({to})")]
    InvalidWindow { from: String, to: String },
    /// Upstream fetch failure, surfaced verbatim.
    #[error("data source error: {0}")]
    DataSource(String),
    /// CSV framing error (unbalanced quotes, bad UTF-8, ...).
    #[error("{source_label}: CSV error: {message}")]
    Csv { source_label: String, message: String },
    /// IO error (file read, write, rename).
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ReconError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Row-level errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowErrorKind {
    MissingDate,
    BadDate { value: String },
    /// Title/year key claimed by several identifiers, or by id-less rows
    /// that disagree on directors.
    AmbiguousIdentity { key: String },
    /// Same identity watched more than once on the same calendar date.
    DuplicateWatch { key: String, date: String },
}

/// A single skipped (or folded) input row. Collected, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub source_label: String,
    /// 1-based row number (data rows, header excluded) or event position.
    pub row: usize,
    pub title: String,
    #[serde(flatten)]
    pub kind: RowErrorKind,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match &self.kind {
            RowErrorKind::MissingDate => "missing watch date".to_string(),
            RowErrorKind::BadDate { value } => format!("cannot parse date '{value}'"),
            RowErrorKind::AmbiguousIdentity { key } => {
                format!("ambiguous identity for '{key}' (not merged)")
            }
            RowErrorKind::DuplicateWatch { key, date } => {
                format!("duplicate watch of '{key}' on {date} (folded into one)")
            }
        };
        write!(f, "{} row {}", self.source_label, self.row)?;
        if !self.title.is_empty() {
            write!(f, " ('{}')", self.title)?;
        }
        write!(f, ": {what}")
    }
}

impl RowError {
    pub fn new(source_label: &str, row: usize, title: &str, kind: RowErrorKind) -> Self {
        Self {
            source_label: source_label.to_string(),
            row,
            title: title.to_string(),
            kind,
        }
    }

    /// Duplicates are folded, not dropped; everything else skips the row.
    pub fn is_skip(&self) -> bool {
        !matches!(self.kind, RowErrorKind::DuplicateWatch { .. })
    }
}
