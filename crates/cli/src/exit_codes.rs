//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified)                          |
//! | 2    | Usage error (bad args, bad date bound, from > to)    |
//! | 3    | Configuration error (unknown key, missing user)      |
//! | 4    | Data error (missing column, unreadable CSV)          |
//! | 5    | I/O error (read, write, rename)                      |
//! | 6    | Data source failure (Plex unreachable, auth, 5xx)    |

use reelsync_config::ConfigError;
use reelsync_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
#[allow(dead_code)]
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unparseable or inverted date range.
pub const EXIT_USAGE: u8 = 2;

/// Config file unreadable, unknown key, or required value missing.
pub const EXIT_CONFIG: u8 = 3;

/// Input data unusable as a whole (missing column, CSV framing).
/// Single bad rows are skipped and reported, not fatal.
pub const EXIT_DATA: u8 = 4;

/// File read/write failure.
pub const EXIT_IO: u8 = 5;

/// Upstream failure. No output file is written.
pub const EXIT_SOURCE: u8 = 6;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::BoundParse { .. } | ReconError::InvalidWindow { .. } => EXIT_USAGE,
        ReconError::MissingColumn { .. } | ReconError::Csv { .. } => EXIT_DATA,
        ReconError::Io(_) => EXIT_IO,
        ReconError::DataSource(_) => EXIT_SOURCE,
    }
}

pub fn config_exit_code(_err: &ConfigError) -> u8 {
    EXIT_CONFIG
}
