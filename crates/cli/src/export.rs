//! `reelsync export`: fetch (or re-slice) watch history and write a
//! snapshot CSV.
//!
//! The file is written to a temp file beside the destination and persisted
//! in one rename, so a failed run never leaves a partial snapshot behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use reelsync_config::Config;
use reelsync_recon::snapshot::{
    latest_snapshot, read_snapshot, render_file_name, render_slice_name, write_snapshot, WriteReport,
};
use reelsync_recon::window::Bound;
use reelsync_recon::{
    collect, library_status, HistoryQuery, LibraryStatus, RowError, TimeWindow, WatchEvent,
    WatchSource,
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::users::plex_client;
use crate::CliError;

/// Issues printed individually before the rest are summarized.
const ISSUE_PREVIEW: usize = 10;
/// Titles listed per side of the library report.
const TITLE_PREVIEW: usize = 10;

pub struct ExportArgs {
    pub user: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub output: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub cached: bool,
    pub library: Option<String>,
    pub plex_token: Option<String>,
    pub unwatched: bool,
}

pub fn cmd_export(config: &Config, args: ExportArgs) -> Result<(), CliError> {
    run_export(config, args, Local::now().naive_local())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn run_export(config: &Config, args: ExportArgs, now: NaiveDateTime) -> Result<(), CliError> {
    let settings = &config.export;
    let precision = settings.timestamp_format;
    let user = settings.require_user(args.user.as_deref())?;
    let dir = args.export_dir.clone().unwrap_or_else(|| settings.dir_path());

    let from = args.from_date.clone().or_else(|| settings.from.clone());
    let to = args.to_date.clone().or_else(|| settings.to.clone());
    let mut window = TimeWindow::parse(from.as_deref(), to.as_deref(), precision)?;

    // Resolve the destination before fetching so a bad path fails fast.
    // Cached slices get a name snapshot discovery skips, so the full
    // history stays the newest snapshot and the checkpoint does not move.
    let output = match args.output.clone().or_else(|| settings.output.clone()) {
        Some(path) => path,
        None if args.cached => {
            dir.join(render_slice_name(&settings.file_pattern, &user, now, precision))
        }
        None => dir.join(render_file_name(&settings.file_pattern, &user, now, precision)),
    };

    let (events, issues, unwatched) = if args.cached {
        let snapshot = latest_snapshot(&dir, &settings.file_pattern, &user)?.ok_or_else(|| {
            CliError::data(format!(
                "no cached snapshot for '{}' in {}",
                user,
                dir.display()
            ))
            .with_hint("run `reelsync export` without --cached first")
        })?;
        if same_file(&output, &snapshot.path) {
            return Err(CliError::data(format!(
                "refusing to overwrite the cached snapshot {}",
                snapshot.path.display()
            ))
            .with_hint("pass --output with a different file"));
        }
        eprintln!("Using cached data from {}", snapshot.path.display());
        let text = fs::read_to_string(&snapshot.path).map_err(|e| {
            CliError::io(format!("cannot read {}: {}", snapshot.path.display(), e))
        })?;
        let rows = read_snapshot(&text)?;
        (rows.events, rows.issues, None)
    } else {
        if window.from.is_none() && config.checkpoint.use_csv {
            if let Some(checkpoint) = latest_snapshot(&dir, &settings.file_pattern, &user)? {
                match TimeWindow::new(Some(Bound::at(checkpoint.taken_at)), window.to, precision) {
                    Ok(resumed) => {
                        info!(
                            path = %checkpoint.path.display(),
                            since = %checkpoint.taken_at,
                            "resuming from last snapshot"
                        );
                        window = resumed;
                    }
                    Err(e) => debug!(error = %e, "checkpoint ignored"),
                }
            }
        }

        let client = plex_client(config, args.plex_token.clone())?;
        let query = HistoryQuery {
            user: Some(user.clone()),
            library: args.library.clone().unwrap_or_else(|| settings.library.clone()),
            since: window.from.map(|b| b.at),
        };
        if let Some(since) = query.since {
            info!(%since, "rewatch flags only cover plays fetched since this point");
        }
        let normalized = collect(&client, &query, &config.csv.normalize_options())?;
        let unwatched = if args.unwatched {
            Some(client.unwatched(&query)?)
        } else {
            None
        };
        (normalized.events, normalized.issues, unwatched)
    };

    let rows = window.apply(&events, now);
    debug!(total = events.len(), in_window = rows.len(), "window applied");
    report_issues(&issues);

    if let Some(unwatched) = unwatched {
        let status = library_status(&rows, &unwatched);
        library_report(&mut io::stdout().lock(), &user, &status)?;
        if args.output.is_none() {
            return Ok(());
        }
    }

    let report = write_atomic(&output, &rows, config.csv.max_rows)?;

    if report.truncated > 0 {
        eprintln!(
            "warning: {} rows over csv.max_rows ({}) were not written",
            report.truncated, config.csv.max_rows
        );
    }

    let range = match (window.from, window.to) {
        (None, None) => "all time".to_string(),
        (from, to) => format!(
            "{} to {}",
            from.map(|b| b.label()).unwrap_or_else(|| "start".into()),
            to.map(|b| b.label()).unwrap_or_else(|| "now".into()),
        ),
    };
    println!(
        "Wrote {} rows for {} ({}) to {}",
        report.written,
        user,
        range,
        output.display()
    );
    Ok(())
}

/// Watched vs unwatched counts for the library, with a short title list each.
fn library_report<W: Write>(out: &mut W, user: &str, status: &LibraryStatus) -> io::Result<()> {
    writeln!(out, "Library status for {user}")?;
    writeln!(out, "  Watched movies:   {}", status.watched.len())?;
    writeln!(out, "  Unwatched movies: {}", status.unwatched.len())?;
    writeln!(out, "  Total unique:     {}", status.total())?;
    for (heading, titles) in [("watched", &status.watched), ("unwatched", &status.unwatched)] {
        if titles.is_empty() {
            continue;
        }
        writeln!(out, "\nFirst {} {heading} movies:", titles.len().min(TITLE_PREVIEW))?;
        for title in titles.iter().take(TITLE_PREVIEW) {
            writeln!(out, "  - {title}")?;
        }
    }
    Ok(())
}

/// Write the snapshot beside `path` and rename it into place.
fn write_atomic(path: &Path, rows: &[WatchEvent], max_rows: usize) -> Result<WriteReport, CliError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .map_err(|e| CliError::io(format!("cannot create {}: {}", parent.display(), e)))?;

    let mut tmp = NamedTempFile::new_in(&parent)
        .map_err(|e| CliError::io(format!("cannot write in {}: {}", parent.display(), e)))?;
    let report = write_snapshot(rows, &mut tmp, max_rows)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| CliError::io(format!("cannot write {}: {}", path.display(), e.error)))?;
    Ok(report)
}

/// Print skipped and folded rows to stderr, grouped per input.
pub(crate) fn report_issues(issues: &[RowError]) {
    if issues.is_empty() {
        return;
    }
    let skipped = issues.iter().filter(|i| i.is_skip()).count();
    eprintln!(
        "warning: {} row issues ({} skipped, {} folded)",
        issues.len(),
        skipped,
        issues.len() - skipped
    );
    for issue in issues.iter().take(ISSUE_PREVIEW) {
        eprintln!("  {}", issue);
    }
    if issues.len() > ISSUE_PREVIEW {
        eprintln!("  ...and {} more", issues.len() - ISSUE_PREVIEW);
    }
}
