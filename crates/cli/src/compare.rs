//! `reelsync compare`: pair a Plex snapshot with a Letterboxd diary and
//! report coverage, differences and the exports that would close the gaps.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, NaiveTime};
use reelsync_config::Config;
use reelsync_recon::compare::{rows_from_events, rows_from_log};
use reelsync_recon::counterpart::read_log;
use reelsync_recon::model::CompareRow;
use reelsync_recon::snapshot::read_snapshot;
use reelsync_recon::{
    advise, run, Granularity, OverlapResult, Precision, RangeAdvice, RowError, TimeWindow,
};
use serde::Serialize;
use tracing::debug;

use crate::export::report_issues;
use crate::plot;
use crate::CliError;

const LABEL_A: &str = "Plex";
const LABEL_B: &str = "Letterboxd";
const PROGRAM: &str = "reelsync";
/// Rows listed per only-list in the text report.
const LIST_LIMIT: usize = 20;

pub struct CompareArgs {
    pub plex: PathBuf,
    pub letterboxd: PathBuf,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub granularity: Granularity,
    pub user: Option<String>,
    pub output: Option<PathBuf>,
    pub no_plot: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    granularity: Granularity,
    #[serde(flatten)]
    result: &'a OverlapResult,
    advice: Option<&'a RangeAdvice>,
    issues: &'a [RowError],
}

pub fn cmd_compare(config: &Config, args: CompareArgs) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_compare(config, args, Local::now().naive_local(), &mut out)
}

fn read_input(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {}: {}", path.display(), e)))
}

fn run_compare<W: Write>(
    config: &Config,
    args: CompareArgs,
    now: NaiveDateTime,
    out: &mut W,
) -> Result<(), CliError> {
    // Bounds are parsed before any file is touched so usage errors win.
    let window = TimeWindow::parse(
        args.from_date.as_deref(),
        args.to_date.as_deref(),
        Precision::Date,
    )?;

    let snapshot = read_snapshot(&read_input(&args.plex)?)?;
    let log = read_log(&read_input(&args.letterboxd)?)?;

    let events = window.apply(&snapshot.events, now);
    let entries = window.apply_by(&log.entries, |e| e.date.and_time(NaiveTime::MIN), now);
    debug!(
        plex = events.len(),
        letterboxd = entries.len(),
        "rows inside window"
    );

    let result = run(&rows_from_events(&events), &rows_from_log(&entries), args.granularity);

    let user = args.user.clone().or_else(|| config.export.user.clone());
    let advice = match (&result.span_a, &result.span_b) {
        (Some(a), Some(b)) => Some(advise(a, b, user.as_deref(), PROGRAM)),
        _ => None,
    };

    let mut issues = snapshot.issues;
    issues.extend(log.issues);
    report_issues(&issues);

    if args.json {
        let report = JsonReport {
            granularity: args.granularity,
            result: &result,
            advice: advice.as_ref(),
            issues: &issues,
        };
        serde_json::to_writer_pretty(&mut *out, &report)
            .map_err(|e| CliError::io(format!("cannot write JSON: {}", e)))?;
        writeln!(out)?;
    } else {
        write_report(out, &result, advice.as_ref())?;
    }

    if let Some(path) = &args.output {
        let svg = plot::render_svg(&result.buckets, &result.cumulative, LABEL_A, LABEL_B);
        fs::write(path, svg)
            .map_err(|e| CliError::io(format!("cannot write {}: {}", path.display(), e)))?;
        eprintln!("Chart written to {}", path.display());
    } else if !args.no_plot && !args.json {
        writeln!(out)?;
        out.write_all(
            plot::render_text(&result.buckets, &result.cumulative, LABEL_A, LABEL_B).as_bytes(),
        )?;
    }
    Ok(())
}

fn describe(row: &CompareRow) -> String {
    match row.year {
        Some(year) => format!("{}  {} ({})", row.date, row.title, year),
        None => format!("{}  {}", row.date, row.title),
    }
}

fn write_rows<W: Write>(out: &mut W, heading: &str, rows: &[CompareRow]) -> io::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "{} ({}):", heading, rows.len())?;
    for row in rows.iter().take(LIST_LIMIT) {
        writeln!(out, "  {}", describe(row))?;
    }
    if rows.len() > LIST_LIMIT {
        writeln!(out, "  ...and {} more", rows.len() - LIST_LIMIT)?;
    }
    Ok(())
}

fn write_report<W: Write>(
    out: &mut W,
    result: &OverlapResult,
    advice: Option<&RangeAdvice>,
) -> io::Result<()> {
    let s = &result.summary;
    let span = |span: &Option<reelsync_recon::DateSpan>| match span {
        Some(span) => span.to_string(),
        None => "no rows".to_string(),
    };

    writeln!(out, "{:<12}{} rows, {}", format!("{}:", LABEL_A), s.rows_a, span(&result.span_a))?;
    writeln!(out, "{:<12}{} rows, {}", format!("{}:", LABEL_B), s.rows_b, span(&result.span_b))?;
    match &result.overlap {
        Some(overlap) => writeln!(out, "{:<12}{} ({} days)", "Overlap:", overlap.span, overlap.days)?,
        None => writeln!(out, "{:<12}no overlapping period", "Overlap:")?,
    }
    writeln!(
        out,
        "{:<12}{} titles in both, {} Plex, {} Letterboxd",
        "Distinct:", s.distinct_titles_both, s.distinct_titles_a, s.distinct_titles_b
    )?;

    writeln!(out)?;
    writeln!(
        out,
        "Matched:         {} ({} by tmdbID, {} by title/year)",
        s.matched, s.matched_by_identifier, s.matched_by_title_year
    )?;
    writeln!(out, "Plex only:       {}", s.source_only)?;
    writeln!(out, "Letterboxd only: {}", s.counterpart_only)?;
    writeln!(out, "Ambiguous:       {}", s.ambiguous)?;

    write_rows(out, "Watched on Plex, not logged", &result.source_only)?;
    write_rows(out, "Logged, not watched on Plex", &result.counterpart_only)?;
    write_rows(out, "Ambiguous title/year (not merged)", &result.ambiguous)?;

    if let Some(advice) = advice {
        writeln!(out)?;
        writeln!(out, "Range coverage: {}", advice.class)?;
        for (gap, command) in advice.gaps.iter().zip(&advice.commands) {
            writeln!(out, "  missing from Letterboxd: {}", gap)?;
            writeln!(out, "    {}", command)?;
        }
    }
    Ok(())
}
