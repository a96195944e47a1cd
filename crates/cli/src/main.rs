// reelsync CLI - export Plex watch history for Letterboxd, compare the two

mod compare;
mod exit_codes;
mod export;
mod fetch;
mod plot;
mod users;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use reelsync_config::{Config, ConfigError};
use reelsync_recon::{Granularity, ReconError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

// Re-export exit codes from registry (single source of truth)
use exit_codes::{config_exit_code, recon_exit_code, EXIT_DATA, EXIT_IO, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "reelsync")]
#[command(about = "Export Plex watch history as a Letterboxd import CSV and compare it against a Letterboxd export")]
#[command(version)]
struct Cli {
    /// Config file (default: ./reelsync.toml, then the per-user config)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging on stderr (REELSYNC_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the accounts on the Plex server
    #[command(after_help = "\
Examples:
  reelsync list-users
  PLEX_TOKEN=xxxx reelsync list-users
  reelsync list-users --config ~/plex.toml")]
    ListUsers {
        /// Plex token (default: plex.token in the config file)
        #[arg(long, env = "PLEX_TOKEN", hide_env_values = true)]
        plex_token: Option<String>,
    },

    /// Export watch history as a Letterboxd-compatible CSV snapshot
    #[command(after_help = "\
Without --from-date, a live export starts at the newest snapshot in the \
export directory (checkpoint.use_csv). Bounds take YYYY-MM-DD or \
YYYY-MM-DD HH:MM; --to-date defaults to now. Cached slices are written as \
plex-watched-{user}-slice-{timestamp}.csv and never count as snapshots.

Examples:
  reelsync export --user alice
  reelsync export --user alice --from-date 2025-01-01 --to-date 2025-06-30
  reelsync export --user alice --output diary.csv
  reelsync export --user alice --cached --from-date 2025-04-01
  reelsync export --user alice --unwatched
  reelsync export --user alice --export-dir ~/plex-exports --library Films")]
    Export {
        /// Plex account name or id (default: export.user)
        #[arg(long)]
        user: Option<String>,

        /// Start of the window, inclusive
        #[arg(long, value_name = "DATE")]
        from_date: Option<String>,

        /// End of the window, inclusive
        #[arg(long, value_name = "DATE")]
        to_date: Option<String>,

        /// Output CSV file (default: export.dir + export.file_pattern)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Snapshot directory (default: export.dir)
        #[arg(long, value_name = "DIR")]
        export_dir: Option<PathBuf>,

        /// Re-slice the newest snapshot instead of querying Plex
        #[arg(long)]
        cached: bool,

        /// Library section title (default: export.library)
        #[arg(long)]
        library: Option<String>,

        /// Plex token (default: plex.token in the config file)
        #[arg(long, env = "PLEX_TOKEN", hide_env_values = true)]
        plex_token: Option<String>,

        /// Report watched vs unwatched movies in the library; without
        /// --output no CSV is written
        #[arg(long, conflicts_with = "cached")]
        unwatched: bool,
    },

    /// Compare a Plex snapshot against a Letterboxd diary export
    #[command(after_help = "\
Rows are paired by tmdbID first, then by normalized title and year. \
Title/year collisions without ids are reported as ambiguous, never merged.

Examples:
  reelsync compare --plex data/plex-watched-alice-2025-08-12-21-40.csv --letterboxd diary.csv
  reelsync compare --plex snap.csv --letterboxd diary.csv --granularity week
  reelsync compare --plex snap.csv --letterboxd diary.csv --output overlap.svg
  reelsync compare --plex snap.csv --letterboxd diary.csv --from-date 2025-01-01 --json | jq .summary")]
    Compare {
        /// Plex snapshot CSV
        #[arg(long, value_name = "FILE")]
        plex: PathBuf,

        /// Letterboxd diary CSV
        #[arg(long, value_name = "FILE")]
        letterboxd: PathBuf,

        /// Start of the window, inclusive (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from_date: Option<String>,

        /// End of the window, inclusive (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        to_date: Option<String>,

        /// Bucket size: day, week, month, year
        #[arg(long, default_value = "month")]
        granularity: Granularity,

        /// Account name embedded in suggested export commands
        #[arg(long)]
        user: Option<String>,

        /// Write an SVG chart to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Skip the chart
        #[arg(long)]
        no_plot: bool,

        /// Print the full result as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("REELSYNC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "reelsync=debug,info"
        } else {
            "reelsync=info,warn"
        })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::ListUsers { plex_token } => users::cmd_list_users(&config, plex_token),
        Commands::Export {
            user,
            from_date,
            to_date,
            output,
            export_dir,
            cached,
            library,
            plex_token,
            unwatched,
        } => export::cmd_export(
            &config,
            export::ExportArgs {
                user,
                from_date,
                to_date,
                output,
                export_dir,
                cached,
                library,
                plex_token,
                unwatched,
            },
        ),
        Commands::Compare {
            plex,
            letterboxd,
            from_date,
            to_date,
            granularity,
            user,
            output,
            no_plot,
            json,
        } => compare::cmd_compare(
            &config,
            compare::CompareArgs {
                plex,
                letterboxd,
                from_date,
                to_date,
                granularity,
                user,
                output,
                no_plot,
                json,
            },
        ),
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn load_config(explicit: Option<&std::path::Path>) -> Result<Config, CliError> {
    let loaded = Config::load(explicit)?;
    if let Some(path) = &loaded.path {
        tracing::debug!(path = %path.display(), "config loaded");
    }
    Ok(loaded.config)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn data(msg: impl Into<String>) -> Self {
        Self { code: EXIT_DATA, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let code = recon_exit_code(&err);
        let hint = match &err {
            ReconError::BoundParse { .. } => Some("use YYYY-MM-DD or YYYY-MM-DD HH:MM".to_string()),
            ReconError::InvalidWindow { .. } => {
                Some("--from-date must not be after --to-date".to_string())
            }
            ReconError::MissingColumn { source_label, .. } if source_label == "letterboxd" => {
                Some("use diary.csv from the Letterboxd data export".to_string())
            }
            ReconError::DataSource(_) => Some("no output file was written".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::Parse { .. } => {
                Some("sections: [plex], [export], [csv], [checkpoint]".to_string())
            }
            ConfigError::NotFound(_) => {
                Some("drop --config to use ./reelsync.toml or built-in defaults".to_string())
            }
            _ => None,
        };
        Self { code: config_exit_code(&err), message: err.to_string(), hint }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::io(err.to_string())
    }
}
