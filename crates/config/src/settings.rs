// Application settings
// Loaded from ./reelsync.toml or ~/.config/reelsync/config.toml

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use reelsync_recon::snapshot::{DEFAULT_FILE_PATTERN, DEFAULT_MAX_ROWS};
use reelsync_recon::{NormalizeOptions, Precision, RewatchMode};
use tracing::debug;

pub const LOCAL_FILE: &str = "reelsync.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },
    #[error("invalid config{}: {message}", .path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Parse {
        path: Option<PathBuf>,
        message: String,
    },
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    /// A value required by the command was given neither on the command line
    /// nor in the config file.
    #[error("missing {what}: pass {flag} or set {key} in the config file")]
    MissingField {
        what: &'static str,
        flag: &'static str,
        key: &'static str,
    },
}

/// Media server connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlexSection {
    pub url: String,

    /// Required for live commands only
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for PlexSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:32400".to_string(),
            token: None,
            timeout: 60,
        }
    }
}

impl PlexSection {
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingField {
                what: "Plex token",
                flag: "--plex-token (or PLEX_TOKEN)",
                key: "plex.token",
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSection {
    /// Fixed output file; overrides `dir` + `file_pattern`
    pub output: Option<PathBuf>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub user: Option<String>,
    pub library: String,

    /// Snapshot directory (`~` expanded)
    pub dir: String,

    /// Tokens: `{user}`, `{timestamp}`
    pub file_pattern: String,

    /// Stamp precision for file names and window bounds
    pub timestamp_format: Precision,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            output: None,
            from: None,
            to: None,
            user: None,
            library: "Movies".to_string(),
            dir: "data".to_string(),
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            timestamp_format: Precision::Minute,
        }
    }
}

impl ExportSection {
    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).as_ref())
    }

    /// Flag value first, then `export.user`.
    pub fn require_user(&self, flag: Option<&str>) -> Result<String, ConfigError> {
        flag.or(self.user.as_deref())
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::MissingField {
                what: "user",
                flag: "--user",
                key: "export.user",
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CsvSection {
    /// Convert ratings to the half-star scale
    pub rating: bool,

    /// Accepted for compatibility; the Review column is always blank
    pub review: bool,

    pub max_rows: usize,

    /// Emit genres as tags
    pub genres: bool,

    /// Comma-separated custom tags
    pub tags: Option<String>,

    pub rewatch: RewatchMode,
    pub mark_rewatch: bool,
}

impl Default for CsvSection {
    fn default() -> Self {
        Self {
            rating: false,
            review: false,
            max_rows: DEFAULT_MAX_ROWS,
            genres: false,
            tags: None,
            rewatch: RewatchMode::All,
            mark_rewatch: true,
        }
    }
}

impl CsvSection {
    pub fn custom_tags(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            convert_rating: self.rating,
            rewatch: self.rewatch,
            mark_rewatch: self.mark_rewatch,
            genres_as_tags: self.genres,
            custom_tags: self.custom_tags(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointSection {
    /// Start live exports at the latest snapshot when no `from` is given
    pub use_csv: bool,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self { use_csv: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub plex: PlexSection,
    pub export: ExportSection,
    pub csv: CsvSection,
    pub checkpoint: CheckpointSection,
}

/// A config plus the file it came from (`None` = built-in defaults).
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(input).map_err(|e| ConfigError::Parse {
            path: None,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plex.timeout == 0 {
            return Err(ConfigError::Invalid {
                key: "plex.timeout",
                message: "must be at least 1 second".into(),
            });
        }
        if self.csv.max_rows == 0 {
            return Err(ConfigError::Invalid {
                key: "csv.max_rows",
                message: "must be at least 1".into(),
            });
        }
        if self.export.file_pattern.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "export.file_pattern",
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Per-user config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("reelsync").join("config.toml"))
    }

    /// Which file to read: the explicit path, `./reelsync.toml`, then the
    /// per-user file. `Ok(None)` means run on defaults.
    pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Ok(Some(path.to_path_buf()));
        }
        let local = PathBuf::from(LOCAL_FILE);
        if local.exists() {
            return Ok(Some(local));
        }
        Ok(Self::config_path().filter(|p| p.exists()))
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                message,
            },
            other => other,
        })
    }

    /// Load settings from the located file, falling back to defaults
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        match Self::locate(explicit)? {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                Ok(LoadedConfig {
                    config: Self::load_file(&path)?,
                    path: Some(path),
                })
            }
            None => {
                debug!("no config file found, using defaults");
                Ok(LoadedConfig {
                    config: Self::default(),
                    path: None,
                })
            }
        }
    }
}
