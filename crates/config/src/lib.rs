// Configuration loading

pub mod settings;

pub use settings::{
    CheckpointSection, Config, ConfigError, CsvSection, ExportSection, LoadedConfig, PlexSection,
};
