//! TOML configuration file support. CLI flags always take precedence over a
//! loaded config file; the config file only fills in values the user didn't
//! pass on the command line.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

/// Parsed contents of a `--config` TOML file. Every field is optional so a
/// file can specify just the parts it cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    /// Repository root.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Metadata-format version, e.g. `v1`.
    #[serde(default)]
    pub stream_version: Option<String>,
    /// Stream names.
    #[serde(default)]
    pub image_dir: Vec<String>,
    /// Worker pool size.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Retention count for `prune`.
    #[serde(default)]
    pub retain: Option<usize>,
    /// Whether to run dangling-version pruning.
    #[serde(default)]
    pub dangling: Option<bool>,
    /// Process-wide timeout, seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Log level: `debug`, `info`, `warn`, `error`.
    #[serde(default)]
    pub loglevel: Option<String>,
    /// Log format: `text` or `json`.
    #[serde(default)]
    pub logformat: Option<String>,
}

impl FileConfig {
    /// Loads and parses a config file from `path`.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&contents).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// Returns `cli_value` if set, else `file_value`.
pub fn resolve<T>(cli_value: Option<T>, file_value: Option<T>) -> Option<T> {
    cli_value.or(file_value)
}

/// Returns the streams to operate on: CLI-provided `--image-dir` values win
/// outright over the config file's `image_dir` list when non-empty.
pub fn resolve_streams(cli_streams: Vec<String>, file_streams: Vec<String>) -> Vec<String> {
    if cli_streams.is_empty() {
        file_streams
    } else {
        cli_streams
    }
}
