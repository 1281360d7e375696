//! Error taxonomy for the streamcat maintainer pipeline.
//!
//! Each module that can fail defines its own [`thiserror::Error`] enum; this
//! keeps call sites specific (a [`Scanner`](crate::scanner) caller only ever
//! sees [`ScanError`] variants) while [`Error`] aggregates everything for
//! callers that just want one type to propagate with `?`.

use std::path::PathBuf;

/// Errors from scanning an on-disk simple-streams tree.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A filesystem I/O operation failed while reading a path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The version is missing mandatory files, or its directory name begins
    /// with `.` and hiding was not explicitly requested.
    #[error("version {version} is incomplete: {reason}")]
    VersionIncomplete {
        /// Version directory name.
        version: String,
        /// Human-readable reason (missing metadata, missing rootfs, hidden).
        reason: String,
    },

    /// `image.yaml` exists but could not be parsed.
    #[error("invalid image-config for version {version}: {source}")]
    InvalidImageConfig {
        /// Version directory name.
        version: String,
        /// Underlying YAML parse error.
        source: serde_yaml::Error,
    },

    /// A product's relative path does not have exactly four components, or
    /// the directory does not exist.
    #[error("invalid product path {path:?}: expected exactly 4 path components (distro/release/arch/variant)")]
    InvalidProductPath {
        /// The offending relative path.
        path: PathBuf,
    },

    /// The requested file does not exist.
    #[error("file not found: {path:?}")]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// Propagated from the hasher when `calcHashes` is requested.
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Errors from hashing files.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// A filesystem I/O operation failed while reading a file to hash.
    #[error("I/O error hashing {path:?}: {source}")]
    Io {
        /// File being hashed when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors from invoking the external delta generator.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The differ process could not be spawned.
    #[error("failed to spawn differ process: {0}")]
    Spawn(std::io::Error),

    /// The differ process exited with a non-zero status.
    #[error("differ exited with status {0}")]
    ExitStatus(std::process::ExitStatus),

    /// The source file for the delta does not exist.
    #[error("differ source file missing: {0:?}")]
    SourceMissing(PathBuf),

    /// Removing a partial/failed delta output failed.
    #[error("I/O error removing partial output {path:?}: {source}")]
    Cleanup {
        /// Partial output path being removed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The operation was cancelled before the differ finished.
    #[error("diff cancelled")]
    Cancelled,
}

/// Errors from reading or atomically publishing the catalog and index.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// A filesystem I/O operation failed.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The catalog or index could not be serialized to JSON.
    #[error("failed to serialize JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from the build orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Propagated from the scanner.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Propagated from catalog publishing.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The build was cancelled before publishing; nothing was written.
    #[error("build cancelled")]
    Cancelled,
}

/// Errors from the prune orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum PruneError {
    /// Propagated from catalog publishing.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Propagated from the scanner.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// A filesystem I/O operation failed.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// Path being read or removed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Top-level error aggregating every crate-internal error family.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Propagated from the scanner.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Propagated from the hasher.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// Propagated from the differ.
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// Propagated from the catalog store.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Propagated from the build orchestrator.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Propagated from the prune orchestrator.
    #[error(transparent)]
    Prune(#[from] PruneError),

    /// A configuration value was invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}
