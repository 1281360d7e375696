#![warn(missing_docs)]
//! Maintainer pipeline for a simple-streams image repository: scans an
//! on-disk tree of OS images, rebuilds the JSON product catalog and index,
//! generates binary deltas between successive versions, and prunes old or
//! dangling versions.
//!
//! ```no_run
//! # async fn run() -> Result<(), streamcat::Error> {
//! use std::path::PathBuf;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = streamcat::BuildConfig {
//!     root: PathBuf::from("/srv/images"),
//!     stream_version: "v1".to_string(),
//!     streams: vec!["images".to_string()],
//!     workers: streamcat::WorkerPool::default_worker_count(),
//! };
//! streamcat::build::run(&config, CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod catalog_store;
pub mod clock;
pub mod config;
pub mod differ;
pub mod error;
pub mod hasher;
pub mod image_config;
pub mod model;
pub mod path;
pub mod pool;
pub mod prune;
pub mod scanner;

pub use build::BuildConfig;
pub use error::Error;
pub use pool::WorkerPool;
pub use prune::PruneConfig;
