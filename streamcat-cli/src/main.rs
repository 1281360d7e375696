//! Command-line entry point for the streamcat maintainer pipeline.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use streamcat::config::{self, FileConfig};

/// Maintains a simple-streams image repository: scans, hashes, diffs,
/// publishes, and prunes.
#[derive(Debug, Parser)]
#[command(name = "streamcat", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML config file. CLI flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Abort the whole run after this many seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Minimum log level emitted.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    loglevel: LogLevel,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    logformat: LogFormat,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild the product catalog and index for one or more streams.
    Build {
        /// Repository root.
        root: PathBuf,

        /// Metadata-format version directory name, e.g. `v1`.
        #[arg(long, default_value = "v1")]
        stream_version: String,

        /// Stream name to rebuild. Repeatable.
        #[arg(long = "image-dir")]
        image_dir: Vec<String>,

        /// Worker pool size. Defaults to half the available parallelism.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Prune old versions by retention policy and remove dangling versions.
    Prune {
        /// Repository root.
        root: PathBuf,

        /// Metadata-format version directory name, e.g. `v1`.
        #[arg(long, default_value = "v1")]
        stream_version: String,

        /// Stream name to prune. Repeatable.
        #[arg(long = "image-dir")]
        image_dir: Vec<String>,

        /// Number of newest versions to retain per product.
        #[arg(long)]
        retain: Option<usize>,

        /// Also remove on-disk versions not referenced by the catalog.
        #[arg(long)]
        dangling: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(level: LogLevel, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

fn install_cancellation(timeout: Option<u64>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, cancelling");
            ctrl_c_cancel.cancel();
        }
    });

    if let Some(secs) = timeout {
        let timeout_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
            info!(timeout_secs = secs, "timeout reached, cancelling");
            timeout_cancel.cancel();
        });
    }

    cancel
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.loglevel, cli.logformat);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), streamcat::Error> {
    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path).await?,
        None => FileConfig::default(),
    };

    let cancel = install_cancellation(config::resolve(cli.timeout, file_config.timeout));

    match cli.command {
        Command::Build {
            root,
            stream_version,
            image_dir,
            workers,
        } => {
            let streams = config::resolve_streams(image_dir, file_config.image_dir.clone());
            if streams.is_empty() {
                return Err(streamcat::Error::Config(
                    "at least one --image-dir is required".to_string(),
                ));
            }
            let build_config = streamcat::BuildConfig {
                root,
                stream_version,
                streams,
                workers: config::resolve(workers, file_config.workers)
                    .unwrap_or_else(streamcat::WorkerPool::default_worker_count),
            };
            streamcat::build::run(&build_config, cancel).await?;
        }
        Command::Prune {
            root,
            stream_version,
            image_dir,
            retain,
            dangling,
        } => {
            let streams = config::resolve_streams(image_dir, file_config.image_dir.clone());
            if streams.is_empty() {
                return Err(streamcat::Error::Config(
                    "at least one --image-dir is required".to_string(),
                ));
            }
            let prune_config = streamcat::PruneConfig {
                root,
                stream_version,
                streams,
                retain: config::resolve(retain, file_config.retain),
                dangling: dangling || file_config.dangling.unwrap_or(false),
            };
            if let Some(retain) = prune_config.retain {
                streamcat::prune::retention_prune(&prune_config, retain).await?;
            }
            if prune_config.dangling {
                streamcat::prune::dangling_prune(&prune_config).await?;
            }
            streamcat::prune::sweep_empty_dirs(&prune_config.root, true).await?;
        }
    }

    Ok(())
}
