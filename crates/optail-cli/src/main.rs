//! optail - command line replication log tailer
//!
//! Tails a JSON-lines oplog export, filters entries by namespace and logs
//! every insert, update and delete. Progress is checkpointed to a JSON file
//! under the given label so a restart resumes where the last run stopped.
//!
//! # Usage
//!
//! ```bash
//! # Tail all `orders.*` namespaces under label etl1
//! optail --source oplog.jsonl --filter 'orders.*' --label etl1
//!
//! # Same, configured from a file with JSON logs
//! optail -c optail.yaml --log-format json
//! ```

mod config;
mod handler;

use anyhow::{Context, Result};
use clap::Parser;
use optail::sources::JsonlLogSource;
use optail::{FileCheckpointStore, Tailer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Cli, FileConfig, LogFormat, Settings};
use handler::LoggingHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let file = match &cli.config {
        Some(path) => FileConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(&cli, file)?;

    run(settings).await
}

fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

async fn run(settings: Settings) -> Result<()> {
    info!(
        "Starting optail: source={} filter=[{}] label=[{}]",
        settings.source.display(),
        settings.tailer.filter_pattern,
        settings.tailer.label
    );

    let store = FileCheckpointStore::open(&settings.checkpoint_file)
        .await
        .with_context(|| {
            format!(
                "Failed to open checkpoint file {}",
                settings.checkpoint_file.display()
            )
        })?;

    let mut source = JsonlLogSource::new(&settings.source);
    if let Some(interval) = settings.poll_interval {
        source = source.with_poll_interval(interval);
    }

    let handler = LoggingHandler::new(settings.tailer.label.clone());
    info!("Logging changes for label [{}]", handler.label());
    let tailer = Tailer::new(
        settings.tailer,
        Arc::new(source),
        Arc::new(store),
        Arc::new(handler),
    )
    .await
    .context("Failed to start tailer")?;
    info!("Resuming after {}", tailer.checkpoint().position);

    let stats = tailer.stats();
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let outcome = tailer.run(cancel).await;
    info!("Final stats: {}", serde_json::to_string(&stats.snapshot())?);

    let checkpoint = outcome.context("Tailer terminated")?;
    info!("Stopped at {}", checkpoint.position);
    Ok(())
}
