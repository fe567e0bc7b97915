//! upc-process - UPC queue worker
//!
//! One batch pass: drain the ready queue while its lock is enabled, then exit.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upc_common::config::{TomlConfig, CONFIG_ENV_VAR};

use upc_process::executor::IsisExecutor;
use upc_process::queue::{QueueLock, SqliteQueueLock, SqliteWorkQueue, DEFAULT_LOCK, DEFAULT_QUEUE};
use upc_process::services::Persistence;
use upc_process::{QueueConsumer, UpcConfig};

/// Command-line arguments for upc-process
#[derive(Parser, Debug)]
#[command(name = "upc-process")]
#[command(about = "Process queued planetary images into the UPC database")]
#[command(version)]
struct Args {
    /// Bootstrap configuration file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Queue to drain
    #[arg(short, long, default_value = DEFAULT_QUEUE, env = "UPC_QUEUE")]
    queue: String,

    /// Lock gating the queue
    #[arg(short, long, default_value = DEFAULT_LOCK, env = "UPC_LOCK")]
    lock: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let bootstrap = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| upc_process::log_filter(&bootstrap.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting upc-process v{}", env!("CARGO_PKG_VERSION"));
    info!("UPC database: {}", bootstrap.upc_database.display());
    info!("PDS database: {}", bootstrap.pds_database.display());

    let upc_db = upc_common::db::init_upc_database(&bootstrap.upc_database)
        .await
        .context("Failed to open UPC database")?;
    let pds_db = upc_common::db::init_pds_database(&bootstrap.pds_database)
        .await
        .context("Failed to open PDS database")?;

    let config = UpcConfig::load(bootstrap, &upc_db)
        .await
        .context("Failed to load configuration documents")?;
    std::fs::create_dir_all(&config.bootstrap.workarea).with_context(|| {
        format!("Failed to create work area {}", config.bootstrap.workarea.display())
    })?;

    let queue = Arc::new(SqliteWorkQueue::new(pds_db.clone()));
    let lock = Arc::new(SqliteQueueLock::new(pds_db.clone(), args.lock.clone()));
    lock.register(&args.queue)
        .await
        .context("Failed to register queue with lock")?;

    let executor = Arc::new(IsisExecutor::new(config.bootstrap.isis_bin.clone()));
    let consumer = QueueConsumer::new(
        queue,
        lock,
        executor,
        Persistence::new(upc_db.clone(), pds_db.clone()),
        Arc::new(config),
        args.queue.clone(),
    );

    let stats = consumer.drain().await.context("Queue service failed")?;

    upc_db.close().await;
    pds_db.close().await;

    info!(
        queue = %args.queue,
        lock = %args.lock,
        "UPC processing exited successfully: {}",
        stats.display_string()
    );
    Ok(())
}
