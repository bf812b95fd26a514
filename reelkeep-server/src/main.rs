//! # reelkeep
//!
//! Media library daemon. Probes the configured library roots, registers new
//! files and enriches them with TMDB metadata, either once or on a schedule.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use reelkeep_core::{
    ActivationReport, InMemoryStore, Library, LibraryManager, PostgresStore, RecordStore,
    TmdbCatalog, spawn_refresh_loop,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, ConfigLoader};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "reelkeep")]
#[command(about = "Scans media libraries and matches them against TMDB")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before the environment is read
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Run a single activation and exit
    #[arg(long)]
    once: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    let config = loader.load().context("failed to load configuration")?;

    init_tracing(cli.verbose || config.server.verbose);
    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    match &config.metadata.config_path {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => warn!("No reelkeep.toml found; using defaults and environment variables"),
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads.max(1))
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run(config, cli.once))
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "debug,reelkeep_core=debug,sqlx=warn"
    } else {
        "info,reelkeep_core=info,sqlx=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    let Some(url) = &config.database.url else {
        warn!("No DATABASE_URL configured; records are kept in memory and lost on exit");
        return Ok(Arc::new(InMemoryStore::new()));
    };

    let store = PostgresStore::connect(url, config.database.max_connections)
        .await
        .context("failed to connect to PostgreSQL")?;
    store
        .migrate()
        .await
        .context("database migration failed")?;
    Ok(Arc::new(store))
}

async fn seed_libraries(manager: &LibraryManager, config: &Config) -> anyhow::Result<()> {
    for library in &config.libraries {
        manager
            .ensure_library(Library::new(&library.name, &library.path, library.kind))
            .await
            .with_context(|| format!("failed to register library {}", library.name))?;
    }

    if let Some(dir) = &config.default_media_dir
        && let Some(library) = manager
            .seed_default_library(dir)
            .await
            .context("failed to register default media directory")?
    {
        info!(library = %library.name, "Created default library");
    }

    if manager.libraries().await?.is_empty() {
        warn!("No libraries configured; add [[libraries]] or set REELKEEP_MEDIA_DIR");
    }
    Ok(())
}

fn log_report(report: &ActivationReport) {
    for outcome in &report.outcomes {
        let name = &outcome.library.name;
        match &outcome.scan {
            Ok(summary) => info!(
                library = %name,
                created = summary.created,
                existing = summary.existing,
                unparsed = summary.unparsed,
                "scan summary"
            ),
            Err(err) => error!(library = %name, "scan failed: {}", err),
        }
        match &outcome.reconcile {
            Ok(reconcile) => info!(
                library = %name,
                matched = reconcile.matched(),
                unmatched = reconcile.unmatched,
                failed = reconcile.failed,
                "reconcile summary"
            ),
            Err(err) => error!(library = %name, "reconcile failed: {}", err),
        }
    }
}

async fn run(config: Config, once: bool) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    info!(backend = store.backend_name(), "Record store ready");

    let api_key = config.catalog.api_key.clone().unwrap_or_else(|| {
        warn!("TMDB_API_KEY is not set; catalog lookups will fail");
        String::new()
    });
    let catalog = TmdbCatalog::new(api_key, config.catalog.tmdb_options())
        .context("failed to build TMDB client")?;

    let manager = Arc::new(LibraryManager::new(
        store,
        Arc::new(catalog),
        config.core.clone(),
    ));
    seed_libraries(&manager, &config).await?;

    if once {
        let report = manager.activate_all().await.context("activation failed")?;
        log_report(&report);
        manager.shutdown().await;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let (refresh, refresh_task) = spawn_refresh_loop(
        Arc::clone(&manager),
        config.schedule.interval,
        config.schedule.run_on_start,
        cancel.clone(),
    );
    match config.schedule.interval {
        Some(interval) => info!(
            "Refreshing libraries every {}",
            humantime::format_duration(interval)
        ),
        None => info!("No refresh interval configured; send SIGHUP to refresh"),
    }

    wait_for_signals(&refresh).await;

    info!("Shutting down");
    cancel.cancel();
    if let Err(err) = refresh_task.await {
        error!("Refresh loop ended abnormally: {}", err);
    }
    manager.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signals(refresh: &reelkeep_core::RefreshHandle) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!("Cannot listen for SIGHUP: {}", err);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return,
            _ = hangup.recv() => {
                info!("SIGHUP received, refreshing libraries");
                refresh.request();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_refresh: &reelkeep_core::RefreshHandle) {
    let _ = tokio::signal::ctrl_c().await;
}
