mod cache;
mod config;
mod error;
mod logging;
mod routes;
mod service;
mod storage;
mod types;

use anyhow::Context;
use cache::{CacheSettings, PopularityCache};
use clap::Parser;
use config::{Args, Config};
use routes::AppState;
use service::SearchService;
use std::sync::Arc;
use storage::{MemoryStore, SearchStore};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_ref())?;
    logging::setup_logging(&config, args.tracing);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting search history service");

    let settings = CacheSettings::from(&config.cache);
    if settings.stale_threshold < settings.refresh_interval {
        tracing::warn!(
            stale_threshold = ?settings.stale_threshold,
            refresh_interval = ?settings.refresh_interval,
            "stale threshold is shorter than the refresh interval, reads will trigger extra refreshes"
        );
    }
    tracing::info!(
        capacity = settings.capacity,
        window = ?settings.window,
        refresh_interval = ?settings.refresh_interval,
        stale_threshold = ?settings.stale_threshold,
        "popularity cache configured"
    );

    let store: Arc<dyn SearchStore> = Arc::new(MemoryStore::new());
    let cache = PopularityCache::new(Arc::clone(&store), settings);
    let service = Arc::new(SearchService::new(store, cache));

    // Warm-up happens before the listener binds so the first reads hit a populated cache.
    let shutdown = CancellationToken::new();
    let background = service.start(&config.storage, shutdown.clone()).await;

    let app = routes::router(AppState { service });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server failed")?;

    shutdown.cancel();
    let drain = join_background(background);
    if tokio::time::timeout(config.shutdown_timeout(), drain)
        .await
        .is_err()
    {
        tracing::warn!("background tasks did not stop in time");
    }

    tracing::info!("Search history service stopped");
    Ok(())
}

async fn join_background(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "background task panicked");
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM, or when something else cancels `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
