//! Tile server entry point.
//!
//! Loads configuration, waits for a first cache package, then serves tiles
//! while a background task keeps the package current.

use std::sync::Arc;

use tessera_core::TesseraError;
use tessera_storage::{LmdbSharedCache, SharedCache};
use tessera_tileserver::jobs::{package_refresh_task, wait_for_initial_package};
use tessera_tileserver::telemetry::init_tracing;
use tessera_tileserver::{
    create_router, AppState, HttpUpstream, PackageLoader, PackageState, ProxyConfig, ServerError,
    Upstream,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    init_tracing()?;

    let config = ProxyConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let cache: Arc<dyn SharedCache> = Arc::new(
        LmdbSharedCache::new(config.cache_dir(), config.cache_size_mb).map_err(TesseraError::from)?,
    );
    let upstream: Arc<dyn Upstream> =
        Arc::new(HttpUpstream::new(&config.upstream_base, &config.tile_secret)?);

    let mut loader = PackageLoader::new(upstream.clone(), cache.clone(), config.data_dir.clone());
    let initial = wait_for_initial_package(&mut loader).await;
    let packages = Arc::new(PackageState::new(initial, cache.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh = tokio::spawn(package_refresh_task(loader, config.reload_interval, shutdown_rx));

    let app = create_router(AppState::new(packages, cache, upstream, &config.tile_secret));
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, upstream = %config.upstream_base, "Starting tile server");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = refresh.await {
        tracing::warn!(error = %e, "Refresh task ended abnormally");
    }
    Ok(())
}
