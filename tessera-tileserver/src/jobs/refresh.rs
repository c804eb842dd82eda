//! Cache package refresh.
//!
//! At startup the proxy cannot serve anything until one package arrived, so
//! the first download is retried with a capped exponential backoff. After
//! that a background task polls upstream on a fixed interval; failures are
//! logged and the previous package stays active.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::loader::{LoadOutcome, PackageLoader};
use crate::package_state::LoadedPackage;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Delay before the retry following one that waited `current`.
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Retry until the first package is stored, then return it.
pub async fn wait_for_initial_package(loader: &mut PackageLoader) -> LoadedPackage {
    let mut wait = INITIAL_BACKOFF;
    loop {
        match loader.load_initial().await {
            Ok(loaded) => {
                tracing::info!("Cache package successfully loaded");
                return loaded;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cache package download failed");
            }
        }
        tracing::info!(retry_in_secs = wait.as_secs(), "Retrying cache package download");
        tokio::time::sleep(wait).await;
        wait = next_backoff(wait);
    }
}

/// Counters for the refresh task.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    pub attempts: AtomicU64,
    pub updates: AtomicU64,
    pub failures: AtomicU64,
}

/// Poll upstream every `reload_interval` until shutdown is signalled.
pub async fn package_refresh_task(
    mut loader: PackageLoader,
    reload_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<RefreshMetrics> {
    let metrics = Arc::new(RefreshMetrics::default());

    let mut ticker = interval_at(Instant::now() + reload_interval, reload_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        reload_interval_secs = reload_interval.as_secs(),
        "Cache package refresh task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Cache package refresh task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                metrics.attempts.fetch_add(1, Ordering::Relaxed);
                match loader.load().await {
                    Ok(LoadOutcome::Updated(_)) => {
                        metrics.updates.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(LoadOutcome::Unchanged) => {}
                    Err(e) => {
                        metrics.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = %e, "Cache package refresh failed, keeping current package");
                    }
                }
            }
        }
    }

    tracing::info!(
        attempts = metrics.attempts.load(Ordering::Relaxed),
        updates = metrics.updates.load(Ordering::Relaxed),
        failures = metrics.failures.load(Ordering::Relaxed),
        "Cache package refresh task completed"
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use tessera_core::tiles::TileCoord;
    use tessera_storage::{InMemorySharedCache, SharedCache};

    use crate::upstream::{PackageFetch, Upstream, UpstreamError, UpstreamResponse};

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut wait = INITIAL_BACKOFF;
        let mut seen = vec![wait.as_secs()];
        for _ in 0..5 {
            wait = next_backoff(wait);
            seen.push(wait.as_secs());
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 10, 10]);
    }

    struct CountingUpstream {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Upstream for CountingUpstream {
        async fn fetch_package(&self, _: Option<&str>) -> Result<PackageFetch, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(UpstreamError::Transport("connection refused".to_string()))
        }

        async fn fetch_tile(&self, _: &TileCoord, _: &str) -> Result<UpstreamResponse, UpstreamError> {
            Err(UpstreamError::Status(500))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_counts_failures_and_stops() {
        let upstream = Arc::new(CountingUpstream {
            calls: AtomicUsize::new(0),
        });
        let cache: Arc<dyn SharedCache> = Arc::new(InMemorySharedCache::new());
        let loader = PackageLoader::new(upstream.clone(), cache, PathBuf::from("unused"));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(package_refresh_task(loader, Duration::from_secs(60), shutdown_rx));
        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown_tx.send(true).expect("task is listening");

        let metrics = task.await.expect("task should finish");
        assert_eq!(metrics.attempts.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.failures.load(Ordering::Relaxed), 2);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    }
}
