//! Tessera Tile Server - Caching Tile Proxy
//!
//! Serves map tiles from a host-wide shared cache and asks the upstream
//! renderer only for tiles it has not seen. What a tile looks like depends on
//! the newest update that touched it and on the access restrictions the
//! visitor may see; both go into the tile's ETag, so cached bytes never go
//! stale and browsers can revalidate cheaply.
//!
//! Which updates touched which tile comes from the cache package, downloaded
//! from upstream and refreshed in the background by [`jobs`].

pub mod config;
pub mod error;
pub mod jobs;
pub mod loader;
pub mod package_state;
pub mod routes;
pub mod telemetry;
pub mod upstream;

use std::sync::Arc;

use axum::Router;
use tessera_storage::SharedCache;
use tower_http::trace::TraceLayer;

pub use config::ProxyConfig;
pub use error::{ErrorCode, ProxyError, ServerError};
pub use loader::{LoadError, LoadOutcome, PackageLoader};
pub use package_state::{LoadedPackage, PackageState};
pub use upstream::{HttpUpstream, PackageFetch, Upstream, UpstreamError, UpstreamResponse};

/// Shared handler state; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub packages: Arc<PackageState>,
    pub cache: Arc<dyn SharedCache>,
    pub upstream: Arc<dyn Upstream>,
    pub tile_secret: Arc<str>,
}

impl AppState {
    pub fn new(
        packages: Arc<PackageState>,
        cache: Arc<dyn SharedCache>,
        upstream: Arc<dyn Upstream>,
        tile_secret: &str,
    ) -> Self {
        Self {
            packages,
            cache,
            upstream,
            tile_secret: Arc::from(tile_secret),
        }
    }
}

/// Router answering every path with the tile handler.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(routes::serve_tile)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
