//! Tile endpoint behaviour against an in-memory cache and a scripted upstream.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tessera_core::tiles::{build_tile_access_cookie, TileCoord};
use tessera_core::{GenerationKey, LevelId, RenderData, RestrictionId, Update};
use tessera_storage::{CachePackage, InMemorySharedCache, RasterHistoryGrid, SharedCache, PACKAGE_POINTER_KEY};
use tessera_test_utils::fixtures::rect;
use tessera_tileserver::{
    create_router, AppState, LoadedPackage, PackageFetch, PackageState, Upstream, UpstreamError,
    UpstreamResponse,
};
use tower::ServiceExt;

const SECRET: &str = "a tile secret that is comfortably longer than 26 characters";
const TILE: &str = "/1/0/0/-1.png";
const PNG: &[u8] = b"\x89PNG fake tile";

// ============================================================================
// FAKE UPSTREAM
// ============================================================================

struct FakeUpstream {
    tile: Mutex<Result<UpstreamResponse, UpstreamError>>,
    requests: Mutex<Vec<(TileCoord, String)>>,
}

impl FakeUpstream {
    fn new(tile: Result<UpstreamResponse, UpstreamError>) -> Arc<Self> {
        Arc::new(Self {
            tile: Mutex::new(tile),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn png() -> Arc<Self> {
        Self::new(Ok(UpstreamResponse {
            status: 200,
            content_type: Some("image/png".to_string()),
            body: PNG.to_vec(),
        }))
    }

    fn access_keys(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("lock")
            .iter()
            .map(|(_, access)| access.clone())
            .collect()
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch_package(&self, _: Option<&str>) -> Result<PackageFetch, UpstreamError> {
        Ok(PackageFetch::NotModified)
    }

    async fn fetch_tile(&self, coord: &TileCoord, access_key: &str) -> Result<UpstreamResponse, UpstreamError> {
        self.requests
            .lock()
            .expect("lock")
            .push((*coord, access_key.to_string()));
        self.tile.lock().expect("lock").clone()
    }
}

// ============================================================================
// SETUP
// ============================================================================

struct Harness {
    _dir: TempDir,
    router: Router,
    upstream: Arc<FakeUpstream>,
    cache: Arc<dyn SharedCache>,
}

async fn harness(upstream: Arc<FakeUpstream>) -> Harness {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let generation = GenerationKey::from_raw("2_2");

    let mut history = RasterHistoryGrid::new(4, Update::new(1, 1)).expect("valid resolution");
    history
        .add_geometry(&rect(0.0, 0.0, 100.0, 100.0), Update::new(2, 2))
        .expect("add should succeed");
    let mut restricted = BTreeMap::new();
    restricted.insert(RestrictionId(3), rect(10.0, 10.0, 20.0, 20.0));
    restricted.insert(RestrictionId(4), rect(1_000.0, 1_000.0, 1_010.0, 1_010.0));
    let data = RenderData {
        level_id: LevelId(1),
        generation: generation.clone(),
        levels: Vec::new(),
        access_restriction_affected: restricted,
        min_altitude: 0.0,
        max_altitude: 3.0,
    };
    let path = dir.path().join("package.bin");
    CachePackage::bundle(generation, vec![(data, history)])
        .save(&path)
        .expect("save should succeed");

    let cache: Arc<dyn SharedCache> = Arc::new(InMemorySharedCache::new());
    cache
        .set(PACKAGE_POINTER_KEY, path.display().to_string().as_bytes())
        .await
        .expect("set should succeed");
    let packages = Arc::new(PackageState::new(
        LoadedPackage::read(&path).expect("read should succeed"),
        cache.clone(),
    ));
    let state = AppState::new(packages, cache.clone(), upstream.clone(), SECRET);

    Harness {
        _dir: dir,
        router: create_router(state),
        upstream,
        cache,
    }
}

fn get(path: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(path)
}

async fn send(router: &Router, request: axum::http::request::Builder) -> Response<Body> {
    router
        .clone()
        .oneshot(request.body(Body::empty()).expect("request builds"))
        .await
        .expect("router is infallible")
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    String::from_utf8_lossy(&bytes).into_owned()
}

fn header_str<'a>(response: &'a Response<Body>, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

fn cookie(ids: &[u32]) -> String {
    let permissions: BTreeSet<RestrictionId> = ids.iter().copied().map(RestrictionId).collect();
    let expires = chrono::Utc::now().timestamp() + 3_600;
    let value = build_tile_access_cookie(&permissions, SECRET, expires).expect("cookie should sign");
    format!("session=abc; tessera_tile_access={}", value)
}

// ============================================================================
// REJECTIONS
// ============================================================================

#[tokio::test]
async fn test_rejections() {
    let h = harness(FakeUpstream::png()).await;
    for (path, body) in [
        ("/not/a/tile", "invalid tile path."),
        ("/1/0/0/-1.jpg", "invalid tile path."),
        ("/1/6/0/0.png", "zoom out of bounds."),
        ("/1/-3/0/0.png", "zoom out of bounds."),
        ("/9/0/0/-1.png", "invalid level."),
        ("/1/0/40/40.png", "coordinates out of bounds."),
    ] {
        let response = send(&h.router, get(path)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);
        assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("text/plain"));
        assert_eq!(body_text(response).await, body, "{}", path);
    }
    assert!(h.upstream.access_keys().is_empty());
}

// ============================================================================
// DELIVERY
// ============================================================================

#[tokio::test]
async fn test_miss_then_cache_hit() {
    let h = harness(FakeUpstream::png()).await;

    let first = send(&h.router, get(TILE)).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_str(&first, header::CONTENT_TYPE), Some("image/png"));
    assert_eq!(header_str(&first, header::CACHE_CONTROL), Some("no-cache"));
    assert_eq!(
        header_str(&first, header::CONTENT_LENGTH),
        Some(PNG.len().to_string().as_str())
    );
    assert!(first.headers().contains_key(header::DATE));
    let etag = header_str(&first, header::ETAG).expect("etag is set").to_string();
    assert!(etag.starts_with('"') && etag.ends_with('"'));
    assert_eq!(body_text(first).await.as_bytes(), PNG);

    let cached = h
        .cache
        .get(&format!("{}_{}", TILE, etag))
        .await
        .expect("get should succeed");
    assert_eq!(cached.as_deref(), Some(PNG));

    let second = send(&h.router, get(TILE)).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header_str(&second, header::ETAG), Some(etag.as_str()));
    assert_eq!(h.upstream.access_keys(), vec!["0".to_string()]);
}

#[tokio::test]
async fn test_matching_etag_is_not_modified() {
    let h = harness(FakeUpstream::png()).await;
    let first = send(&h.router, get(TILE)).await;
    let etag = header_str(&first, header::ETAG).expect("etag is set").to_string();

    let response = send(&h.router, get(TILE).header(header::IF_NONE_MATCH, &etag)).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("0"));
    assert_eq!(header_str(&response, header::ETAG), Some(etag.as_str()));
    assert!(response.headers().contains_key(header::DATE));
    assert!(body_text(response).await.is_empty());

    let stale = send(&h.router, get(TILE).header(header::IF_NONE_MATCH, "\"stale\"")).await;
    assert_eq!(stale.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_access_key_only_counts_visible_restrictions() {
    let h = harness(FakeUpstream::png()).await;

    let granted = send(&h.router, get(TILE).header(header::COOKIE, cookie(&[3, 4]))).await;
    assert_eq!(granted.status(), StatusCode::OK);
    let granted_etag = header_str(&granted, header::ETAG).map(str::to_string);

    let elsewhere = send(&h.router, get(TILE).header(header::COOKIE, cookie(&[4]))).await;
    assert_eq!(elsewhere.status(), StatusCode::OK);

    let forged = format!("tessera_tile_access=3:{}:AAAA", chrono::Utc::now().timestamp() + 60);
    let rejected = send(&h.router, get(TILE).header(header::COOKIE, forged)).await;
    assert_eq!(rejected.status(), StatusCode::OK);

    // R4 does not touch the tile and the forged cookie grants nothing, so
    // both share the public tile; only the first request needed R3.
    assert_eq!(h.upstream.access_keys(), vec!["3".to_string(), "0".to_string()]);
    assert_ne!(granted_etag, header_str(&rejected, header::ETAG).map(str::to_string));
}

// ============================================================================
// UPSTREAM FAILURES
// ============================================================================

#[tokio::test]
async fn test_upstream_errors_are_relayed_uncached() {
    let h = harness(FakeUpstream::new(Ok(UpstreamResponse {
        status: 503,
        content_type: None,
        body: b"renderer busy".to_vec(),
    })))
    .await;

    for _ in 0..2 {
        let response = send(&h.router, get(TILE)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("text/plain"));
        assert_eq!(body_text(response).await, "renderer busy");
    }
    assert_eq!(h.upstream.access_keys().len(), 2);
}

#[tokio::test]
async fn test_non_png_success_is_relayed() {
    let h = harness(FakeUpstream::new(Ok(UpstreamResponse {
        status: 200,
        content_type: Some("text/html".to_string()),
        body: b"<html>login</html>".to_vec(),
    })))
    .await;

    let response = send(&h.router, get(TILE)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("text/html"));
    assert!(header_str(&response, header::ETAG).is_none());
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let h = harness(FakeUpstream::new(Err(UpstreamError::Transport(
        "connection refused".to_string(),
    ))))
    .await;

    let response = send(&h.router, get(TILE)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
