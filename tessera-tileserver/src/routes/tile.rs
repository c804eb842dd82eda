//! Tile Endpoint
//!
//! `GET /{level}/{zoom}/{x}/{y}.png`
//!
//! Tiles are identified by an ETag derived from the newest update that
//! touched the tile and from the visible access restrictions. Unchanged tiles
//! are answered with 304, known ones from the shared cache, and everything
//! else is fetched from the renderer.

use std::collections::BTreeSet;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use tessera_core::tiles::{
    build_access_cache_key, build_base_cache_key, build_tile_etag, parse_tile_access_cookie, TileCoord,
};
use tessera_core::{LevelId, RestrictionId};

use crate::error::{http_date, ProxyError};
use crate::AppState;

/// Name of the cookie carrying signed access permissions.
pub const ACCESS_COOKIE: &str = "tessera_tile_access";

static TILE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(\d+)/(-?\d+)/(-?\d+)/(-?\d+)\.png$").expect("Invalid tile path regex")
});

static ACCESS_COOKIE_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r#"(^| ){}="?([^;" ]+)"?"#, ACCESS_COOKIE)).expect("Invalid access cookie regex")
});

// ============================================================================
// PARSING
// ============================================================================

/// Tile address from a request path.
pub fn parse_tile_path(path: &str) -> Result<TileCoord, ProxyError> {
    let captures = TILE_PATH.captures(path).ok_or_else(ProxyError::invalid_tile_path)?;
    let field = |i: usize| captures.get(i).map(|m| m.as_str()).unwrap_or_default();
    let parsed = (
        field(1).parse::<u32>(),
        field(2).parse::<i32>(),
        field(3).parse::<i64>(),
        field(4).parse::<i64>(),
    );
    match parsed {
        (Ok(level), Ok(zoom), Ok(x), Ok(y)) => Ok(TileCoord {
            level: LevelId(level),
            zoom,
            x,
            y,
        }),
        _ => Err(ProxyError::invalid_tile_path()),
    }
}

/// Raw access cookie value from a `Cookie` header.
pub fn access_cookie(cookie_header: &str) -> Option<&str> {
    ACCESS_COOKIE_VALUE
        .captures(cookie_header)
        .and_then(|captures| captures.get(2))
        .map(|m| m.as_str())
}

// ============================================================================
// HANDLER
// ============================================================================

pub async fn serve_tile(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    match tile_response(&state, uri.path(), &headers).await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(path = uri.path(), code = %err.code, "Tile request rejected");
            err.into_response()
        }
    }
}

async fn tile_response(state: &AppState, path: &str, headers: &HeaderMap) -> Result<Response, ProxyError> {
    let coord = parse_tile_path(path)?;
    if !coord.zoom_supported() {
        return Err(ProxyError::zoom_out_of_bounds());
    }

    let loaded = state.packages.current().await;
    let level = loaded.level(coord.level).ok_or_else(ProxyError::invalid_level)?;
    let bounds = coord.bounds();
    if !loaded.package().bounds_valid(coord.level, &bounds) {
        return Err(ProxyError::coordinates_out_of_bounds());
    }

    let last_update = level
        .history
        .last_update(bounds.minx, bounds.miny, bounds.maxx, bounds.maxy);
    let base_cache_key = build_base_cache_key(&last_update);

    let permissions: BTreeSet<RestrictionId> = match headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(access_cookie)
    {
        Some(cookie) => {
            let granted = parse_tile_access_cookie(cookie, &state.tile_secret, chrono::Utc::now().timestamp());
            let touching = loaded.restrictions_touching(coord.level, &bounds);
            granted.intersection(&touching).copied().collect()
        }
        None => BTreeSet::new(),
    };
    let access_cache_key = build_access_cache_key(&permissions);

    let etag = build_tile_etag(&coord, &base_cache_key, &access_cache_key, &state.tile_secret);
    let if_none_match = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok());
    if if_none_match == Some(etag.as_str()) {
        return Ok(not_modified(&etag));
    }

    let cache_key = format!("{}_{}", path, etag);
    match state.cache.get(&cache_key).await {
        Ok(Some(bytes)) => return Ok(deliver_tile(&etag, bytes)),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Tile cache read failed"),
    }

    let upstream = state
        .upstream
        .fetch_tile(&coord, &access_cache_key)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, level_id = %coord.level, zoom = coord.zoom, "Tile fetch failed");
            ProxyError::upstream_unavailable()
        })?;

    if upstream.is_png() {
        if let Err(e) = state.cache.set(&cache_key, &upstream.body).await {
            tracing::warn!(error = %e, "Tile cache write failed");
        }
        return Ok(deliver_tile(&etag, upstream.body));
    }

    tracing::debug!(status = upstream.status, level_id = %coord.level, "Relaying upstream response");
    Ok(relay(upstream.status, upstream.content_type, upstream.body))
}

// ============================================================================
// RESPONSES
// ============================================================================

fn deliver_tile(etag: &str, data: Vec<u8>) -> Response {
    let length = data.len().to_string();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::DATE, http_date())
        .header(header::CONTENT_TYPE, "image/png")
        .header(header::CONTENT_LENGTH, length)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::ETAG, etag)
        .body(Body::from(data))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn not_modified(etag: &str) -> Response {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(header::DATE, http_date())
        .header(header::CONTENT_LENGTH, "0")
        .header(header::ETAG, etag)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn relay(status: u16, content_type: Option<String>, body: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    let length = body.len().to_string();
    Response::builder()
        .status(status)
        .header(header::DATE, http_date())
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_TYPE,
            content_type.unwrap_or_else(|| "text/plain".to_string()),
        )
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
