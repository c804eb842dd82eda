//! Upstream renderer client.
//!
//! The proxy talks to the renderer for two things: the cache package and tiles
//! it has not cached yet. Both requests carry the tile secret.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use tessera_core::tiles::TileCoord;

/// Header authenticating the proxy towards the renderer.
pub const TILE_SECRET_HEADER: &str = "X-Tile-Secret";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream rejected the tile secret")]
    Forbidden,

    #[error("Upstream answered with status {0}")]
    Status(u16),

    #[error("Upstream request failed: {0}")]
    Transport(String),
}

/// Outcome of a conditional package download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageFetch {
    NotModified,
    Fetched { bytes: Vec<u8>, etag: Option<String> },
}

/// A tile response, successful or not, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// A cacheable rendered tile.
    pub fn is_png(&self) -> bool {
        self.status == 200 && self.content_type.as_deref() == Some("image/png")
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Download the cache package unless it still matches `etag`.
    async fn fetch_package(&self, etag: Option<&str>) -> Result<PackageFetch, UpstreamError>;

    /// Render one tile for the given access key.
    async fn fetch_tile(&self, coord: &TileCoord, access_key: &str) -> Result<UpstreamResponse, UpstreamError>;
}

/// Renderer reached over HTTP.
pub struct HttpUpstream {
    client: reqwest::Client,
    base: String,
    secret_header: String,
}

impl HttpUpstream {
    pub fn new(base: &str, tile_secret: &str) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            secret_header: STANDARD.encode(tile_secret.as_bytes()),
        })
    }

    pub fn package_url(&self) -> String {
        format!("{}/map/cache/package.tar.xz", self.base)
    }

    pub fn tile_url(&self, coord: &TileCoord, access_key: &str) -> String {
        format!(
            "{}/map/{}/{}/{}/{}/{}.png",
            self.base, coord.level, coord.zoom, coord.x, coord.y, access_key
        )
    }
}

fn transport(e: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport(e.to_string())
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch_package(&self, etag: Option<&str>) -> Result<PackageFetch, UpstreamError> {
        let mut request = self
            .client
            .get(self.package_url())
            .header(TILE_SECRET_HEADER, &self.secret_header);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = request.send().await.map_err(transport)?;

        match response.status() {
            StatusCode::FORBIDDEN => return Err(UpstreamError::Forbidden),
            StatusCode::NOT_MODIFIED => return Ok(PackageFetch::NotModified),
            status if !status.is_success() => return Err(UpstreamError::Status(status.as_u16())),
            _ => {}
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(transport)?.to_vec();
        Ok(PackageFetch::Fetched { bytes, etag })
    }

    async fn fetch_tile(&self, coord: &TileCoord, access_key: &str) -> Result<UpstreamResponse, UpstreamError> {
        let response = self
            .client
            .get(self.tile_url(coord, access_key))
            .header(TILE_SECRET_HEADER, &self.secret_header)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(transport)?.to_vec();
        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
