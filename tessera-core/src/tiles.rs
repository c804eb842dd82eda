//! Tile addressing, cache keys and signed access cookies.
//!
//! These functions are shared by the tile server and whatever issues access
//! cookies upstream, so both sides must agree on every byte produced here.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::geometry::Bounds;
use crate::{LevelId, RestrictionId, Update};

type HmacSha256 = Hmac<Sha256>;

/// Supported zoom levels.
pub const ZOOM_RANGE: RangeInclusive<i32> = -2..=5;

/// Tile edge length in pixels.
pub const TILE_PIXELS: f64 = 256.0;

/// Number of secret characters mixed into tile etags.
const ETAG_SECRET_CHARS: usize = 26;

/// Address of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub level: LevelId,
    pub zoom: i32,
    pub x: i64,
    pub y: i64,
}

impl TileCoord {
    pub fn zoom_supported(&self) -> bool {
        ZOOM_RANGE.contains(&self.zoom)
    }

    pub fn bounds(&self) -> Bounds {
        tile_bounds(self.zoom, self.x, self.y)
    }
}

/// Map-unit rectangle covered by a tile.
///
/// Tiles overlap their neighbours by one pixel to the right and bottom so
/// browsers never show seams between them.
pub fn tile_bounds(zoom: i32, x: i64, y: i64) -> Bounds {
    let size = TILE_PIXELS / 2f64.powi(zoom);
    let minx = size * x as f64;
    let miny = size * (-y - 1) as f64;
    let maxx = minx + size;
    let maxy = miny + size;
    Bounds::new(minx, miny - size / TILE_PIXELS, maxx + size / TILE_PIXELS, maxy)
}

/// Content part of a tile cache key.
pub fn build_base_cache_key(last_update: &Update) -> String {
    last_update.cache_key().to_string()
}

/// Access part of a tile cache key: sorted ids joined by `-`, or `0`.
pub fn build_access_cache_key(permissions: &BTreeSet<RestrictionId>) -> String {
    if permissions.is_empty() {
        return "0".to_string();
    }
    permissions
        .iter()
        .map(|id| id.0.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Content identifier of a tile, used as ETag and byte-cache key suffix.
pub fn build_tile_etag(
    coord: &TileCoord,
    base_cache_key: &str,
    access_cache_key: &str,
    tile_secret: &str,
) -> String {
    let secret: String = tile_secret.chars().take(ETAG_SECRET_CHARS).collect();
    let material = format!(
        "{}-{}-{}-{}:{}:{}:{}",
        coord.level, coord.zoom, coord.x, coord.y, base_cache_key, access_cache_key, secret
    );
    let digest = Sha256::digest(material.as_bytes());
    format!("\"{}\"", STANDARD.encode(&digest[..15]))
}

fn cookie_mac(tile_secret: &str) -> Result<HmacSha256, InvalidLength> {
    let key = Sha256::digest(tile_secret.as_bytes());
    HmacSha256::new_from_slice(&key)
}

/// Issue a signed access cookie valid until `expires_at` (unix seconds).
pub fn build_tile_access_cookie(
    permissions: &BTreeSet<RestrictionId>,
    tile_secret: &str,
    expires_at: i64,
) -> Result<String, InvalidLength> {
    let ids = permissions
        .iter()
        .map(|id| id.0.to_string())
        .collect::<Vec<_>>()
        .join("-");
    let value = format!("{}:{}", ids, expires_at);
    let mut mac = cookie_mac(tile_secret)?;
    mac.update(value.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());
    Ok(format!("{}:{}", value, signature))
}

/// Decode an access cookie. Anything unexpected yields no permissions.
pub fn parse_tile_access_cookie(
    cookie: &str,
    tile_secret: &str,
    now: i64,
) -> BTreeSet<RestrictionId> {
    let mut parts = cookie.split(':');
    let (Some(ids), Some(expires), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return BTreeSet::new();
    };

    let Ok(signature) = STANDARD.decode(signature) else {
        return BTreeSet::new();
    };
    let Ok(mut mac) = cookie_mac(tile_secret) else {
        return BTreeSet::new();
    };
    mac.update(format!("{}:{}", ids, expires).as_bytes());
    if mac.verify_slice(&signature).is_err() {
        return BTreeSet::new();
    }

    match expires.parse::<i64>() {
        Ok(expires) if expires >= now => {}
        _ => return BTreeSet::new(),
    }

    let parsed: Result<BTreeSet<RestrictionId>, _> = ids
        .split('-')
        .filter(|id| !id.is_empty())
        .map(|id| id.parse::<u32>().map(RestrictionId))
        .collect();
    parsed.unwrap_or_default()
}
