//! Tile Server Configuration
//!
//! Loaded once at startup from environment variables. Missing or unreadable
//! required settings are fatal.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tessera_core::ConfigError;

/// Default seconds between cache package refreshes.
pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 60;

/// Default LMDB map size for the shared tile cache.
pub const DEFAULT_CACHE_SIZE_MB: usize = 512;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Renderer base URL, without trailing slash.
    pub upstream_base: String,
    /// Where downloaded cache packages and the tile cache live.
    pub data_dir: PathBuf,
    /// Shared with the renderer; signs cookies and authenticates upstream.
    pub tile_secret: String,
    pub reload_interval: Duration,
    pub bind: SocketAddr,
    pub cache_size_mb: usize,
}

impl ProxyConfig {
    /// Create ProxyConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `TESSERA_UPSTREAM_BASE`: renderer base URL (required)
    /// - `TESSERA_DATA_DIR`: data directory (default: `data`)
    /// - `TESSERA_TILE_SECRET` or `TESSERA_TILE_SECRET_FILE`: tile secret (one required)
    /// - `TESSERA_RELOAD_INTERVAL`: seconds between package refreshes (default: 60)
    /// - `TESSERA_BIND`: listen host (default: `0.0.0.0`)
    /// - `PORT`: listen port (default: 8000)
    /// - `TESSERA_CACHE_SIZE_MB`: shared tile cache budget (default: 512)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let upstream_base = var("TESSERA_UPSTREAM_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "TESSERA_UPSTREAM_BASE".to_string(),
            })?;

        let data_dir = var("TESSERA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        let tile_secret = match var("TESSERA_TILE_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => read_secret_file(var("TESSERA_TILE_SECRET_FILE"))?,
        };

        let reload_interval = Duration::from_secs(positive(
            "TESSERA_RELOAD_INTERVAL",
            parse_or(
                "TESSERA_RELOAD_INTERVAL",
                var("TESSERA_RELOAD_INTERVAL"),
                DEFAULT_RELOAD_INTERVAL_SECS,
            )?,
        )?);

        let cache_size_mb = positive(
            "TESSERA_CACHE_SIZE_MB",
            parse_or(
                "TESSERA_CACHE_SIZE_MB",
                var("TESSERA_CACHE_SIZE_MB"),
                DEFAULT_CACHE_SIZE_MB,
            )?,
        )?;

        let host = var("TESSERA_BIND").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = var("PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
        let addr = format!("{}:{}", host, port);
        let bind = addr.parse::<SocketAddr>().map_err(|e| ConfigError::InvalidValue {
            field: "TESSERA_BIND/PORT".to_string(),
            value: addr.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            upstream_base,
            data_dir,
            tile_secret,
            reload_interval,
            bind,
            cache_size_mb,
        })
    }

    /// Directory of the LMDB tile cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("tile-cache")
    }
}

fn read_secret_file(path: Option<String>) -> Result<String, ConfigError> {
    let path = path.ok_or_else(|| ConfigError::MissingRequired {
        field: "TESSERA_TILE_SECRET or TESSERA_TILE_SECRET_FILE".to_string(),
    })?;
    let secret = std::fs::read_to_string(&path).map_err(|e| ConfigError::Unreadable {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(secret.trim().to_string())
}

fn parse_or<T: std::str::FromStr>(field: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw,
            reason: "not a valid number".to_string(),
        }),
    }
}

fn positive<T: PartialOrd + Default + ToString>(field: &str, value: T) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        })
    }
}
