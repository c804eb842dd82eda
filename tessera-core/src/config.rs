//! Configuration types

use std::path::PathBuf;

use crate::ConfigError;

/// Default history grid resolution in map units per cell.
pub const DEFAULT_HISTORY_RESOLUTION: u16 = 4;

/// Configuration of the offline rebuild and the artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Directory holding render data, histories and the cache package.
    pub cache_root: PathBuf,
    /// Map units per history cell.
    pub history_resolution: u16,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("cache"),
            history_resolution: DEFAULT_HISTORY_RESOLUTION,
        }
    }
}

impl RenderConfig {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }

    /// Create RenderConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TESSERA_CACHE_ROOT`: artifact directory (default: `cache`)
    /// - `TESSERA_HISTORY_RESOLUTION`: map units per history cell (default: 4)
    pub fn from_env() -> Result<Self, ConfigError> {
        let cache_root = std::env::var("TESSERA_CACHE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("cache"));

        let history_resolution = match std::env::var("TESSERA_HISTORY_RESOLUTION") {
            Ok(raw) => parse_resolution(&raw)?,
            Err(_) => DEFAULT_HISTORY_RESOLUTION,
        };

        Ok(Self {
            cache_root,
            history_resolution,
        })
    }
}

fn parse_resolution(raw: &str) -> Result<u16, ConfigError> {
    match raw.trim().parse::<u16>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            field: "TESSERA_HISTORY_RESOLUTION".to_string(),
            value: raw.to_string(),
            reason: "must be a positive integer".to_string(),
        }),
    }
}
