//! Tessera Core - Shared Types
//!
//! Pure data structures shared by the history store, the compositor and the
//! tile server. Only small, dependency-free behaviour lives here (tile math,
//! cache key derivation, geometry helpers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod config;
pub mod error;
pub mod geometry;
pub mod level;
pub mod tiles;

pub use config::RenderConfig;
pub use error::{
    ConfigError, GeometryError, HistoryError, StorageError, TesseraError, TesseraResult,
};
pub use geometry::{empty_area, is_empty, union_all, validate_area, Area, Bounds};
pub use level::{
    AltitudeArea, HeightArea, LevelGeometrySet, LevelInfo, LevelMesh, RenderData,
};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier of a map level (floor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelId(pub u32);

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an access restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestrictionId(pub u32);

impl fmt::Display for RestrictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// UPDATES
// ============================================================================

/// One committed content change.
///
/// Updates are totally ordered by id; the timestamp only breaks ties between
/// records that were (incorrectly) issued with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Update {
    pub id: u32,
    /// Unix seconds.
    pub timestamp: u32,
}

impl Update {
    pub fn new(id: u32, timestamp: u32) -> Self {
        Self { id, timestamp }
    }

    /// The commit time as a UTC datetime.
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(i64::from(self.timestamp), 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Cache key for content produced by this update.
    pub fn cache_key(&self) -> GenerationKey {
        GenerationKey::from_update(self)
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.id, self.timestamp)
    }
}

/// Token identifying a generation of published artifacts.
///
/// Derived from the latest processed update, so two processes that saw the
/// same update agree on the key without coordination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationKey(String);

impl GenerationKey {
    pub fn from_update(update: &Update) -> Self {
        Self(format!(
            "{}_{}",
            to_base36(u64::from(update.id)),
            to_base36(u64::from(update.timestamp))
        ))
    }

    /// Wrap a key read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

// ============================================================================
// TESTS
// ============================================================================
