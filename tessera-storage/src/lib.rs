//! Tessera Storage - Histories, Artifacts and Caches
//!
//! Persistence for everything the rebuild produces and the tile server reads:
//!
//! - [`history`]: per-cell update history grids and their binary format
//! - [`artifacts`]: the on-disk layout of one cache root, atomic writes
//! - [`package`]: the per-generation snapshot shipped to tile servers
//! - [`render_cache`]: generation-checked in-memory render data
//! - [`cache`]: the byte cache shared between tile server workers

pub mod artifacts;
pub mod cache;
pub mod history;
pub mod package;
pub mod render_cache;

pub use artifacts::{write_atomic, ArtifactStore, HistoryVariant};
pub use cache::{
    CacheStats, InMemorySharedCache, LmdbCacheError, LmdbSharedCache, SharedCache,
    PACKAGE_POINTER_KEY,
};
pub use history::{RasterHistoryGrid, MAX_UPDATES};
pub use package::{CachePackage, LevelPackage};
pub use render_cache::{GenerationSource, RenderDataCache};
