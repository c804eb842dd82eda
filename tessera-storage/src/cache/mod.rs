//! Shared byte cache used by tile server workers.
//!
//! Rendered tiles are stored under `"{path}_{etag}"`, so a changed tile never
//! collides with its stale bytes and no invalidation pass is needed. The
//! active cache package is published under [`PACKAGE_POINTER_KEY`].

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbCacheError, LmdbSharedCache};
pub use memory::InMemorySharedCache;
pub use traits::{CacheStats, SharedCache};

/// Key holding the filename of the active cache package.
pub const PACKAGE_POINTER_KEY: &str = "cache_package_filename";
