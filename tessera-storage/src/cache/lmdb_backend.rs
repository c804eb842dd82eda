//! LMDB-backed shared cache.
//!
//! Uses the heed crate (Rust bindings for LMDB): a memory-mapped key-value
//! store that several processes can open at the same path. Tile server
//! workers on one host share rendered tiles and the package pointer this way.
//!
//! # Size Bound
//!
//! The environment's map size is the cache budget. When a write hits the
//! limit every tile is dropped and the write retried once; tiles are cheap
//! to fetch again. The package pointer survives the reset.
//!
//! # Thread Safety
//!
//! - Read transactions for `get`
//! - Write transactions for `set`
//! - Statistics behind an `RwLock`
//!
//! heed refuses to open one path twice in a process, so each process keeps a
//! single `LmdbSharedCache` and shares it.

use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, MdbError};
use tessera_core::TesseraResult;

use super::traits::{CacheStats, SharedCache};
use super::PACKAGE_POINTER_KEY;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for tessera_core::TesseraError {
    fn from(e: LmdbCacheError) -> Self {
        tessera_core::TesseraError::Storage(tessera_core::StorageError::TransactionFailed {
            reason: e.to_string(),
        })
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Shared byte cache stored in an LMDB environment.
pub struct LmdbSharedCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: RwLock<CacheStats>,
}

impl LmdbSharedCache {
    /// Open (or create) the cache directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per process; callers share
        // the handle instead of reopening the path.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        let entry_count = {
            let rtxn = env.read_txn().map_err(txn_err)?;
            db.len(&rtxn).map_err(txn_err)?
        };

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats {
                entry_count,
                ..CacheStats::default()
            }),
        })
    }

    fn record(&self, apply: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            apply(&mut stats);
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<bool, heed::Error> {
        let mut wtxn = self.env.write_txn()?;
        let is_new = self.db.get(&wtxn, key)?.is_none();
        self.db.put(&mut wtxn, key, value)?;
        wtxn.commit()?;
        Ok(is_new)
    }

    /// Empty the database except for the package pointer. Returns the
    /// number of entries left.
    fn clear_tiles(&self) -> Result<u64, heed::Error> {
        let mut wtxn = self.env.write_txn()?;
        let pointer = self
            .db
            .get(&wtxn, PACKAGE_POINTER_KEY.as_bytes())?
            .map(<[u8]>::to_vec);
        self.db.clear(&mut wtxn)?;
        if let Some(pointer) = &pointer {
            self.db.put(&mut wtxn, PACKAGE_POINTER_KEY.as_bytes(), pointer)?;
        }
        wtxn.commit()?;
        Ok(u64::from(pointer.is_some()))
    }
}

fn is_map_full(err: &heed::Error) -> bool {
    matches!(err, heed::Error::Mdb(MdbError::MapFull))
}

#[async_trait]
impl SharedCache for LmdbSharedCache {
    async fn get(&self, key: &str) -> TesseraResult<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.db.get(&rtxn, key.as_bytes()) {
            Ok(Some(bytes)) => {
                self.record(|s| s.hits += 1);
                Ok(Some(bytes.to_vec()))
            }
            Ok(None) => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
            Err(e) => {
                self.record(|s| s.misses += 1);
                Err(txn_err(e).into())
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> TesseraResult<()> {
        let is_new = match self.put(key.as_bytes(), value) {
            Ok(is_new) => is_new,
            Err(e) if is_map_full(&e) => {
                tracing::warn!(key, "Shared cache full, clearing it");
                let remaining = self.clear_tiles().map_err(txn_err)?;
                self.record(|s| {
                    s.resets += 1;
                    s.entry_count = remaining;
                });
                self.put(key.as_bytes(), value).map_err(txn_err)?
            }
            Err(e) => return Err(txn_err(e).into()),
        };
        if is_new {
            self.record(|s| s.entry_count += 1);
        }
        Ok(())
    }

    async fn stats(&self) -> TesseraResult<CacheStats> {
        Ok(self.stats.read().map(|s| s.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_cache() -> (LmdbSharedCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = LmdbSharedCache::new(temp_dir.path(), 10).expect("cache creation should succeed");
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (cache, _temp_dir) = create_test_cache();
        cache
            .set("/3/0/0/0.png_\"abc\"", b"png bytes")
            .await
            .expect("set should succeed");
        let value = cache
            .get("/3/0/0/0.png_\"abc\"")
            .await
            .expect("get should succeed");
        assert_eq!(value.as_deref(), Some(&b"png bytes"[..]));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (cache, _temp_dir) = create_test_cache();
        assert!(cache.get("nope").await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_overwrite_and_string() {
        let (cache, _temp_dir) = create_test_cache();
        cache
            .set("cache_package_filename", b"data/package-1.bin")
            .await
            .expect("set should succeed");
        cache
            .set("cache_package_filename", b"data/package-2.bin")
            .await
            .expect("set should succeed");
        assert_eq!(
            cache
                .get_string("cache_package_filename")
                .await
                .expect("get should succeed")
                .as_deref(),
            Some("data/package-2.bin")
        );
    }

    #[tokio::test]
    async fn test_stats() {
        let (cache, _temp_dir) = create_test_cache();
        let _ = cache.get("a").await;
        cache.set("a", b"1").await.expect("set should succeed");
        cache.set("a", b"2").await.expect("set should succeed");
        let _ = cache.get("a").await;
        let _ = cache.get("a").await;

        let stats = cache.stats().await.expect("stats should succeed");
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_full_cache_is_cleared_and_write_succeeds() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = LmdbSharedCache::new(temp_dir.path(), 1).expect("cache creation should succeed");
        let tile = vec![7u8; 200 * 1024];
        for i in 0..12 {
            cache
                .set(&format!("tile-{}", i), &tile)
                .await
                .expect("set should succeed even when full");
        }
        let stats = cache.stats().await.expect("stats should succeed");
        assert!(stats.resets >= 1);
        assert!(cache.get("tile-11").await.expect("get should succeed").is_some());
    }

    #[tokio::test]
    async fn test_reset_keeps_package_pointer() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = LmdbSharedCache::new(temp_dir.path(), 1).expect("cache creation should succeed");
        cache
            .set(PACKAGE_POINTER_KEY, b"data/package-1.bin")
            .await
            .expect("set should succeed");

        let tile = vec![7u8; 200 * 1024];
        for i in 0..12 {
            cache
                .set(&format!("tile-{}", i), &tile)
                .await
                .expect("set should succeed even when full");
        }

        let stats = cache.stats().await.expect("stats should succeed");
        assert!(stats.resets >= 1);
        assert!(cache.get("tile-0").await.expect("get should succeed").is_none());
        assert_eq!(
            cache
                .get_string(PACKAGE_POINTER_KEY)
                .await
                .expect("get should succeed")
                .as_deref(),
            Some("data/package-1.bin")
        );
    }
}
