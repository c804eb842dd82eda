//! Shared byte cache trait.

use async_trait::async_trait;
use tessera_core::TesseraResult;

/// Key/value byte store shared by every worker process on a host.
///
/// Holds rendered tile bytes and the pointer to the active cache package.
/// Implementations must be safe to use from many tasks at once.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> TesseraResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> TesseraResult<()>;

    async fn stats(&self) -> TesseraResult<CacheStats>;

    /// UTF-8 view of a stored value; undecodable values read as absent.
    async fn get_string(&self, key: &str) -> TesseraResult<Option<String>> {
        Ok(self
            .get(key)
            .await?
            .and_then(|bytes| String::from_utf8(bytes).ok()))
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
    /// Times the store was emptied to make room.
    pub resets: u64,
}
