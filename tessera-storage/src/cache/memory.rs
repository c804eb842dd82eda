//! In-process shared cache for tests and single-worker deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tessera_core::TesseraResult;
use tokio::sync::RwLock;

use super::traits::{CacheStats, SharedCache};

#[derive(Default)]
pub struct InMemorySharedCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    stats: RwLock<CacheStats>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> TesseraResult<Option<Vec<u8>>> {
        let value = self.entries.read().await.get(key).cloned();
        let mut stats = self.stats.write().await;
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> TesseraResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_vec());
        self.stats.write().await.entry_count = entries.len() as u64;
        Ok(())
    }

    async fn stats(&self) -> TesseraResult<CacheStats> {
        Ok(self.stats.read().await.clone())
    }
}
