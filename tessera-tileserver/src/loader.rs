//! Cache package download.
//!
//! A successful download is validated, written to a timestamped file in the
//! data directory and published to every worker through the shared cache.

use std::path::PathBuf;
use std::sync::Arc;

use tessera_core::{StorageError, TesseraError};
use tessera_storage::{write_atomic, CachePackage, SharedCache, PACKAGE_POINTER_KEY};

use crate::package_state::LoadedPackage;
use crate::upstream::{PackageFetch, Upstream, UpstreamError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("Download failed: {0}")]
    Download(#[from] UpstreamError),

    #[error("Upstream answered not modified, but there is no local package")]
    UnexpectedNotModified,

    #[error("Package parsing failed: {0}")]
    Parse(StorageError),

    #[error("Saving package failed: {0}")]
    Save(StorageError),

    #[error("Publishing package failed: {0}")]
    Publish(TesseraError),
}

/// What a load attempt changed.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Upstream still serves the package we have; its pointer was republished.
    Unchanged,
    /// A new package was stored and published.
    Updated(PathBuf),
}

/// Downloads packages and remembers the last one it stored.
pub struct PackageLoader {
    upstream: Arc<dyn Upstream>,
    cache: Arc<dyn SharedCache>,
    data_dir: PathBuf,
    etag: Option<String>,
    filename: Option<PathBuf>,
}

impl PackageLoader {
    pub fn new(upstream: Arc<dyn Upstream>, cache: Arc<dyn SharedCache>, data_dir: PathBuf) -> Self {
        Self {
            upstream,
            cache,
            data_dir,
            etag: None,
            filename: None,
        }
    }

    pub fn filename(&self) -> Option<&PathBuf> {
        self.filename.as_ref()
    }

    /// Fetch the package if it changed and publish it.
    pub async fn load(&mut self) -> Result<LoadOutcome, LoadError> {
        tracing::debug!("Downloading cache package from upstream");
        let fetched = self.upstream.fetch_package(self.etag.as_deref()).await;

        let (bytes, etag) = match fetched {
            Ok(PackageFetch::NotModified) => {
                let Some(filename) = self.filename.clone() else {
                    return Err(LoadError::UnexpectedNotModified);
                };
                tracing::debug!("Cache package not modified");
                self.publish(&filename).await?;
                return Ok(LoadOutcome::Unchanged);
            }
            Ok(PackageFetch::Fetched { bytes, etag }) => (bytes, etag),
            Err(UpstreamError::Forbidden) => {
                tracing::error!(
                    "Rejected cache package download with 403, tile secret is probably incorrect"
                );
                return Err(UpstreamError::Forbidden.into());
            }
            Err(e) => return Err(e.into()),
        };

        let package = CachePackage::from_bytes(&bytes).map_err(LoadError::Parse)?;
        let filename = self.data_dir.join(format!(
            "{}.bin",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S-%6f")
        ));
        write_atomic(&filename, &bytes).map_err(LoadError::Save)?;
        self.publish(&filename).await?;

        tracing::info!(
            generation = %package.generation(),
            filename = %filename.display(),
            "Cache package loaded"
        );
        self.etag = etag;
        self.filename = Some(filename.clone());
        Ok(LoadOutcome::Updated(filename))
    }

    /// Load, and on success read the stored package back for serving.
    pub async fn load_initial(&mut self) -> Result<LoadedPackage, LoadError> {
        self.load().await?;
        let filename = self.filename.clone().ok_or(LoadError::UnexpectedNotModified)?;
        LoadedPackage::read(&filename).map_err(LoadError::Parse)
    }

    async fn publish(&self, filename: &std::path::Path) -> Result<(), LoadError> {
        self.cache
            .set(PACKAGE_POINTER_KEY, filename.display().to_string().as_bytes())
            .await
            .map_err(LoadError::Publish)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tessera_core::tiles::TileCoord;
    use tessera_core::{GenerationKey, LevelId, RenderData, Update};
    use tessera_storage::{InMemorySharedCache, RasterHistoryGrid};

    use crate::upstream::UpstreamResponse;

    struct ScriptedUpstream {
        answers: Mutex<Vec<Result<PackageFetch, UpstreamError>>>,
        seen_etags: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedUpstream {
        fn new(mut answers: Vec<Result<PackageFetch, UpstreamError>>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                seen_etags: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Upstream for ScriptedUpstream {
        async fn fetch_package(&self, etag: Option<&str>) -> Result<PackageFetch, UpstreamError> {
            self.seen_etags.lock().expect("lock").push(etag.map(str::to_string));
            self.answers
                .lock()
                .expect("lock")
                .pop()
                .unwrap_or(Err(UpstreamError::Status(500)))
        }

        async fn fetch_tile(&self, _: &TileCoord, _: &str) -> Result<UpstreamResponse, UpstreamError> {
            Err(UpstreamError::Status(500))
        }
    }

    fn package_bytes() -> Vec<u8> {
        let generation = GenerationKey::from_raw("2_2");
        let history = RasterHistoryGrid::new(4, Update::new(2, 2)).expect("valid resolution");
        let data = RenderData {
            level_id: LevelId(1),
            generation: generation.clone(),
            levels: Vec::new(),
            access_restriction_affected: BTreeMap::new(),
            min_altitude: 0.0,
            max_altitude: 3.0,
        };
        CachePackage::bundle(generation, vec![(data, history)])
            .to_bytes()
            .expect("package encodes")
    }

    fn fetched() -> Result<PackageFetch, UpstreamError> {
        Ok(PackageFetch::Fetched {
            bytes: package_bytes(),
            etag: Some("\"v1\"".to_string()),
        })
    }

    #[tokio::test]
    async fn test_load_stores_and_publishes() {
        let dir = tempfile::TempDir::new().expect("TempDir creation should succeed");
        let upstream = Arc::new(ScriptedUpstream::new(vec![fetched(), Ok(PackageFetch::NotModified)]));
        let cache: Arc<dyn SharedCache> = Arc::new(InMemorySharedCache::new());
        let mut loader = PackageLoader::new(upstream.clone(), cache.clone(), dir.path().to_path_buf());

        let loaded = loader.load_initial().await.expect("load should succeed");
        assert_eq!(loaded.package().generation().as_str(), "2_2");
        assert!(loaded.filename().starts_with(dir.path()));
        let pointer = cache
            .get_string(PACKAGE_POINTER_KEY)
            .await
            .expect("get should succeed");
        assert_eq!(pointer, Some(loaded.filename().display().to_string()));

        // a stale pointer is restored by the next not-modified answer
        cache.set(PACKAGE_POINTER_KEY, b"elsewhere").await.expect("set should succeed");
        assert_eq!(loader.load().await, Ok(LoadOutcome::Unchanged));
        let pointer = cache
            .get_string(PACKAGE_POINTER_KEY)
            .await
            .expect("get should succeed");
        assert_eq!(pointer, Some(loaded.filename().display().to_string()));

        let etags = upstream.seen_etags.lock().expect("lock").clone();
        assert_eq!(etags, vec![None, Some("\"v1\"".to_string())]);
    }

    #[tokio::test]
    async fn test_not_modified_without_package_fails() {
        let dir = tempfile::TempDir::new().expect("TempDir creation should succeed");
        let upstream = Arc::new(ScriptedUpstream::new(vec![Ok(PackageFetch::NotModified)]));
        let cache: Arc<dyn SharedCache> = Arc::new(InMemorySharedCache::new());
        let mut loader = PackageLoader::new(upstream, cache, dir.path().to_path_buf());
        assert_eq!(loader.load().await, Err(LoadError::UnexpectedNotModified));
    }

    #[tokio::test]
    async fn test_forbidden_and_garbage() {
        let dir = tempfile::TempDir::new().expect("TempDir creation should succeed");
        let upstream = Arc::new(ScriptedUpstream::new(vec![
            Err(UpstreamError::Forbidden),
            Ok(PackageFetch::Fetched {
                bytes: b"not a package".to_vec(),
                etag: None,
            }),
        ]));
        let cache: Arc<dyn SharedCache> = Arc::new(InMemorySharedCache::new());
        let mut loader = PackageLoader::new(upstream, cache.clone(), dir.path().to_path_buf());

        assert_eq!(
            loader.load().await,
            Err(LoadError::Download(UpstreamError::Forbidden))
        );
        assert!(matches!(loader.load().await, Err(LoadError::Parse(_))));
        assert!(loader.filename().is_none());
        assert_eq!(
            cache.get(PACKAGE_POINTER_KEY).await.expect("get should succeed"),
            None
        );
    }
}
