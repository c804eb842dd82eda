//! The cache package a worker serves tiles from.
//!
//! Every worker keeps its own copy in memory. The refresh job publishes the
//! filename of the newest package in the shared cache; workers compare it to
//! their copy on each request and reload when it moved on.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use geo::{Geometry, Intersects};
use tessera_core::{Bounds, LevelId, RestrictionId, StorageError};
use tessera_index::{new_spatial_index, SpatialIndex};
use tessera_storage::{CachePackage, LevelPackage, SharedCache, PACKAGE_POINTER_KEY};
use tokio::sync::{Mutex, RwLock};

/// A cache package plus the lookups derived from it.
pub struct LoadedPackage {
    filename: PathBuf,
    package: CachePackage,
    restrictions: HashMap<LevelId, Box<dyn SpatialIndex<RestrictionId>>>,
}

impl LoadedPackage {
    pub fn new(filename: PathBuf, package: CachePackage) -> Self {
        let restrictions = package
            .levels()
            .map(|(id, level)| {
                let mut index = new_spatial_index();
                for (restriction, area) in &level.render_data.access_restriction_affected {
                    index.insert(*restriction, &Geometry::MultiPolygon(area.clone()));
                }
                (*id, index)
            })
            .collect();
        Self {
            filename,
            package,
            restrictions,
        }
    }

    pub fn read(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::new(path.to_path_buf(), CachePackage::load(path)?))
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn package(&self) -> &CachePackage {
        &self.package
    }

    pub fn level(&self, id: LevelId) -> Option<&LevelPackage> {
        self.package.level(id)
    }

    /// Restrictions whose affected area on `level` overlaps `bounds`.
    pub fn restrictions_touching(&self, level: LevelId, bounds: &Bounds) -> BTreeSet<RestrictionId> {
        let (Some(index), Some(data)) = (self.restrictions.get(&level), self.level(level)) else {
            return BTreeSet::new();
        };
        let tile = bounds.to_polygon();
        index
            .intersection(&Geometry::Polygon(tile.clone()))
            .into_iter()
            .filter(|restriction| {
                data.render_data
                    .access_restriction_affected
                    .get(restriction)
                    .is_some_and(|area| area.intersects(&tile))
            })
            .collect()
    }
}

/// Per-worker handle on the active package.
pub struct PackageState {
    current: RwLock<Arc<LoadedPackage>>,
    /// Serialises reloads; holds the filenames that failed to load.
    reload: Mutex<HashSet<PathBuf>>,
    cache: Arc<dyn SharedCache>,
}

impl PackageState {
    pub fn new(initial: LoadedPackage, cache: Arc<dyn SharedCache>) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            reload: Mutex::new(HashSet::new()),
            cache,
        }
    }

    /// The package to serve this request from.
    ///
    /// Follows the shared pointer when it names a different file. A missing
    /// pointer or a failed reload keeps the local copy. Only one request
    /// reloads at a time, and a file that failed once is not read again.
    pub async fn current(&self) -> Arc<LoadedPackage> {
        let local = self.current.read().await.clone();

        let pointer = match self.cache.get_string(PACKAGE_POINTER_KEY).await {
            Ok(Some(pointer)) => PathBuf::from(pointer),
            Ok(None) => {
                tracing::warn!("Cache package pointer went missing, keeping local copy");
                return local;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reading cache package pointer failed");
                return local;
            }
        };
        if pointer == local.filename() {
            return local;
        }

        let mut failed = self.reload.lock().await;
        let local = self.current.read().await.clone();
        if pointer == local.filename() || failed.contains(&pointer) {
            return local;
        }

        tracing::debug!(filename = %pointer.display(), "Loading new cache package in worker");
        let path = pointer.clone();
        let loaded = tokio::task::spawn_blocking(move || LoadedPackage::read(&path)).await;
        match loaded {
            Ok(Ok(loaded)) => {
                let loaded = Arc::new(loaded);
                *self.current.write().await = loaded.clone();
                loaded
            }
            Ok(Err(e)) => {
                tracing::warn!(filename = %pointer.display(), error = %e, "Cache package reload failed");
                failed.insert(pointer);
                local
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache package reload task failed");
                failed.insert(pointer);
                local
            }
        }
    }
}
