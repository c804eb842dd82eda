//! Process-wide cache of loaded render data.
//!
//! The cache is tied to a generation: whenever the generation source reports
//! a different generation than the one the entries were loaded under, every
//! entry is dropped before the lookup proceeds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tessera_core::{GenerationKey, LevelId, RenderData, StorageError};

use crate::artifacts::ArtifactStore;

/// Where the current generation token comes from.
pub trait GenerationSource: Send + Sync {
    fn current_generation(&self) -> Result<Option<GenerationKey>, StorageError>;
}

impl GenerationSource for ArtifactStore {
    fn current_generation(&self) -> Result<Option<GenerationKey>, StorageError> {
        self.read_generation()
    }
}

#[derive(Default)]
struct CacheState {
    generation: Option<GenerationKey>,
    entries: HashMap<LevelId, Arc<RenderData>>,
}

pub struct RenderDataCache {
    store: ArtifactStore,
    generations: Arc<dyn GenerationSource>,
    state: Mutex<CacheState>,
}

impl RenderDataCache {
    /// Cache that reads the generation marker from the same store.
    pub fn new(store: ArtifactStore) -> Self {
        let generations = Arc::new(store.clone());
        Self::with_generation_source(store, generations)
    }

    pub fn with_generation_source(store: ArtifactStore, generations: Arc<dyn GenerationSource>) -> Self {
        Self {
            store,
            generations,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Render data of `level` for the current generation.
    pub fn get(&self, level: LevelId) -> Result<Arc<RenderData>, StorageError> {
        let mut state = self.state.lock().map_err(|_| StorageError::LockPoisoned)?;

        let current = self.generations.current_generation()?;
        if state.generation != current {
            tracing::debug!(
                previous = ?state.generation,
                current = ?current,
                "Generation changed, dropping cached render data"
            );
            state.entries.clear();
            state.generation = current;
        }

        if let Some(hit) = state.entries.get(&level) {
            return Ok(Arc::clone(hit));
        }

        let data = Arc::new(self.store.load_render_data(level)?);
        state.entries.insert(level, Arc::clone(&data));
        Ok(data)
    }

    /// Number of levels currently held.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
