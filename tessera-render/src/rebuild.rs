//! Generation rebuild and publish.

use std::time::Instant;

use tessera_core::{GenerationKey, LevelId, RenderConfig, TesseraResult};
use tessera_storage::{ArtifactStore, CachePackage, HistoryVariant};

use crate::compositor::{LevelGeometryCompositor, LevelOutput};
use crate::source::MapSource;

/// What a successful rebuild published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    pub generation: GenerationKey,
    pub levels: Vec<LevelId>,
}

/// Rebuilds render data, composite histories and the cache package.
pub struct Rebuilder<S: MapSource> {
    source: S,
    store: ArtifactStore,
    config: RenderConfig,
}

impl<S: MapSource> Rebuilder<S> {
    pub fn new(source: S, config: RenderConfig) -> Self {
        Self {
            source,
            store: ArtifactStore::new(config.cache_root.clone()),
            config,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Composite every level, then publish.
    ///
    /// Nothing is written until every level composited successfully. The
    /// generation marker is written last, so readers keyed on it never see a
    /// generation whose artifacts are incomplete.
    pub fn rebuild(&self) -> TesseraResult<RebuildSummary> {
        let started = Instant::now();
        let update = self.source.last_processed_update();
        let generation = update.cache_key();
        tracing::info!(%generation, %update, "Rebuilding render data");

        let compositor =
            LevelGeometryCompositor::new(&self.source, &self.store, self.config.history_resolution);
        let outputs = compositor.run(update, &generation)?;

        let levels = self.publish(&generation, outputs)?;

        tracing::info!(
            %generation,
            levels = levels.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rebuild published"
        );
        Ok(RebuildSummary { generation, levels })
    }

    fn publish(&self, generation: &GenerationKey, outputs: Vec<LevelOutput>) -> TesseraResult<Vec<LevelId>> {
        let mut bundled = Vec::with_capacity(outputs.len());
        for mut output in outputs {
            let level = output.render_data.level_id;
            self.store.save_render_data(&output.render_data)?;
            self.store
                .save_history(level, HistoryVariant::Composite, &mut output.composite_history)?;
            tracing::debug!(level_id = %level, "Saved level artifacts");
            bundled.push((output.render_data, output.composite_history));
        }

        let levels = bundled.iter().map(|(data, _)| data.level_id).collect();
        let package = CachePackage::bundle(generation.clone(), bundled);
        package.save(&self.store.package_path())?;
        self.store.write_generation(generation)?;
        Ok(levels)
    }
}
