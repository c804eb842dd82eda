//! End-to-end persistence: histories through the artifact store into a
//! cache package and back.

use std::collections::BTreeMap;

use tempfile::TempDir;
use tessera_core::{Bounds, GenerationKey, LevelId, RenderData, Update};
use tessera_storage::{ArtifactStore, CachePackage, HistoryVariant, RenderDataCache};

fn render_data(level: LevelId, generation: &GenerationKey) -> RenderData {
    RenderData {
        level_id: level,
        generation: generation.clone(),
        levels: Vec::new(),
        access_restriction_affected: BTreeMap::new(),
        min_altitude: 0.0,
        max_altitude: 3.0,
    }
}

#[test]
fn test_composite_history_survives_package_round_trip() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let store = ArtifactStore::new(dir.path());
    let base = Update::new(1, 1_000);
    let edit = Update::new(2, 2_000);

    let mut ground = store
        .open_history(LevelId(1), HistoryVariant::Base, 4, base)
        .expect("open should seed");
    ground
        .add_geometry(&Bounds::new(0.0, 0.0, 40.0, 40.0).to_area(), base)
        .expect("add should succeed");
    store
        .save_history(LevelId(1), HistoryVariant::Base, &mut ground)
        .expect("save should succeed");

    let mut upper = store
        .open_history(LevelId(2), HistoryVariant::Base, 4, base)
        .expect("open should seed");
    upper
        .add_geometry(&Bounds::new(8.0, 8.0, 12.0, 12.0).to_area(), edit)
        .expect("add should succeed");

    let mut composite = store
        .open_history(LevelId(1), HistoryVariant::Base, 4, base)
        .expect("open should load");
    composite
        .composite(&upper, None)
        .expect("composite should succeed");
    store
        .save_history(LevelId(1), HistoryVariant::Composite, &mut composite)
        .expect("save should succeed");

    let generation = edit.cache_key();
    let package = CachePackage::bundle(
        generation.clone(),
        vec![(render_data(LevelId(1), &generation), composite.clone())],
    );
    package.save(&store.package_path()).expect("save should succeed");

    let loaded = CachePackage::load(&store.package_path()).expect("load should succeed");
    let level = loaded.level(LevelId(1)).expect("level 1 is bundled");
    assert_eq!(loaded.generation(), &generation);
    assert_eq!(level.history.last_update(8.0, 8.0, 12.0, 12.0), edit);
    assert_eq!(level.history.last_update(20.0, 20.0, 24.0, 24.0), base);
    assert_eq!(level.bounds, Some(Bounds::new(0.0, 0.0, 40.0, 40.0)));
}

#[test]
fn test_render_cache_follows_generation_marker() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let store = ArtifactStore::new(dir.path());
    let first = GenerationKey::from_raw("1_1");
    let second = GenerationKey::from_raw("2_2");

    store
        .save_render_data(&render_data(LevelId(3), &first))
        .expect("save should succeed");
    store.write_generation(&first).expect("write should succeed");

    let cache = RenderDataCache::new(store.clone());
    assert_eq!(cache.get(LevelId(3)).expect("get should succeed").generation, first);

    store
        .save_render_data(&render_data(LevelId(3), &second))
        .expect("save should succeed");
    store.write_generation(&second).expect("write should succeed");
    assert_eq!(cache.get(LevelId(3)).expect("get should succeed").generation, second);
}
