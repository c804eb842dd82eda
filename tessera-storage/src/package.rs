//! Cache package: the immutable per-generation snapshot shipped to tile servers.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_core::{Bounds, GenerationKey, LevelId, RenderData, StorageError};

use crate::artifacts::{seal, unseal, write_atomic};
use crate::history::RasterHistoryGrid;

const PACKAGE_MAGIC: &[u8; 4] = b"TSPK";
const PACKAGE_VERSION: u16 = 1;

/// Everything a tile server needs about one primary level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelPackage {
    /// Extent tiles may be served for: the visible geometry plus every
    /// region the composite history tracks.
    pub bounds: Option<Bounds>,
    pub history: RasterHistoryGrid,
    pub render_data: RenderData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePackage {
    generation: GenerationKey,
    levels: BTreeMap<LevelId, LevelPackage>,
}

impl CachePackage {
    /// Bundle render data with the composite history of each level.
    pub fn bundle(
        generation: GenerationKey,
        levels: impl IntoIterator<Item = (RenderData, RasterHistoryGrid)>,
    ) -> Self {
        let levels = levels
            .into_iter()
            .map(|(render_data, history)| {
                let bounds = match (render_data.extent(), history.bounds()) {
                    (Some(a), Some(b)) => Some(a.union(&b)),
                    (a, b) => a.or(b),
                };
                let level = LevelPackage {
                    bounds,
                    history,
                    render_data,
                };
                (level.render_data.level_id, level)
            })
            .collect();
        Self { generation, levels }
    }

    pub fn generation(&self) -> &GenerationKey {
        &self.generation
    }

    pub fn level(&self, id: LevelId) -> Option<&LevelPackage> {
        self.levels.get(&id)
    }

    pub fn levels(&self) -> impl Iterator<Item = (&LevelId, &LevelPackage)> {
        self.levels.iter()
    }

    /// True when `rect` overlaps the servable extent of `level`.
    pub fn bounds_valid(&self, level: LevelId, rect: &Bounds) -> bool {
        self.level(level)
            .and_then(|l| l.bounds)
            .is_some_and(|bounds| bounds.intersects(rect))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        seal(PACKAGE_MAGIC, PACKAGE_VERSION, self, "cache package")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        unseal(PACKAGE_MAGIC, PACKAGE_VERSION, bytes, "cache package")
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        write_atomic(path, &self.to_bytes()?)
    }

    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes =
            std::fs::read(path).map_err(|e| StorageError::from_io(path.display().to_string(), &e))?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{AltitudeArea, LevelGeometrySet, LevelInfo, RestrictionId, Update};

    fn level(id: u32, extent: Option<Bounds>) -> (RenderData, RasterHistoryGrid) {
        let mut history = RasterHistoryGrid::new(4, Update::new(1, 1)).expect("resolution is valid");
        if let Some(b) = extent {
            history
                .add_geometry(&b.to_area(), Update::new(2, 2))
                .expect("add should succeed");
        }
        let mut restricted = BTreeMap::new();
        restricted.insert(RestrictionId(4), Bounds::new(0.0, 0.0, 2.0, 2.0).to_area());
        let data = RenderData {
            level_id: LevelId(id),
            generation: GenerationKey::from_raw("2_2"),
            levels: Vec::new(),
            access_restriction_affected: restricted,
            min_altitude: 0.0,
            max_altitude: 4.0,
        };
        (data, history)
    }

    fn package() -> CachePackage {
        CachePackage::bundle(
            GenerationKey::from_raw("2_2"),
            vec![
                level(1, Some(Bounds::new(0.0, 0.0, 40.0, 20.0))),
                level(2, None),
            ],
        )
    }

    #[test]
    fn test_bundle_without_geometry_uses_history_bounds() {
        let package = package();
        let first = package.level(LevelId(1)).expect("level 1 is bundled");
        assert_eq!(first.bounds, Some(Bounds::new(0.0, 0.0, 40.0, 20.0)));
        assert_eq!(package.level(LevelId(2)).and_then(|l| l.bounds), None);
    }

    #[test]
    fn test_bundle_covers_unedited_geometry() {
        let (mut data, history) = level(3, None);
        let mut floor = LevelGeometrySet::empty(LevelInfo {
            id: LevelId(3),
            on_top_of: None,
            base_altitude: 0.0,
            default_height: 3.0,
            door_height: 2.0,
            short_label: "3".to_string(),
        });
        floor
            .altitude_areas
            .push(AltitudeArea::new(Bounds::new(0.0, 0.0, 40.0, 40.0).to_area(), 0.0));
        data.levels.push(floor);

        let package = CachePackage::bundle(GenerationKey::from_raw("2_2"), vec![(data, history)]);
        assert_eq!(
            package.level(LevelId(3)).and_then(|l| l.bounds),
            Some(Bounds::new(0.0, 0.0, 40.0, 40.0))
        );
        assert!(package.bounds_valid(LevelId(3), &Bounds::new(30.0, 30.0, 35.0, 35.0)));
    }

    #[test]
    fn test_bounds_valid() {
        let package = package();
        assert!(package.bounds_valid(LevelId(1), &Bounds::new(10.0, 10.0, 12.0, 12.0)));
        assert!(!package.bounds_valid(LevelId(1), &Bounds::new(100.0, 0.0, 120.0, 10.0)));
        assert!(!package.bounds_valid(LevelId(2), &Bounds::new(0.0, 0.0, 1.0, 1.0)));
        assert!(!package.bounds_valid(LevelId(9), &Bounds::new(0.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_bytes_round_trip() {
        let package = package();
        let bytes = package.to_bytes().expect("encode should succeed");
        assert_eq!(&bytes[..4], b"TSPK");
        let back = CachePackage::from_bytes(&bytes).expect("decode should succeed");
        assert_eq!(back, package);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = package().to_bytes().expect("encode should succeed");
        bytes[4] = 0xff;
        assert!(matches!(
            CachePackage::from_bytes(&bytes),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
