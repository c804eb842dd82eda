//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - An in-memory map source
//! - Geometry builders and level fixtures
//! - Proptest generators

pub use tessera_core::{
    AltitudeArea, Area, Bounds, GeometryError, LevelGeometrySet, LevelId, LevelInfo, Update,
};

use std::collections::BTreeMap;
use std::sync::Mutex;

use tessera_render::MapSource;

// ============================================================================
// MAP SOURCE
// ============================================================================

/// Map source backed by prebuilt geometry sets.
///
/// Records how many intermediate altitude areas were passed for each level so
/// tests can check the top-down pooling.
#[derive(Debug)]
pub struct StaticMapSource {
    levels: Vec<LevelGeometrySet>,
    last_update: Update,
    pooled_areas: Mutex<BTreeMap<LevelId, usize>>,
}

impl StaticMapSource {
    pub fn new(last_update: Update) -> Self {
        Self {
            levels: Vec::new(),
            last_update,
            pooled_areas: Mutex::new(BTreeMap::new()),
        }
    }

    /// Add a level; levels are reported ascending by base altitude.
    pub fn with_level(mut self, set: LevelGeometrySet) -> Self {
        self.levels.push(set);
        self.levels
            .sort_by(|a, b| a.level.base_altitude.total_cmp(&b.level.base_altitude));
        self
    }

    /// Number of pooled altitude areas handed over with `level`.
    pub fn pooled_areas_for(&self, level: LevelId) -> Option<usize> {
        self.pooled_areas
            .lock()
            .ok()
            .and_then(|seen| seen.get(&level).copied())
    }
}

impl MapSource for StaticMapSource {
    fn levels(&self) -> Result<Vec<LevelInfo>, GeometryError> {
        Ok(self.levels.iter().map(|set| set.level.clone()).collect())
    }

    fn last_processed_update(&self) -> Update {
        self.last_update
    }

    fn level_geometries(
        &self,
        level: &LevelInfo,
        altitude_areas_above: &[AltitudeArea],
    ) -> Result<LevelGeometrySet, GeometryError> {
        if let Ok(mut seen) = self.pooled_areas.lock() {
            seen.insert(level.id, altitude_areas_above.len());
        }
        self.levels
            .iter()
            .find(|set| set.level.id == level.id)
            .cloned()
            .ok_or(GeometryError::MissingLevel { level: level.id })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    /// Axis-aligned rectangle as an area.
    pub fn rect(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Area {
        Bounds::new(minx, miny, maxx, maxy).to_area()
    }

    /// Square with its lower-left corner at `(minx, miny)`.
    pub fn square(minx: f64, miny: f64, size: f64) -> Area {
        rect(minx, miny, minx + size, miny + size)
    }

    pub fn primary_level(id: u32, base_altitude: f64) -> LevelInfo {
        LevelInfo {
            id: LevelId(id),
            on_top_of: None,
            base_altitude,
            default_height: 3.0,
            door_height: 2.0,
            short_label: id.to_string(),
        }
    }

    pub fn intermediate_level(id: u32, on_top_of: u32, base_altitude: f64) -> LevelInfo {
        LevelInfo {
            on_top_of: Some(LevelId(on_top_of)),
            ..primary_level(id, base_altitude)
        }
    }

    /// A floor covering `extent`, walled on its western edge, with the given
    /// holes.
    pub fn floor(level: LevelInfo, extent: Bounds, holes: Option<Area>) -> LevelGeometrySet {
        let mut set = LevelGeometrySet::empty(level);
        set.altitude_areas
            .push(AltitudeArea::new(extent.to_area(), set.level.base_altitude));
        set.walls = rect(extent.minx, extent.miny, extent.minx + 0.5, extent.maxy);
        if set.level.is_primary() {
            set.holes = holes.or_else(|| Some(tessera_core::empty_area()));
        }
        set
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Rectangle with corners inside `[-extent, extent]`.
    pub fn arb_bounds(extent: f64) -> impl Strategy<Value = Bounds> {
        (-extent..extent, -extent..extent, 0.5f64..extent, 0.5f64..extent)
            .prop_map(|(x, y, w, h)| Bounds::new(x, y, x + w, y + h))
    }

    pub fn arb_area(extent: f64) -> impl Strategy<Value = Area> {
        arb_bounds(extent).prop_map(|b| b.to_area())
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_static_source_sorts_levels() {
        let source = StaticMapSource::new(Update::new(1, 1))
            .with_level(floor(primary_level(2, 4.0), Bounds::new(0.0, 0.0, 1.0, 1.0), None))
            .with_level(floor(primary_level(1, 0.0), Bounds::new(0.0, 0.0, 1.0, 1.0), None));
        let ids: Vec<_> = source
            .levels()
            .expect("levels should load")
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![LevelId(1), LevelId(2)]);
    }

    #[test]
    fn test_unknown_level_is_missing() {
        let source = StaticMapSource::new(Update::new(1, 1));
        assert!(matches!(
            source.level_geometries(&primary_level(9, 0.0), &[]),
            Err(GeometryError::MissingLevel { .. })
        ));
    }
}
