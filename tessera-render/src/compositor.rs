//! Multi-level geometry compositor.
//!
//! For every primary level the compositor works out which parts of which
//! levels are visible from it, crops them accordingly, merges their
//! histories and derives which access restrictions apply where.
//!
//! # Passes
//!
//! 1. Top to bottom over all levels: fetch raw layers, pool the altitude
//!    areas of intermediate levels, and build one height interpolator per
//!    primary level for the primary level below it.
//! 2. Per primary level: plan crops over its sublevels, crop every layer,
//!    composite base histories, union visible restricted spaces, mesh.
//!
//! Everything is computed in memory; persisting is the caller's job.

use std::collections::{BTreeMap, HashMap};

use geo::Buffer;
use tessera_core::{
    is_empty, union_all, validate_area, AltitudeArea, Area, GenerationKey, GeometryError,
    HeightArea, LevelGeometrySet, LevelId, LevelInfo, RenderData, RestrictionId, TesseraResult,
    Update,
};
use tessera_storage::{ArtifactStore, HistoryVariant, RasterHistoryGrid};

use crate::crop::{plan_crops, Cropper};
use crate::interpolate::HeightInterpolator;
use crate::mesh::build_mesh;
use crate::source::MapSource;

/// Distance walls are grown by when computing the affected area.
const WALL_BUFFER: f64 = 1.0;

/// Result of compositing one primary level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelOutput {
    pub render_data: RenderData,
    pub composite_history: RasterHistoryGrid,
}

/// Raw layers and interpolators produced by pass 1.
struct RawLevels {
    levels: Vec<LevelInfo>,
    geometries: HashMap<LevelId, LevelGeometrySet>,
    interpolators: HashMap<LevelId, HeightInterpolator>,
}

pub struct LevelGeometryCompositor<'a, S: MapSource> {
    source: S,
    store: &'a ArtifactStore,
    resolution: u16,
}

impl<'a, S: MapSource> LevelGeometryCompositor<'a, S> {
    pub fn new(source: S, store: &'a ArtifactStore, resolution: u16) -> Self {
        Self {
            source,
            store,
            resolution,
        }
    }

    /// Composite every primary level for `generation`.
    ///
    /// Any malformed geometry fails the whole run.
    pub fn run(&self, base_update: Update, generation: &GenerationKey) -> TesseraResult<Vec<LevelOutput>> {
        let raw = self.collect_raw_levels()?;
        let mut base_histories: HashMap<LevelId, RasterHistoryGrid> = HashMap::new();

        let mut outputs = Vec::new();
        for level in raw.levels.iter().filter(|l| l.is_primary()) {
            let output = self.composite_level(level, &raw, &mut base_histories, base_update, generation)?;
            tracing::debug!(
                level_id = %level.id,
                sublevels = output.render_data.levels.len(),
                restrictions = output.render_data.access_restriction_affected.len(),
                "Composited level"
            );
            outputs.push(output);
        }
        Ok(outputs)
    }

    fn collect_raw_levels(&self) -> TesseraResult<RawLevels> {
        let levels = self.source.levels()?;
        let mut geometries = HashMap::new();
        let mut interpolators = HashMap::new();
        let mut pool: Vec<AltitudeArea> = Vec::new();
        let mut pending: Option<HeightInterpolator> = None;

        for level in levels.iter().rev() {
            let set = self.source.level_geometries(level, &pool)?;
            validate_level(&set)?;

            if !level.is_primary() {
                pool.extend(set.altitude_areas.iter().cloned());
                pool.sort_by(|a, b| a.altitude.total_cmp(&b.altitude));
                geometries.insert(level.id, set);
                continue;
            }

            if let Some(interp) = pending.take() {
                interpolators.insert(level.id, interp);
            }
            pending = HeightInterpolator::from_areas(set.altitude_areas.iter().chain(pool.iter()));
            geometries.insert(level.id, set);
        }

        Ok(RawLevels {
            levels,
            geometries,
            interpolators,
        })
    }

    fn base_history<'h>(
        &self,
        cache: &'h mut HashMap<LevelId, RasterHistoryGrid>,
        level: LevelId,
        base_update: Update,
    ) -> TesseraResult<&'h RasterHistoryGrid> {
        if !cache.contains_key(&level) {
            let grid = self
                .store
                .open_history(level, HistoryVariant::Base, self.resolution, base_update)?;
            cache.insert(level, grid);
        }
        cache
            .get(&level)
            .ok_or_else(|| GeometryError::MissingLevel { level }.into())
    }

    fn composite_level(
        &self,
        level: &LevelInfo,
        raw: &RawLevels,
        base_histories: &mut HashMap<LevelId, RasterHistoryGrid>,
        base_update: Update,
        generation: &GenerationKey,
    ) -> TesseraResult<LevelOutput> {
        let sublevels: Vec<&LevelInfo> = raw
            .levels
            .iter()
            .filter(|s| s.on_top_of == Some(level.id) || s.base_altitude <= level.base_altitude)
            .collect();

        let mut layers = Vec::with_capacity(sublevels.len());
        for sublevel in sublevels.iter().rev() {
            let set = raw
                .geometries
                .get(&sublevel.id)
                .ok_or(GeometryError::MissingLevel { level: sublevel.id })?;
            layers.push((sublevel.id, set.holes.as_ref()));
        }
        let plan = plan_crops(layers);

        let mut history = self.base_history(base_histories, level.id, base_update)?.clone();
        let mut visible: Vec<LevelGeometrySet> = Vec::new();
        let mut restricted: BTreeMap<RestrictionId, Vec<Area>> = BTreeMap::new();

        for step in &plan {
            let cropper = &step.cropper;
            if cropper.is_restricted() || step.level != level.id {
                let other = self.base_history(base_histories, step.level, base_update)?;
                history.composite(other, cropper.geometry())?;
            }

            let source = raw
                .geometries
                .get(&step.level)
                .ok_or(GeometryError::MissingLevel { level: step.level })?;
            let Some(mut cropped) = crop_level(source, cropper) else {
                if cropper.is_restricted() {
                    tracing::debug!(
                        level_id = %level.id,
                        sublevel = %step.level,
                        "Nothing visible through the holes, skipping everything below"
                    );
                    break;
                }
                continue;
            };

            for (restriction, area) in &cropped.restricted_spaces_indoors {
                restricted.entry(*restriction).or_default().push(area.clone());
            }

            let ceiling = (step.level == level.id)
                .then(|| raw.interpolators.get(&level.id))
                .flatten();
            cropped.mesh = build_mesh(&cropped, ceiling);
            visible.push(cropped);
        }

        visible.reverse();
        let access_restriction_affected = restricted
            .into_iter()
            .map(|(restriction, areas)| (restriction, union_all(areas.iter())))
            .collect();

        let min_altitude = visible
            .iter()
            .map(|s| s.min_altitude)
            .fold(level.base_altitude, f64::min);
        let max_altitude = visible
            .iter()
            .flat_map(|s| {
                s.altitude_areas
                    .iter()
                    .map(AltitudeArea::top_altitude)
                    .chain(std::iter::once(s.level.base_altitude + s.level.default_height))
            })
            .fold(level.base_altitude + level.default_height, f64::max);

        Ok(LevelOutput {
            render_data: RenderData {
                level_id: level.id,
                generation: generation.clone(),
                levels: visible,
                access_restriction_affected,
                min_altitude,
                max_altitude,
            },
            composite_history: history,
        })
    }
}

fn validate_level(set: &LevelGeometrySet) -> Result<(), GeometryError> {
    let context = |layer: &str| format!("level {} {}", set.id(), layer);
    validate_area(&set.walls, &context("walls"))?;
    validate_area(&set.doors, &context("doors"))?;
    if let Some(holes) = &set.holes {
        validate_area(holes, &context("holes"))?;
    }
    for area in &set.altitude_areas {
        validate_area(&area.geometry, &context("altitude area"))?;
        if !area.altitude.is_finite() {
            return Err(GeometryError::Malformed {
                context: context("altitude area"),
                reason: format!("non-finite altitude {}", area.altitude),
            });
        }
    }
    for ramp in &set.ramps {
        validate_area(ramp, &context("ramp"))?;
    }
    for area in set
        .restricted_spaces_indoors
        .values()
        .chain(set.restricted_spaces_outdoors.values())
    {
        validate_area(area, &context("restricted space"))?;
    }
    Ok(())
}

fn crop_map<K: Ord + Clone>(cropper: &Cropper, map: &BTreeMap<K, Area>) -> BTreeMap<K, Area> {
    map.iter()
        .map(|(key, area)| (key.clone(), cropper.crop(area)))
        .filter(|(_, area)| !is_empty(area))
        .collect()
}

fn crop_altitude_area(cropper: &Cropper, area: &AltitudeArea) -> Option<AltitudeArea> {
    let geometry = cropper.crop(&area.geometry);
    if is_empty(&geometry) {
        return None;
    }
    let inside = Cropper::restricted_to(geometry.clone());

    let colors = area
        .colors
        .iter()
        .filter_map(|(color, by_restriction)| {
            let cropped = crop_map(&inside, by_restriction);
            (!cropped.is_empty()).then(|| (color.clone(), cropped))
        })
        .collect();

    Some(AltitudeArea {
        geometry,
        altitude: area.altitude,
        altitude2: area.altitude2,
        point1: area.point1,
        point2: area.point2,
        colors,
        obstacles: crop_map(&inside, &area.obstacles),
    })
}

/// Crop every layer of `source`. `None` when neither walls nor floors remain.
pub fn crop_level(source: &LevelGeometrySet, cropper: &Cropper) -> Option<LevelGeometrySet> {
    let walls = cropper.crop(&source.walls);
    let altitude_areas: Vec<AltitudeArea> = source
        .altitude_areas
        .iter()
        .filter_map(|area| crop_altitude_area(cropper, area))
        .collect();
    if is_empty(&walls) && altitude_areas.is_empty() {
        return None;
    }

    let ramps = source
        .ramps
        .iter()
        .map(|ramp| cropper.crop(ramp))
        .filter(|ramp| !is_empty(ramp))
        .collect();
    let height_areas = source
        .height_areas
        .iter()
        .map(|h| HeightArea {
            geometry: cropper.crop(&h.geometry),
            height: h.height,
        })
        .filter(|h| !is_empty(&h.geometry))
        .collect();

    let buffered_walls = if is_empty(&walls) {
        walls.clone()
    } else {
        cropper.crop(&walls.buffer(WALL_BUFFER))
    };
    let affected_area = union_all(
        altitude_areas
            .iter()
            .map(|a| &a.geometry)
            .chain(std::iter::once(&buffered_walls)),
    );

    let min_altitude = altitude_areas
        .iter()
        .map(|a| a.altitude)
        .reduce(f64::min)
        .unwrap_or(source.level.base_altitude);

    Some(LevelGeometrySet {
        level: source.level.clone(),
        doors: cropper.crop(&source.doors),
        holes: source.holes.as_ref().map(|holes| cropper.crop(holes)),
        walls,
        altitude_areas,
        ramps,
        height_areas,
        restricted_spaces_indoors: crop_map(cropper, &source.restricted_spaces_indoors),
        restricted_spaces_outdoors: crop_map(cropper, &source.restricted_spaces_outdoors),
        affected_area,
        min_altitude,
        mesh: Default::default(),
    })
}
