//! Level geometry and render data types.

use std::collections::BTreeMap;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::geometry::{empty_area, Area, Bounds};
use crate::{GenerationKey, LevelId, RestrictionId};

/// Level metadata as provided by the map source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub id: LevelId,
    /// Level this one is mounted on top of (mezzanines, galleries).
    pub on_top_of: Option<LevelId>,
    pub base_altitude: f64,
    pub default_height: f64,
    pub door_height: f64,
    pub short_label: String,
}

impl LevelInfo {
    /// Primary levels are the unit tiles are rendered for.
    pub fn is_primary(&self) -> bool {
        self.on_top_of.is_none()
    }
}

/// Walkable area at a fixed (or sloped) altitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltitudeArea {
    pub geometry: Area,
    pub altitude: f64,
    /// Second altitude for ramps; interpolated between `point1` and `point2`.
    pub altitude2: Option<f64>,
    pub point1: Option<Point<f64>>,
    pub point2: Option<Point<f64>>,
    /// color -> restriction (None = public) -> area
    pub colors: BTreeMap<String, BTreeMap<Option<RestrictionId>, Area>>,
    /// obstacle height in centimeters -> area
    pub obstacles: BTreeMap<u32, Area>,
}

impl AltitudeArea {
    pub fn new(geometry: Area, altitude: f64) -> Self {
        Self {
            geometry,
            altitude,
            altitude2: None,
            point1: None,
            point2: None,
            colors: BTreeMap::new(),
            obstacles: BTreeMap::new(),
        }
    }

    /// Highest altitude reached anywhere in the area.
    pub fn top_altitude(&self) -> f64 {
        self.altitude2.map_or(self.altitude, |alt2| alt2.max(self.altitude))
    }
}

/// Area rendered with a custom ceiling height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightArea {
    pub geometry: Area,
    pub height: f64,
}

/// Triangle mesh derived from a level's geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelMesh {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl LevelMesh {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// Vector layers of one level, raw or cropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelGeometrySet {
    pub level: LevelInfo,
    pub walls: Area,
    pub doors: Area,
    /// Apertures through which lower floors are visible. `None` for levels
    /// mounted on top of another level.
    pub holes: Option<Area>,
    pub altitude_areas: Vec<AltitudeArea>,
    pub ramps: Vec<Area>,
    pub height_areas: Vec<HeightArea>,
    pub restricted_spaces_indoors: BTreeMap<RestrictionId, Area>,
    pub restricted_spaces_outdoors: BTreeMap<RestrictionId, Area>,
    /// Region whose pixels this level influences.
    pub affected_area: Area,
    pub min_altitude: f64,
    pub mesh: LevelMesh,
}

impl LevelGeometrySet {
    /// Empty layer set for a level; primary levels start with empty holes.
    pub fn empty(level: LevelInfo) -> Self {
        let holes = level.is_primary().then(empty_area);
        let min_altitude = level.base_altitude;
        Self {
            level,
            walls: empty_area(),
            doors: empty_area(),
            holes,
            altitude_areas: Vec::new(),
            ramps: Vec::new(),
            height_areas: Vec::new(),
            restricted_spaces_indoors: BTreeMap::new(),
            restricted_spaces_outdoors: BTreeMap::new(),
            affected_area: empty_area(),
            min_altitude,
            mesh: LevelMesh::default(),
        }
    }

    pub fn id(&self) -> LevelId {
        self.level.id
    }

    /// Bounding box of the walls, floors and affected area.
    pub fn extent(&self) -> Option<Bounds> {
        std::iter::once(&self.walls)
            .chain(std::iter::once(&self.affected_area))
            .chain(self.altitude_areas.iter().map(|a| &a.geometry))
            .filter_map(Bounds::of)
            .reduce(|a, b| a.union(&b))
    }
}

/// Everything the renderer needs to draw one primary level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderData {
    pub level_id: LevelId,
    pub generation: GenerationKey,
    /// Visible sublevels, bottom to top.
    pub levels: Vec<LevelGeometrySet>,
    /// restriction -> where that restriction is visible on this level
    pub access_restriction_affected: BTreeMap<RestrictionId, Area>,
    pub min_altitude: f64,
    pub max_altitude: f64,
}

impl RenderData {
    /// Extent of every visible sublevel, `None` when nothing is visible.
    pub fn extent(&self) -> Option<Bounds> {
        self.levels
            .iter()
            .filter_map(LevelGeometrySet::extent)
            .reduce(|a, b| a.union(&b))
    }
}
