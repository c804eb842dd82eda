//! Geometry aliases and helpers shared across crates.

use geo::{Area as _, BooleanOps, BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::GeometryError;

/// Canonical area geometry. The empty multipolygon is the empty geometry.
pub type Area = MultiPolygon<f64>;

/// The empty geometry.
pub fn empty_area() -> Area {
    MultiPolygon(Vec::new())
}

/// True when the geometry covers no area.
pub fn is_empty(area: &Area) -> bool {
    area.0.is_empty() || area.unsigned_area() <= 0.0
}

/// Union of any number of areas.
pub fn union_all<'a>(areas: impl IntoIterator<Item = &'a Area>) -> Area {
    let areas: Vec<&Area> = areas.into_iter().filter(|area| !area.0.is_empty()).collect();
    match areas.len() {
        0 => empty_area(),
        1 => areas[0].clone(),
        _ => geo::unary_union(areas),
    }
}

/// Intersection that skips the boolean op when bounding boxes are disjoint.
pub fn intersection(a: &Area, b: &Area) -> Area {
    match (Bounds::of(a), Bounds::of(b)) {
        (Some(ba), Some(bb)) if ba.intersects(&bb) => a.intersection(b),
        _ => empty_area(),
    }
}

/// Every ring (exteriors and interiors) of an area.
pub fn rings(area: &Area) -> impl Iterator<Item = &LineString<f64>> {
    area.0
        .iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
}

/// Reject geometry the boolean ops cannot handle.
pub fn validate_area(area: &Area, context: &str) -> Result<(), GeometryError> {
    for ring in rings(area) {
        if let Some(coord) = ring.coords().find(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(GeometryError::Malformed {
                context: context.to_string(),
                reason: format!("non-finite coordinate ({}, {})", coord.x, coord.y),
            });
        }
    }
    Ok(())
}

/// Axis-aligned rectangle in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl Bounds {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
        }
    }

    /// Bounding box of an area, `None` for the empty geometry.
    pub fn of(area: &Area) -> Option<Self> {
        area.bounding_rect().map(Self::from)
    }

    /// Closed-interval overlap test.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.minx <= other.maxx
            && self.maxx >= other.minx
            && self.miny <= other.maxy
            && self.maxy >= other.miny
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            minx: self.minx.min(other.minx),
            miny: self.miny.min(other.miny),
            maxx: self.maxx.max(other.maxx),
            maxy: self.maxy.max(other.maxy),
        }
    }

    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.minx,
                y: self.miny,
            },
            Coord {
                x: self.maxx,
                y: self.maxy,
            },
        )
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }

    pub fn to_area(&self) -> Area {
        MultiPolygon(vec![self.to_polygon()])
    }
}

impl From<Rect<f64>> for Bounds {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            minx: rect.min().x,
            miny: rect.min().y,
            maxx: rect.max().x,
            maxy: rect.max().y,
        }
    }
}
