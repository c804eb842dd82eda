//! Tessera Index - Bounding-Box Lookups
//!
//! A small spatial index used to find which stored geometries may touch a
//! query geometry. Two implementations share one contract:
//!
//! - [`RTreeIndex`] (feature `rtree`, on by default) registers the bounding box
//!   of every simple part of a geometry under its owner id.
//! - [`LinearIndex`] scans every entry. Results are identical, only slower.
//!
//! [`new_spatial_index`] picks the implementation once, based on what the
//! build provides, and warns when it has to fall back.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;

use geo::{BoundingRect, Geometry, Rect};

mod linear;
#[cfg(feature = "rtree")]
mod tree;

pub use linear::LinearIndex;
#[cfg(feature = "rtree")]
pub use tree::RTreeIndex;

/// Key type stored in an index.
pub trait IndexKey: Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static {}

impl<T> IndexKey for T where T: Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static {}

/// Bounding-box intersection lookup.
///
/// Queries are conservative: an id is returned when any bounding box of its
/// parts intersects any bounding box of the query's parts. Callers refine with
/// an exact geometry test when they need one.
pub trait SpatialIndex<K: IndexKey>: Send + Sync {
    /// Register `geometry` under `id`. Inserting the same id twice adds parts.
    fn insert(&mut self, id: K, geometry: &Geometry<f64>);

    /// Remove every part registered under `id`.
    fn delete(&mut self, id: K);

    /// Ids whose registered boxes intersect the query geometry.
    fn intersection(&self, geometry: &Geometry<f64>) -> BTreeSet<K>;

    /// Number of distinct ids stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which implementation [`new_spatial_index`] hands out in this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    RTree,
    Linear,
}

/// Backend available to this process; fixed at compile time.
pub fn available_backend() -> IndexBackend {
    if cfg!(feature = "rtree") {
        IndexBackend::RTree
    } else {
        IndexBackend::Linear
    }
}

/// Construct the best spatial index this build supports.
pub fn new_spatial_index<K: IndexKey>() -> Box<dyn SpatialIndex<K>> {
    #[cfg(feature = "rtree")]
    {
        Box::new(RTreeIndex::new())
    }
    #[cfg(not(feature = "rtree"))]
    {
        static FALLBACK_WARNING: std::sync::Once = std::sync::Once::new();
        FALLBACK_WARNING.call_once(|| {
            tracing::warn!(
                "Tree-backed spatial index unavailable; using linear scan. \
                 Rendering and tile lookups will be drastically slower."
            );
        });
        Box::new(LinearIndex::new())
    }
}

/// Bounding boxes of every simple part of a geometry.
pub(crate) fn part_boxes(geometry: &Geometry<f64>) -> Vec<Rect<f64>> {
    let mut boxes = Vec::new();
    collect_part_boxes(geometry, &mut boxes);
    boxes
}

fn collect_part_boxes(geometry: &Geometry<f64>, out: &mut Vec<Rect<f64>>) {
    match geometry {
        Geometry::MultiPolygon(multi) => {
            out.extend(multi.0.iter().filter_map(|part| part.bounding_rect()))
        }
        Geometry::MultiLineString(multi) => {
            out.extend(multi.0.iter().filter_map(|part| part.bounding_rect()))
        }
        Geometry::MultiPoint(multi) => out.extend(multi.0.iter().map(|part| part.bounding_rect())),
        Geometry::GeometryCollection(collection) => {
            for part in collection.0.iter() {
                collect_part_boxes(part, out);
            }
        }
        simple => out.extend(simple.bounding_rect()),
    }
}

pub(crate) fn rects_intersect(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && a.max().x >= b.min().x && a.min().y <= b.max().y && a.max().y >= b.min().y
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    pub(crate) fn square(minx: f64, miny: f64, size: f64) -> geo::Polygon<f64> {
        polygon![
            (x: minx, y: miny),
            (x: minx + size, y: miny),
            (x: minx + size, y: miny + size),
            (x: minx, y: miny + size),
        ]
    }

    #[test]
    fn test_part_boxes_multi_polygon() {
        let multi = MultiPolygon(vec![square(0.0, 0.0, 1.0), square(10.0, 10.0, 1.0)]);
        let boxes = part_boxes(&Geometry::MultiPolygon(multi));
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn test_available_backend_matches_feature() {
        let expected = if cfg!(feature = "rtree") {
            IndexBackend::RTree
        } else {
            IndexBackend::Linear
        };
        assert_eq!(available_backend(), expected);
    }

    #[test]
    fn test_factory_index_works() {
        let mut index = new_spatial_index::<u32>();
        index.insert(1, &Geometry::Polygon(square(0.0, 0.0, 2.0)));
        index.insert(2, &Geometry::Polygon(square(5.0, 5.0, 2.0)));
        let hits = index.intersection(&Geometry::Polygon(square(1.0, 1.0, 0.5)));
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(index.len(), 2);
    }
}
