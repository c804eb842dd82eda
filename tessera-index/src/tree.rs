//! R-tree backed index.

use std::collections::{BTreeSet, HashMap};

use geo::{Geometry, Rect};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{Envelope, RTree, RTreeObject, SelectionFunction, AABB};

use crate::{part_boxes, IndexKey, SpatialIndex};

type Entry<K> = GeomWithData<Rectangle<[f64; 2]>, K>;

fn entry<K: IndexKey>(id: K, rect: &Rect<f64>) -> Entry<K> {
    GeomWithData::new(
        Rectangle::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        id,
    )
}

fn envelope(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Descends only into nodes whose envelope touches the query box.
struct TouchingEnvelope(AABB<[f64; 2]>);

impl<K: IndexKey> SelectionFunction<Entry<K>> for TouchingEnvelope {
    fn should_unpack_parent(&self, parent: &AABB<[f64; 2]>) -> bool {
        self.0.intersects(parent)
    }

    fn should_unpack_leaf(&self, leaf: &Entry<K>) -> bool {
        self.0.intersects(&leaf.envelope())
    }
}

/// Bounding boxes of every part live in one R-tree; the ids own a copy of
/// their boxes so deletion can find them again.
pub struct RTreeIndex<K: IndexKey> {
    tree: RTree<Entry<K>>,
    boxes: HashMap<K, Vec<Rect<f64>>>,
}

impl<K: IndexKey> Default for RTreeIndex<K> {
    fn default() -> Self {
        Self {
            tree: RTree::new(),
            boxes: HashMap::new(),
        }
    }
}

impl<K: IndexKey> RTreeIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: IndexKey> SpatialIndex<K> for RTreeIndex<K> {
    fn insert(&mut self, id: K, geometry: &Geometry<f64>) {
        let parts = part_boxes(geometry);
        if parts.is_empty() {
            return;
        }
        for rect in &parts {
            self.tree.insert(entry(id, rect));
        }
        self.boxes.entry(id).or_default().extend(parts);
    }

    fn delete(&mut self, id: K) {
        let Some(parts) = self.boxes.remove(&id) else {
            return;
        };
        for rect in &parts {
            self.tree.remove(&entry(id, rect));
        }
    }

    fn intersection(&self, geometry: &Geometry<f64>) -> BTreeSet<K> {
        let mut found = BTreeSet::new();
        for rect in part_boxes(geometry) {
            let selection = TouchingEnvelope(envelope(&rect));
            found.extend(
                self.tree
                    .locate_with_selection_function(selection)
                    .map(|hit| hit.data),
            );
        }
        found
    }

    fn len(&self) -> usize {
        self.boxes.len()
    }
}
