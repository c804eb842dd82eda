//! Linear-scan fallback index.

use std::collections::{BTreeSet, HashMap};

use geo::{Geometry, Rect};

use crate::{part_boxes, rects_intersect, IndexKey, SpatialIndex};

/// Stores part boxes per id and scans all of them on every query.
#[derive(Debug, Clone)]
pub struct LinearIndex<K: IndexKey> {
    entries: HashMap<K, Vec<Rect<f64>>>,
}

impl<K: IndexKey> Default for LinearIndex<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: IndexKey> LinearIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: IndexKey> SpatialIndex<K> for LinearIndex<K> {
    fn insert(&mut self, id: K, geometry: &Geometry<f64>) {
        let boxes = part_boxes(geometry);
        if boxes.is_empty() {
            return;
        }
        self.entries.entry(id).or_default().extend(boxes);
    }

    fn delete(&mut self, id: K) {
        self.entries.remove(&id);
    }

    fn intersection(&self, geometry: &Geometry<f64>) -> BTreeSet<K> {
        let query = part_boxes(geometry);
        self.entries
            .iter()
            .filter(|(_, boxes)| {
                boxes
                    .iter()
                    .any(|stored| query.iter().any(|q| rects_intersect(stored, q)))
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
