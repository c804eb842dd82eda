//! Nearest-neighbour altitude lookup.

use tessera_core::geometry::rings;
use tessera_core::AltitudeArea;

/// Altitude at a point, taken from the nearest known ring vertex.
///
/// Built from the floor of the primary level above (plus any intermediate
/// levels in between) and used to find how high the walls of the level below
/// should reach.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightInterpolator {
    samples: Vec<[f64; 3]>,
}

impl HeightInterpolator {
    /// `None` when the areas have no vertices at all.
    pub fn from_areas<'a>(areas: impl IntoIterator<Item = &'a AltitudeArea>) -> Option<Self> {
        let samples: Vec<[f64; 3]> = areas
            .into_iter()
            .flat_map(|area| {
                rings(&area.geometry)
                    .flat_map(|ring| ring.coords())
                    .map(move |c| [c.x, c.y, area.altitude])
                    .collect::<Vec<_>>()
            })
            .collect();
        (!samples.is_empty()).then_some(Self { samples })
    }

    pub fn altitude_at(&self, x: f64, y: f64) -> f64 {
        let mut best = self.samples[0];
        let mut best_dist = f64::INFINITY;
        for sample in &self.samples {
            let dist = (sample[0] - x).powi(2) + (sample[1] - y).powi(2);
            if dist < best_dist {
                best_dist = dist;
                best = *sample;
            }
        }
        best[2]
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Bounds;

    #[test]
    fn test_nearest_vertex_wins() {
        let low = AltitudeArea::new(Bounds::new(0.0, 0.0, 1.0, 1.0).to_area(), 2.0);
        let high = AltitudeArea::new(Bounds::new(10.0, 0.0, 11.0, 1.0).to_area(), 6.0);
        let interp = HeightInterpolator::from_areas([&low, &high]).expect("areas have vertices");

        assert_eq!(interp.altitude_at(0.2, 0.2), 2.0);
        assert_eq!(interp.altitude_at(12.0, 3.0), 6.0);
        assert_eq!(interp.altitude_at(4.0, 0.5), 2.0);
    }

    #[test]
    fn test_no_vertices() {
        let empty = AltitudeArea::new(tessera_core::empty_area(), 1.0);
        assert!(HeightInterpolator::from_areas([&empty]).is_none());
    }
}
