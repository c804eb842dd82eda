//! Triangle mesh of a cropped level: floors plus vertical wall faces.

use geo::{Coord, TriangulateEarcut};
use tessera_core::{AltitudeArea, LevelGeometrySet, LevelMesh};

use crate::interpolate::HeightInterpolator;

/// Floor altitude of an area at a point; ramps slope between their two
/// reference points.
pub fn altitude_at(area: &AltitudeArea, point: Coord<f64>) -> f64 {
    let (Some(alt2), Some(p1), Some(p2)) = (area.altitude2, area.point1, area.point2) else {
        return area.altitude;
    };
    let axis = p2.0 - p1.0;
    let length_sq = axis.x * axis.x + axis.y * axis.y;
    if length_sq <= f64::EPSILON {
        return area.altitude;
    }
    let rel = point - p1.0;
    let t = ((rel.x * axis.x + rel.y * axis.y) / length_sq).clamp(0.0, 1.0);
    area.altitude + t * (alt2 - area.altitude)
}

#[derive(Default)]
struct MeshBuilder {
    mesh: LevelMesh,
}

impl MeshBuilder {
    fn vertex(&mut self, x: f64, y: f64, z: f64) -> u32 {
        self.mesh.vertices.push([x, y, z]);
        (self.mesh.vertices.len() - 1) as u32
    }

    fn floor(&mut self, area: &AltitudeArea) {
        for polygon in &area.geometry.0 {
            let raw = polygon.earcut_triangles_raw();
            let offset = self.mesh.vertices.len() as u32;
            for xy in raw.vertices.chunks_exact(2) {
                let z = altitude_at(area, Coord { x: xy[0], y: xy[1] });
                self.vertex(xy[0], xy[1], z);
            }
            for tri in raw.triangle_indices.chunks_exact(3) {
                self.mesh.faces.push([
                    offset + tri[0] as u32,
                    offset + tri[1] as u32,
                    offset + tri[2] as u32,
                ]);
            }
        }
    }

    fn wall_quad(&mut self, a: Coord<f64>, b: Coord<f64>, bottom: f64, top: (f64, f64)) {
        let a0 = self.vertex(a.x, a.y, bottom);
        let b0 = self.vertex(b.x, b.y, bottom);
        let b1 = self.vertex(b.x, b.y, top.1);
        let a1 = self.vertex(a.x, a.y, top.0);
        self.mesh.faces.push([a0, b0, b1]);
        self.mesh.faces.push([a0, b1, a1]);
    }
}

/// Build the mesh of a cropped level.
///
/// Walls rise from the level's lowest floor to the floor of the level above
/// when an interpolator for it is given, or to `base_altitude +
/// default_height` otherwise.
pub fn build_mesh(set: &LevelGeometrySet, ceiling: Option<&HeightInterpolator>) -> LevelMesh {
    let mut builder = MeshBuilder::default();

    for area in &set.altitude_areas {
        builder.floor(area);
    }

    let default_top = set.level.base_altitude + set.level.default_height;
    let top_at = |c: Coord<f64>| match ceiling {
        Some(interp) => interp.altitude_at(c.x, c.y).max(set.min_altitude),
        None => default_top,
    };
    for polygon in &set.walls.0 {
        for line in polygon.exterior().lines() {
            if line.start == line.end {
                continue;
            }
            builder.wall_quad(line.start, line.end, set.min_altitude, (top_at(line.start), top_at(line.end)));
        }
    }

    builder.mesh
}
