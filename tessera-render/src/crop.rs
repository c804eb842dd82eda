//! Visibility cropping between stacked levels.
//!
//! A level rendered below another is only visible through the holes of every
//! primary level above it. Walking a level stack from the top, the running
//! crop is the intersection of the holes seen so far.

use geo::Intersects;
use tessera_core::geometry::intersection;
use tessera_core::{empty_area, is_empty, Area, LevelId};

/// Restricts geometry to a visible region, or passes it through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Cropper {
    geometry: Option<Area>,
}

impl Cropper {
    pub fn unrestricted() -> Self {
        Self { geometry: None }
    }

    pub fn restricted_to(geometry: Area) -> Self {
        Self {
            geometry: Some(geometry),
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn geometry(&self) -> Option<&Area> {
        self.geometry.as_ref()
    }

    /// Part of `other` inside the visible region.
    pub fn crop(&self, other: &Area) -> Area {
        match &self.geometry {
            None => other.clone(),
            Some(region) if region.intersects(other) => intersection(region, other),
            Some(_) => empty_area(),
        }
    }
}

/// One sublevel included in a render, with its cropper.
#[derive(Debug, Clone, PartialEq)]
pub struct CropStep {
    pub level: LevelId,
    pub cropper: Cropper,
}

/// Assign croppers to a level stack given top to bottom as
/// `(level, holes)`, where `holes` is `Some` for primary levels.
///
/// A sublevel is cropped once at least two primary levels (itself included)
/// have been seen. The walk stops after the sublevel at which the running
/// crop became empty; everything below is invisible and left out.
pub fn plan_crops<'a>(layers: impl IntoIterator<Item = (LevelId, Option<&'a Area>)>) -> Vec<CropStep> {
    let mut steps = Vec::new();
    let mut running: Option<Area> = None;
    let mut primary_seen = 0usize;

    for (level, holes) in layers {
        if holes.is_some() {
            primary_seen += 1;
        }

        let cropper = match (&running, primary_seen > 1) {
            (Some(crop), true) => Cropper::restricted_to(crop.clone()),
            _ => Cropper::unrestricted(),
        };
        steps.push(CropStep { level, cropper });

        if let Some(holes) = holes {
            let next = match running.take() {
                None => holes.clone(),
                Some(crop) => intersection(&crop, holes),
            };
            let exhausted = is_empty(&next);
            running = Some(next);
            if exhausted {
                break;
            }
        }
    }
    steps
}
