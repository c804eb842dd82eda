//! Tessera Render - Level Compositing
//!
//! Turns the raw per-level geometry of a [`MapSource`] into one
//! [`RenderData`](tessera_core::RenderData) and one composite history per
//! primary level, and publishes them together with a cache package.

pub mod compositor;
pub mod crop;
pub mod interpolate;
pub mod mesh;
pub mod rebuild;
pub mod source;

pub use compositor::{crop_level, LevelGeometryCompositor, LevelOutput};
pub use crop::{plan_crops, CropStep, Cropper};
pub use interpolate::HeightInterpolator;
pub use mesh::build_mesh;
pub use rebuild::{RebuildSummary, Rebuilder};
pub use source::MapSource;
