//! Properties of the crop plan over three stacked primary levels.

use geo::Area as _;
use proptest::prelude::*;
use tessera_core::{Bounds, LevelId};
use tessera_render::plan_crops;
use tessera_test_utils::fixtures::square;
use tessera_test_utils::generators::arb_bounds;

fn overlap(a: &Bounds, b: &Bounds) -> f64 {
    let w = (a.maxx.min(b.maxx) - a.minx.max(b.minx)).max(0.0);
    let h = (a.maxy.min(b.maxy) - a.miny.max(b.miny)).max(0.0);
    w * h
}

proptest! {
    #[test]
    fn prop_lower_levels_see_through_every_hole_above(
        top_holes in arb_bounds(50.0),
        middle_holes in arb_bounds(50.0),
    ) {
        let expected = overlap(&top_holes, &middle_holes);
        prop_assume!(expected == 0.0 || expected > 1e-3);

        let h1 = top_holes.to_area();
        let h2 = middle_holes.to_area();
        let ground = square(-500.0, -500.0, 1_000.0);
        let plan = plan_crops([
            (LevelId(3), Some(&h1)),
            (LevelId(2), Some(&h2)),
            (LevelId(1), Some(&ground)),
        ]);

        prop_assert!(!plan[0].cropper.is_restricted());
        let middle = plan[1].cropper.geometry().map(|g| g.unsigned_area());
        prop_assert!((middle.unwrap_or(-1.0) - h1.unsigned_area()).abs() < 1e-6);

        if expected == 0.0 {
            prop_assert_eq!(plan.len(), 2);
        } else {
            prop_assert_eq!(plan.len(), 3);
            let bottom = plan[2].cropper.geometry().map(|g| g.unsigned_area());
            prop_assert!((bottom.unwrap_or(-1.0) - expected).abs() < 1e-6);
        }
    }
}
