//! Back-to-front ordering of translucent runs

use crate::foundation::math::Vec3;
use crate::spatial::Aabb;

/// Distance of a box's center along the view direction
pub fn view_depth(bounds: &Aabb, origin: Vec3, forward: Vec3) -> f32 {
    (bounds.center() - origin).dot(&forward)
}

/// Order `items` farthest first by their `depths`, keeping the two in step
///
/// Shrinking-step insertion sort with steps 4, 2, 1. Runs are short (one
/// cell's translucents) and usually nearly sorted frame to frame.
pub fn sort_back_to_front<T>(items: &mut [T], depths: &mut [f32]) {
    let count = items.len().min(depths.len());
    if count <= 1 {
        return;
    }

    let mut step = 4;
    while step > 0 {
        let mut i = 0;
        while i + step < count {
            if depths[i] < depths[i + step] {
                items.swap(i, i + step);
                depths.swap(i, i + step);
                // Walk back until the moved item settles
                i = i.saturating_sub(step);
            } else {
                i += step;
            }
        }
        step /= 2;
    }
}
