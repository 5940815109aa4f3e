//! Alpha fades
//!
//! An object's final alpha is its base alpha scaled by the minimum of up to
//! three fade factors: distance fade, the level's screen-size fade and the
//! global screen-size fade. Each factor is in `[0, 1]`, and 1 when the fade
//! does not apply.

use super::view::ScreenSizeInfo;
use crate::foundation::math::Vec3;
use crate::scene::{AlphaState, DistanceFadeMode};
use crate::spatial::Aabb;

/// Distance fade factor of an object with bounds `bounds` seen from `origin`
///
/// `distance_factor_sq` scales the squared distance (FOV and CPU tier).
/// Quadratic in distance between `fade_start` and `fade_end`; disabled when
/// `fade_end` is zero.
pub fn distance_fade(state: &AlphaState, bounds: &Aabb, origin: Vec3, distance_factor_sq: f32) -> f32 {
    if state.fade_end == 0.0 {
        return 1.0;
    }

    let distance_sq = distance_factor_sq
        * match state.distance_fade_mode {
            DistanceFadeMode::Center => (bounds.center() - origin).norm_squared(),
            DistanceFadeMode::Bounds => bounds.distance_squared_to_point(origin),
        };

    let start_sq = state.fade_start * state.fade_start;
    if distance_sq <= start_sq {
        return 1.0;
    }
    let end_sq = state.fade_end * state.fade_end;
    if distance_sq >= end_sq {
        return 0.0;
    }
    (end_sq - distance_sq) / (end_sq - start_sq)
}

/// Projected height in pixels of a sphere at `center` with `radius`
pub fn screen_size(center: Vec3, radius: f32, info: &ScreenSizeInfo) -> f32 {
    let m = &info.view_proj;
    let up = info.view_up * radius;

    let o_dot_y = m[(1, 0)] * center.x + m[(1, 1)] * center.y + m[(1, 2)] * center.z + m[(1, 3)];
    let up_dot_y = m[(1, 0)] * up.x + m[(1, 1)] * up.y + m[(1, 2)] * up.z;
    let o_dot_w = m[(3, 0)] * center.x + m[(3, 1)] * center.y + m[(3, 2)] * center.z + m[(3, 3)];
    let up_dot_w = m[(3, 0)] * up.x + m[(3, 1)] * up.y + m[(3, 2)] * up.z;

    let project = |y: f32, w: f32| if w >= 0.001 { y / w } else { y * 1000.0 };
    let y0 = project(o_dot_y + up_dot_y, o_dot_w + up_dot_w);
    let y1 = project(o_dot_y - up_dot_y, o_dot_w - up_dot_w);

    // Clip-space y spans [-1, 1]
    info.viewport_height * (y1 - y0).abs() * 0.5
}

/// Screen-size fade factor for the width range `(min_width, max_width)`
///
/// Objects narrower than `min_width` are fully faded, wider than `max_width`
/// fully visible. Disabled when `min_width` is not positive or the object's
/// `fade_scale` is not positive.
pub fn screen_fade(
    state: &AlphaState,
    center: Vec3,
    radius: f32,
    info: &ScreenSizeInfo,
    (min_width, max_width): (f32, f32),
) -> f32 {
    if min_width <= 0.0 || state.fade_scale <= 0.0 {
        return 1.0;
    }
    let max_width = max_width.max(min_width);
    let falloff = if max_width > min_width { 1.0 / (max_width - min_width) } else { 1.0 };

    // Widths were historically measured at half scale
    let width = 2.0 * screen_size(center, radius, info) / state.fade_scale;

    if width <= min_width {
        0.0
    } else if width < max_width {
        falloff * (width - min_width)
    } else {
        1.0
    }
}

/// Apply a fade factor to a base alpha
pub fn apply_fade(alpha: u8, factor: f32) -> u8 {
    (f32::from(alpha) * factor).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use approx::assert_relative_eq;

    fn fading(start: f32, end: f32) -> AlphaState {
        AlphaState { fade_start: start, fade_end: end, ..AlphaState::default() }
    }

    fn unit_box_at(x: f32) -> Aabb {
        Aabb::from_center_extents(Vec3::new(x, 0.0, 0.0), Vec3::repeat(0.5))
    }

    #[test]
    fn test_distance_fade_is_monotonic() {
        let state = fading(100.0, 200.0);
        let mut previous = 1.0;
        for step in 0..=30 {
            let x = step as f32 * 10.0;
            let factor = distance_fade(&state, &unit_box_at(x), Vec3::zeros(), 1.0);
            assert!(factor <= previous, "fade rose at {x}");
            assert!((0.0..=1.0).contains(&factor));
            previous = factor;
        }

        assert_relative_eq!(distance_fade(&state, &unit_box_at(50.0), Vec3::zeros(), 1.0), 1.0);
        assert_relative_eq!(distance_fade(&state, &unit_box_at(200.0), Vec3::zeros(), 1.0), 0.0);
        assert_relative_eq!(distance_fade(&state, &unit_box_at(250.0), Vec3::zeros(), 1.0), 0.0);
    }

    #[test]
    fn test_distance_fade_quadratic_midpoint() {
        let state = fading(0.0, 100.0);
        // (100^2 - 50^2) / 100^2
        assert_relative_eq!(distance_fade(&state, &unit_box_at(50.0), Vec3::zeros(), 1.0), 0.75);
        // Doubling the distance scale pushes the object to the end radius
        assert_relative_eq!(distance_fade(&state, &unit_box_at(50.0), Vec3::zeros(), 4.0), 0.0);
    }

    #[test]
    fn test_distance_fade_modes() {
        let mut state = fading(10.0, 20.0);
        let wide = Aabb::new(Vec3::new(5.0, -1.0, -1.0), Vec3::new(45.0, 1.0, 1.0));
        assert_relative_eq!(distance_fade(&state, &wide, Vec3::zeros(), 1.0), 0.0);

        state.distance_fade_mode = DistanceFadeMode::Bounds;
        assert_relative_eq!(distance_fade(&state, &wide, Vec3::zeros(), 1.0), 1.0);

        state.fade_end = 0.0;
        state.distance_fade_mode = DistanceFadeMode::Center;
        assert_relative_eq!(distance_fade(&state, &wide, Vec3::zeros(), 1.0), 1.0);
    }

    #[test]
    fn test_screen_size_identity_projection() {
        let info = ScreenSizeInfo {
            view_proj: Mat4::identity(),
            viewport_height: 100.0,
            view_up: Vec3::new(0.0, 1.0, 0.0),
        };
        assert_relative_eq!(screen_size(Vec3::new(3.0, 2.0, 1.0), 0.5, &info), 50.0);
    }

    #[test]
    fn test_screen_fade_ranges() {
        let info = ScreenSizeInfo {
            view_proj: Mat4::identity(),
            viewport_height: 100.0,
            view_up: Vec3::new(0.0, 1.0, 0.0),
        };
        let state = AlphaState { fade_scale: 1.0, ..AlphaState::default() };

        // Width is 2 * 100 * r
        assert_relative_eq!(screen_fade(&state, Vec3::zeros(), 0.1, &info, (10.0, 30.0)), 0.5);
        assert_relative_eq!(screen_fade(&state, Vec3::zeros(), 0.04, &info, (10.0, 30.0)), 0.0);
        assert_relative_eq!(screen_fade(&state, Vec3::zeros(), 0.5, &info, (10.0, 30.0)), 1.0);
        assert_relative_eq!(screen_fade(&state, Vec3::zeros(), 0.04, &info, (0.0, 30.0)), 1.0);

        let unscaled = AlphaState::default();
        assert_relative_eq!(screen_fade(&unscaled, Vec3::zeros(), 0.04, &info, (10.0, 30.0)), 1.0);
    }

    #[test]
    fn test_apply_fade() {
        assert_eq!(apply_fade(200, 0.5), 100);
        assert_eq!(apply_fade(255, 1.0), 255);
        assert_eq!(apply_fade(255, 0.0), 0);
    }
}
