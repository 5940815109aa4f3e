//! Axis-aligned bounding boxes

use crate::foundation::math::{Point3, Transform, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// An inverted box that contains nothing
    ///
    /// Its union with any box is that box, and it compares unequal to every
    /// real box, so the first placement of an object always inserts.
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::MAX),
            max: Vec3::repeat(-f32::MAX),
        }
    }

    /// True when min exceeds max on any axis
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Full size along each axis
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Enclosed volume; zero for empty boxes
    pub fn volume(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.size();
        size.x * size.y * size.z
    }

    /// Squared length of the min-to-max diagonal
    pub fn diagonal_length_squared(&self) -> f32 {
        self.size().norm_squared()
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB fully contains another
    pub fn contains(&self, other: &Self) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Smallest box containing both
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Expand outward to the enclosing multiple of `granularity`
    pub fn snapped(&self, granularity: f32) -> Self {
        let snap_down = |v: f32| (v / granularity).floor() * granularity;
        let snap_up = |v: f32| (v / granularity).ceil() * granularity;
        Self {
            min: self.min.map(snap_down),
            max: self.max.map(snap_up),
        }
    }

    /// World-space box enclosing this local-space box under `transform`
    pub fn transformed(&self, transform: &Transform) -> Self {
        if self.is_empty() {
            return *self;
        }
        if transform.is_axis_aligned() {
            let a = transform.transform_point(Point3::from(self.min)).coords;
            let b = transform.transform_point(Point3::from(self.max)).coords;
            return Self { min: a.inf(&b), max: a.sup(&b) };
        }
        let matrix = transform.to_matrix();
        let mut result = Self::empty();
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point(&corner).coords;
            result.min = result.min.inf(&p);
            result.max = result.max.sup(&p);
        }
        result
    }

    /// Squared distance from a point to the nearest point of the box
    pub fn distance_squared_to_point(&self, point: Vec3) -> f32 {
        let clamped = point.sup(&self.min).inf(&self.max);
        (point - clamped).norm_squared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_box_is_identity_for_union() {
        let empty = Aabb::empty();
        let real = Aabb::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));

        assert!(empty.is_empty());
        assert_eq!(empty.union(&real), real);
        assert_eq!(empty.volume(), 0.0);
        assert_ne!(empty, real);
    }

    #[test]
    fn test_snapped_expands_outward() {
        let b = Aabb::new(Vec3::new(1.0, -1.0, 33.0), Vec3::new(2.0, 31.0, 40.0));
        let s = b.snapped(32.0);

        assert_eq!(s.min, Vec3::new(0.0, -32.0, 32.0));
        assert_eq!(s.max, Vec3::new(32.0, 32.0, 64.0));
        assert!(s.contains(&b));
    }

    #[test]
    fn test_transformed_translates_and_scales() {
        let local = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let transform = Transform {
            position: Vec3::new(10.0, 0.0, 0.0),
            scale: Vec3::new(2.0, 1.0, 1.0),
            ..Transform::default()
        };

        let world = local.transformed(&transform);
        assert_relative_eq!(world.min.x, 8.0);
        assert_relative_eq!(world.max.x, 12.0);
        assert_relative_eq!(world.max.y, 1.0);
    }

    #[test]
    fn test_distance_squared_to_point() {
        let b = Aabb::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(b.distance_squared_to_point(Vec3::new(0.5, 0.5, 0.5)), 0.0);
        assert_relative_eq!(b.distance_squared_to_point(Vec3::new(3.0, 0.5, 0.5)), 4.0);
    }
}
