//! Math types
//!
//! nalgebra aliases shared by bounds, frustums and fades, plus the rigid
//! transform renderable owners report each frame.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector3, Vector4};

/// 3D vector
pub type Vec3 = Vector3<f32>;

/// Homogeneous vector, used for plane coefficients
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix
pub type Mat4 = Matrix4<f32>;

/// 3D point
pub type Point3 = nalgebra::Point3<f32>;

/// Unit quaternion rotation
pub type Quat = Unit<Quaternion<f32>>;

/// Local-to-world placement of a renderable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// World position of the local origin
    pub position: Vec3,
    /// Orientation
    pub rotation: Quat,
    /// Per-axis scale, applied before rotation
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self { position: Vec3::zeros(), rotation: Quat::identity(), scale: Vec3::repeat(1.0) }
    }
}

impl Transform {
    /// No translation, rotation or scale
    pub fn identity() -> Self {
        Self::default()
    }

    /// Pure translation
    pub fn from_position(position: Vec3) -> Self {
        Self { position, ..Self::default() }
    }

    /// Replace the rotation
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Replace the scale
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Whether boxes stay axis-aligned under this transform
    pub fn is_axis_aligned(&self) -> bool {
        self.rotation == Quat::identity()
    }

    /// Homogeneous matrix: scale, then rotate, then translate
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Map a local point to world space
    pub fn transform_point(&self, point: Point3) -> Point3 {
        let scaled = point.coords.component_mul(&self.scale);
        Point3::from(self.rotation * scaled + self.position)
    }
}

/// Angle constants
pub mod constants {
    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = std::f32::consts::PI / 180.0;
}
