//! Math utilities and types
//!
//! Thin aliases over nalgebra plus the handful of matrix helpers the scene and
//! culling code share with the shaders.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::{constants, Mat3, Mat4, Vec3};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Build a TRS matrix (translation * rotation * scale)
    pub fn compose_trs(translation: &Vec3, rotation: &super::Quat, scale: &Vec3) -> Mat4 {
        Mat4::new_translation(translation)
            * rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(scale)
    }

    /// Largest per-axis scale factor of the upper 3x3 block.
    ///
    /// Used to grow a local bounding radius into world space, which stays
    /// conservative under non-uniform scale.
    pub fn max_axis_scale(matrix: &Mat4) -> f32 {
        let x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
        x.max(y).max(z)
    }

    /// Inverse-transpose of the upper 3x3 block, for transforming normals.
    ///
    /// Falls back to identity for singular matrices (zero scale).
    pub fn normal_matrix(matrix: &Mat4) -> Mat3 {
        let upper: Mat3 = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        match upper.try_inverse() {
            Some(inverse) => inverse.transpose(),
            None => {
                log::warn!("Model matrix is not invertible, using identity for normal matrix");
                Mat3::identity()
            }
        }
    }

    /// Column-major 3x3 padded to three vec4 columns (std140/std430 mat3 layout)
    pub fn mat3_to_padded_columns(matrix: &Mat3) -> [[f32; 4]; 3] {
        [
            [matrix.m11, matrix.m21, matrix.m31, 0.0],
            [matrix.m12, matrix.m22, matrix.m32, 0.0],
            [matrix.m13, matrix.m23, matrix.m33, 0.0],
        ]
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create a perspective projection matrix (depth mapped to [0, 1])
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Create the intermediate coordinate system transformation for Vulkan
    fn vulkan_coordinate_transform() -> Mat4;

    /// Column-major array as consumed by GLSL
    fn to_cols_array(&self) -> [[f32; 4]; 4];
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        // P = [a⁻¹/tan(φ/2)    0              0                    0           ]
        //     [0               1/tan(φ/2)     0                    0           ]
        //     [0               0              f/(f-n)              -nf/(f-n)   ]
        //     [0               0              1                    0           ]
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn vulkan_coordinate_transform() -> Mat4 {
        // Flips Y (Vulkan NDC is Y-down) and Z (camera looks down -Z in view space)
        Mat4::new(
            1.0,  0.0,  0.0, 0.0,
            0.0, -1.0,  0.0, 0.0,
            0.0,  0.0, -1.0, 0.0,
            0.0,  0.0,  0.0, 1.0,
        )
    }

    fn to_cols_array(&self) -> [[f32; 4]; 4] {
        (*self).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_max_axis_scale_picks_largest_column() {
        let m = utils::compose_trs(
            &Vec3::new(5.0, 0.0, 0.0),
            &Quat::from_axis_angle(&Vec3::y_axis(), 0.7),
            &Vec3::new(1.0, 3.0, 2.0),
        );
        assert_relative_eq!(utils::max_axis_scale(&m), 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_normal_matrix_non_uniform_scale() {
        let m = Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 4.0, 1.0));
        let n = utils::normal_matrix(&m);
        assert_relative_eq!(n.m11, 0.5, epsilon = 1e-6);
        assert_relative_eq!(n.m22, 0.25, epsilon = 1e-6);
        assert_relative_eq!(n.m33, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normal_matrix_singular_falls_back_to_identity() {
        let m = Mat4::new_nonuniform_scaling(&Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(utils::normal_matrix(&m), Mat3::identity());
    }

    #[test]
    fn test_cols_array_is_column_major() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let cols = m.to_cols_array();
        assert_eq!(cols[3], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_perspective_depth_range() {
        let p = Mat4::perspective(utils::deg_to_rad(60.0), 1.0, 0.1, 100.0);
        let near = p * Vec4::new(0.0, 0.0, 0.1, 1.0);
        let far = p * Vec4::new(0.0, 0.0, 100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }
}
