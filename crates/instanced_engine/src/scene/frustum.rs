//! Frustum planes and sphere visibility
//!
//! Planes are extracted from a view-projection matrix with the Gribb-Hartmann
//! row combination. The near plane is `row3 + row2` for the same formula the
//! shaders use, even though Vulkan depth is `[0, 1]`; only the four side planes
//! take part in culling so the difference never matters.

use crate::foundation::math::{utils, Mat4, Point3, Vec3, Vec4};

/// Index of the left plane
pub const LEFT: usize = 0;
/// Index of the right plane
pub const RIGHT: usize = 1;
/// Index of the bottom plane
pub const BOTTOM: usize = 2;
/// Index of the top plane
pub const TOP: usize = 3;
/// Index of the near plane
pub const NEAR: usize = 4;
/// Index of the far plane
pub const FAR: usize = 5;

/// Number of planes used by the visibility test (left, right, bottom, top)
pub const CULLING_PLANE_COUNT: usize = 4;

/// Six frustum planes as `(nx, ny, nz, d)`, normal pointing inwards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Planes in the order left, right, bottom, top, near, far
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract and normalize the planes of a view-projection matrix
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        Self {
            planes: extract_frustum_planes(view_projection),
        }
    }

    /// Sphere test against the four side planes
    pub fn is_sphere_visible(&self, center: &Vec3, radius: f32) -> bool {
        is_visible(&self.planes, center, radius)
    }

    /// Planes in the uniform layout
    pub fn to_gpu(&self) -> [[f32; 4]; 6] {
        self.planes.map(|plane| plane.into())
    }
}

impl Default for Frustum {
    fn default() -> Self {
        Self::from_view_projection(&Mat4::identity())
    }
}

/// Extract the six planes of `view_projection`, each normalized by its xyz length
///
/// Degenerate planes (zero-length normal) are returned unnormalized.
pub fn extract_frustum_planes(view_projection: &Mat4) -> [Vec4; 6] {
    let row = |i: usize| -> Vec4 { view_projection.row(i).transpose() };
    let (x, y, z, w) = (row(0), row(1), row(2), row(3));

    let mut planes = [w + x, w - x, w + y, w - y, w + z, w - z];
    for plane in &mut planes {
        let length = plane.xyz().magnitude();
        if length > f32::EPSILON {
            *plane /= length;
        }
    }
    planes
}

/// Whether a sphere lies at least partly inside the left/right/bottom/top planes
///
/// Near and far are ignored, so anything behind the camera but inside the
/// side wedge passes.
pub fn is_visible(planes: &[Vec4; 6], center: &Vec3, radius: f32) -> bool {
    planes[..CULLING_PLANE_COUNT]
        .iter()
        .all(|plane| plane.xyz().dot(center) + plane.w + radius >= 0.0)
}

/// World-space bounding sphere of a mesh under `world_matrix`
///
/// The radius is scaled by the largest axis scale, which over-estimates under
/// non-uniform scale.
pub fn world_bounding_sphere(world_matrix: &Mat4, centroid: &Vec3, radius: f32) -> (Vec3, f32) {
    let center = world_matrix.transform_point(&Point3::from(*centroid));
    (center.coords, radius * utils::max_axis_scale(world_matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_planes_are_unit_box() {
        let planes = extract_frustum_planes(&Mat4::identity());

        assert_relative_eq!(planes[LEFT], Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_relative_eq!(planes[RIGHT], Vec4::new(-1.0, 0.0, 0.0, 1.0));
        assert_relative_eq!(planes[BOTTOM], Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert_relative_eq!(planes[TOP], Vec4::new(0.0, -1.0, 0.0, 1.0));
        assert_relative_eq!(planes[NEAR], Vec4::new(0.0, 0.0, 1.0, 1.0));
        assert_relative_eq!(planes[FAR], Vec4::new(0.0, 0.0, -1.0, 1.0));
    }

    #[test]
    fn test_sphere_visibility_identity() {
        let planes = extract_frustum_planes(&Mat4::identity());

        assert!(is_visible(&planes, &Vec3::zeros(), 0.0));
        assert!(!is_visible(&planes, &Vec3::new(3.0, 0.0, 0.0), 0.5));
        // touching the right plane from outside still counts
        assert!(is_visible(&planes, &Vec3::new(1.5, 0.0, 0.0), 0.5));
    }

    #[test]
    fn test_near_far_ignored() {
        let planes = extract_frustum_planes(&Mat4::identity());
        assert!(is_visible(&planes, &Vec3::new(0.0, 0.0, 50.0), 0.1));
        assert!(is_visible(&planes, &Vec3::new(0.0, 0.0, -50.0), 0.1));
    }

    #[test]
    fn test_planes_are_normalized_for_perspective() {
        let projection = Mat4::perspective(utils::deg_to_rad(70.0), 16.0 / 9.0, 0.1, 500.0)
            * Mat4::vulkan_coordinate_transform();
        let view = Mat4::look_at(Vec3::new(0.0, 2.0, 10.0), Vec3::zeros(), Vec3::y());
        let frustum = Frustum::from_view_projection(&(projection * view));

        for plane in &frustum.planes[..CULLING_PLANE_COUNT] {
            assert_relative_eq!(plane.xyz().magnitude(), 1.0, epsilon = 1e-5);
        }
        assert!(frustum.is_sphere_visible(&Vec3::zeros(), 1.0));
        assert!(!frustum.is_sphere_visible(&Vec3::new(200.0, 0.0, 0.0), 1.0));
    }

    #[test]
    fn test_world_bounding_sphere_uses_largest_scale() {
        let world = Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 4.0, 2.0));
        let (center, radius) = world_bounding_sphere(&world, &Vec3::new(0.0, 1.0, 0.0), 1.5);

        assert_relative_eq!(center, Vec3::new(0.0, 4.0, -5.0), epsilon = 1e-6);
        assert_relative_eq!(radius, 6.0, epsilon = 1e-6);
    }
}
