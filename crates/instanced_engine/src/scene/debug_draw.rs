//! Debug line generation
//!
//! Produces world-space line segments for the frozen frustum and instance
//! bounding spheres. A line pass (not part of this crate) draws them.

use crate::foundation::math::{constants::PI, Mat4, Point3, Vec3};
use crate::render::gpu_types::InstanceData;

use super::debug::DebugSettings;

/// Frustum wireframe colour
pub const FRUSTUM_COLOR: [f32; 3] = [1.0, 0.85, 0.1];

/// Bounding circle colour
pub const BOUNDS_COLOR: [f32; 3] = [0.2, 0.9, 0.4];

/// Segments per bounding circle
pub const CIRCLE_SEGMENTS: usize = 16;

/// Corner index pairs of the 12 frustum edges (near quad, far quad, sides)
#[rustfmt::skip]
const FRUSTUM_EDGES: [(usize, usize); 12] = [
    (0, 1), (1, 3), (3, 2), (2, 0),
    (4, 5), (5, 7), (7, 6), (6, 4),
    (0, 4), (1, 5), (2, 6), (3, 7),
];

/// A coloured world-space line segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugLine {
    /// Segment start
    pub start: Vec3,
    /// Segment end
    pub end: Vec3,
    /// Linear RGBA, alpha taken from the matching opacity setting
    pub color: [f32; 4],
}

/// The eight world-space corners of the volume `view_projection` maps to clip space
///
/// Ordered near then far, each `(-x,-y) (+x,-y) (-x,+y) (+x,+y)`. Returns
/// `None` for a singular matrix.
pub fn frustum_corners(view_projection: &Mat4) -> Option<[Vec3; 8]> {
    let inverse = view_projection.try_inverse()?;
    let mut corners = [Vec3::zeros(); 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        let x = if i & 1 == 0 { -1.0 } else { 1.0 };
        let y = if i & 2 == 0 { -1.0 } else { 1.0 };
        let z = if i & 4 == 0 { 0.0 } else { 1.0 };
        *corner = inverse.transform_point(&Point3::new(x, y, z)).coords;
    }
    Some(corners)
}

/// Wireframe of a frustum: 12 edges
pub fn frustum_lines(view_projection: &Mat4, opacity: f32) -> Vec<DebugLine> {
    let Some(corners) = frustum_corners(view_projection) else {
        log::warn!("Debug frustum skipped: view-projection is singular");
        return Vec::new();
    };
    let color = with_alpha(FRUSTUM_COLOR, opacity);
    FRUSTUM_EDGES
        .iter()
        .map(|&(a, b)| DebugLine {
            start: corners[a],
            end: corners[b],
            color,
        })
        .collect()
}

/// One camera-facing circle per instance bounding sphere
pub fn bounding_circles(instances: &[InstanceData], view: &Mat4, opacity: f32) -> Vec<DebugLine> {
    // rows of the view rotation are the camera axes in world space
    let right = Vec3::new(view.m11, view.m12, view.m13);
    let up = Vec3::new(view.m21, view.m22, view.m23);
    let color = with_alpha(BOUNDS_COLOR, opacity);

    let mut lines = Vec::with_capacity(instances.len() * CIRCLE_SEGMENTS);
    for instance in instances {
        let (center, radius) = (instance.center(), instance.radius());
        let at = |segment: usize| {
            let angle = 2.0 * PI * segment as f32 / CIRCLE_SEGMENTS as f32;
            center + (right * angle.cos() + up * angle.sin()) * radius
        };
        lines.extend((0..CIRCLE_SEGMENTS).map(|segment| DebugLine {
            start: at(segment),
            end: at(segment + 1),
            color,
        }));
    }
    lines
}

/// All lines the current settings ask for
///
/// The frustum is only drawn while culling is frozen, since the live frustum
/// coincides with the screen.
pub fn collect_debug_lines(settings: &DebugSettings, view: &Mat4, instances: &[InstanceData]) -> Vec<DebugLine> {
    let mut lines = Vec::new();
    if settings.show_frustum {
        if let Some(frozen) = settings.frozen() {
            lines.extend(frustum_lines(&frozen.view_projection, settings.frustum_opacity()));
        }
    }
    if settings.show_meshlet_bounds {
        lines.extend(bounding_circles(instances, view, settings.bounds_opacity()));
    }
    lines
}

fn with_alpha(rgb: [f32; 3], alpha: f32) -> [f32; 4] {
    [rgb[0], rgb[1], rgb[2], alpha]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::debug::FrozenCamera;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_frustum_corners_are_unit_box() {
        let corners = frustum_corners(&Mat4::identity()).unwrap();
        assert_relative_eq!(corners[0], Vec3::new(-1.0, -1.0, 0.0));
        assert_relative_eq!(corners[7], Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_frustum_has_twelve_edges() {
        let lines = frustum_lines(&Mat4::identity(), 0.5);
        assert_eq!(lines.len(), 12);
        assert!(lines.iter().all(|line| line.color[3] == 0.5));
        assert!(lines.iter().all(|line| (line.end - line.start).magnitude() > 0.0));
    }

    #[test]
    fn test_singular_matrix_draws_nothing() {
        assert!(frustum_lines(&Mat4::zeros(), 1.0).is_empty());
    }

    #[test]
    fn test_circles_lie_on_sphere() {
        let mut instance: InstanceData = bytemuck::Zeroable::zeroed();
        instance.bounds = [1.0, 2.0, 3.0, 2.0];
        let lines = bounding_circles(&[instance], &Mat4::identity(), 1.0);

        assert_eq!(lines.len(), CIRCLE_SEGMENTS);
        for line in &lines {
            assert_relative_eq!((line.start - instance.center()).magnitude(), 2.0, epsilon = 1e-5);
        }
        assert_relative_eq!(lines[CIRCLE_SEGMENTS - 1].end, lines[0].start, epsilon = 1e-5);
    }

    #[test]
    fn test_collect_respects_toggles() {
        let mut settings = DebugSettings::default();
        settings.show_frustum = true;
        assert!(collect_debug_lines(&settings, &Mat4::identity(), &[]).is_empty());

        settings.freeze(FrozenCamera {
            view: Mat4::identity(),
            projection: Mat4::identity(),
            view_projection: Mat4::identity(),
            position: Vec3::zeros(),
            previous_view_projection: Mat4::identity(),
        });
        assert_eq!(collect_debug_lines(&settings, &Mat4::identity(), &[]).len(), 12);
    }
}
