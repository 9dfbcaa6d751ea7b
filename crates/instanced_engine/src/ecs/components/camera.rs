//! Camera components
//!
//! The camera's view matrix comes from the owning entity's world transform,
//! so cameras can be parented like any other node.

use crate::ecs::Component;
use crate::foundation::math::{utils, Mat4, Mat4Ext};

/// Perspective projection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CameraComponent {
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Distance to near clipping plane
    pub near: f32,
    /// Distance to far clipping plane
    pub far: f32,
    /// Vertical field of view in radians
    pub fov_y: f32,
}

impl Component for CameraComponent {}

impl CameraComponent {
    /// Create a perspective camera; `fov_degrees` is converted to radians
    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            aspect,
            near,
            far,
            fov_y: utils::deg_to_rad(fov_degrees),
        }
    }

    /// Update camera aspect ratio for viewport changes
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::info!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// Projection including the Vulkan axis flip
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov_y, self.aspect, self.near, self.far) * Mat4::vulkan_coordinate_transform()
    }
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self::perspective(60.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

/// Marker selecting the camera used for rendering and culling
#[derive(Debug, Clone, Copy, Default)]
pub struct MainCamera;

impl Component for MainCamera {}
