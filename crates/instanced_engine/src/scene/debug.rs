//! Debug visualisation settings and the culling freeze

use bitflags::bitflags;

use crate::foundation::math::{Mat4, Vec3};

bitflags! {
    /// Visualisation toggles as packed into the scene uniform
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DebugFlags: u32 {
        /// Draw the (frozen) frustum
        const FRUSTUM = 1 << 0;
        /// Draw meshlet bounding spheres
        const MESHLET_BOUNDS = 1 << 1;
        /// Draw meshlet normal cones
        const MESHLET_CONES = 1 << 2;
        /// Culling runs against the frozen camera
        const CULLING_PAUSED = 1 << 3;
    }
}

/// Camera state captured when culling is paused
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrozenCamera {
    /// View matrix
    pub view: Mat4,
    /// Projection matrix
    pub projection: Mat4,
    /// `projection * view`
    pub view_projection: Mat4,
    /// Camera world position
    pub position: Vec3,
    /// Previous view-projection at the time of the freeze
    pub previous_view_projection: Mat4,
}

/// Debug toggles shared between the scene and the debug UI
#[derive(Debug, Clone, PartialEq)]
pub struct DebugSettings {
    /// Show the frustum wireframe
    pub show_frustum: bool,
    /// Show meshlet bounding spheres
    pub show_meshlet_bounds: bool,
    /// Show meshlet normal cones
    pub show_meshlet_cones: bool,
    frustum_opacity: f32,
    bounds_opacity: f32,
    cones_opacity: f32,
    frozen: Option<FrozenCamera>,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            show_frustum: false,
            show_meshlet_bounds: false,
            show_meshlet_cones: false,
            frustum_opacity: 0.5,
            bounds_opacity: 0.25,
            cones_opacity: 0.25,
            frozen: None,
        }
    }
}

impl DebugSettings {
    /// Capture `camera` and pause culling
    ///
    /// While already frozen this is a no-op and the first snapshot is kept.
    /// Returns whether a new snapshot was taken.
    pub fn freeze(&mut self, camera: FrozenCamera) -> bool {
        if self.frozen.is_some() {
            return false;
        }
        log::debug!("Culling paused at camera position {:?}", camera.position);
        self.frozen = Some(camera);
        true
    }

    /// Resume culling against the live camera
    pub fn unfreeze(&mut self) {
        if self.frozen.take().is_some() {
            log::debug!("Culling resumed");
        }
    }

    /// Whether culling currently uses the frozen snapshot
    pub fn pause_culling(&self) -> bool {
        self.frozen.is_some()
    }

    /// Snapshot taken by the last [`Self::freeze`], if still paused
    pub fn frozen(&self) -> Option<&FrozenCamera> {
        self.frozen.as_ref()
    }

    /// Frustum wireframe opacity
    pub fn frustum_opacity(&self) -> f32 {
        self.frustum_opacity
    }

    /// Meshlet bounds opacity
    pub fn bounds_opacity(&self) -> f32 {
        self.bounds_opacity
    }

    /// Meshlet cone opacity
    pub fn cones_opacity(&self) -> f32 {
        self.cones_opacity
    }

    /// Set the frustum wireframe opacity, clamped to `[0, 1]`
    pub fn set_frustum_opacity(&mut self, opacity: f32) {
        self.frustum_opacity = clamp_opacity(opacity);
    }

    /// Set the meshlet bounds opacity, clamped to `[0, 1]`
    pub fn set_bounds_opacity(&mut self, opacity: f32) {
        self.bounds_opacity = clamp_opacity(opacity);
    }

    /// Set the meshlet cone opacity, clamped to `[0, 1]`
    pub fn set_cones_opacity(&mut self, opacity: f32) {
        self.cones_opacity = clamp_opacity(opacity);
    }

    /// Packed flags for the scene uniform
    pub fn flags(&self) -> DebugFlags {
        let mut flags = DebugFlags::empty();
        flags.set(DebugFlags::FRUSTUM, self.show_frustum);
        flags.set(DebugFlags::MESHLET_BOUNDS, self.show_meshlet_bounds);
        flags.set(DebugFlags::MESHLET_CONES, self.show_meshlet_cones);
        flags.set(DebugFlags::CULLING_PAUSED, self.pause_culling());
        flags
    }
}

fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        0.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}
