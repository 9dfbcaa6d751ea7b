//! Transform component for the ECS system
//!
//! Local TRS data plus a cached world matrix. The cache is only trusted while
//! `dirty` is false; every setter raises the flag and the propagation pass in
//! [`crate::scene::transform_propagation`] clears it.

use crate::ecs::Component;
use crate::foundation::math::{utils, Mat4, Quat, Vec3};

/// ECS Transform component
///
/// Fields are private so that no mutation can skip the dirty flag.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformComponent {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    world_matrix: Mat4,
    dirty: bool,
}

impl Component for TransformComponent {}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            translation: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            world_matrix: Mat4::identity(),
            dirty: true,
        }
    }
}

impl TransformComponent {
    /// Identity transform, pending its first propagation
    pub fn identity() -> Self {
        Self::default()
    }

    /// Transform of the scene root: identity and already clean
    pub(crate) fn root() -> Self {
        Self {
            dirty: false,
            ..Self::default()
        }
    }

    /// Create from position only
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Create from full transform specification
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
            ..Default::default()
        }
    }

    /// Builder pattern: Set rotation from quaternion
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.set_rotation(rotation);
        self
    }

    /// Builder pattern: Set scale (uniform)
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.set_scale(Vec3::new(scale, scale, scale));
        self
    }

    /// Builder pattern: Set scale (non-uniform)
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.set_scale(scale);
        self
    }

    /// Local translation
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    /// Local rotation
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Local scale
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Set local translation
    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.dirty = true;
    }

    /// Offset local translation
    pub fn translate(&mut self, offset: Vec3) {
        self.set_translation(self.translation + offset);
    }

    /// Set local rotation
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.dirty = true;
    }

    /// Set local scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty = true;
    }

    /// Local TRS matrix
    pub fn local_matrix(&self) -> Mat4 {
        utils::compose_trs(&self.translation, &self.rotation, &self.scale)
    }

    /// Cached world matrix; stale while [`Self::is_dirty`] is true
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// World-space position taken from the cached world matrix
    pub fn world_position(&self) -> Vec3 {
        Vec3::new(self.world_matrix.m14, self.world_matrix.m24, self.world_matrix.m34)
    }

    /// Whether the cached world matrix needs recomputation
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Store the recomputed world matrix and clear the dirty flag
    pub(crate) fn resolve(&mut self, parent_world: &Mat4) {
        self.world_matrix = parent_world * self.local_matrix();
        self.dirty = false;
    }
}
