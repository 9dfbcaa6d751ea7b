//! Mesh component

use std::sync::Arc;

use crate::assets::{MeshAsset, MeshId};
use crate::ecs::Component;

/// Shared reference to a loaded mesh
///
/// Many entities point at the same asset; the asset system owns it.
#[derive(Debug, Clone)]
pub struct MeshComponent {
    /// The referenced mesh
    pub mesh: Arc<MeshAsset>,
}

impl Component for MeshComponent {}

impl MeshComponent {
    /// Create from a shared mesh
    pub fn new(mesh: Arc<MeshAsset>) -> Self {
        Self { mesh }
    }

    /// Identity used for draw grouping
    pub fn mesh_id(&self) -> MeshId {
        self.mesh.id
    }
}
