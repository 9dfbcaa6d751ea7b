//! Mesh asset metadata consumed by the scene core
//!
//! The loader fills these in after uploading vertex, index and meshlet data;
//! the core only reads them.

use crate::foundation::math::Vec3;

/// Stable mesh identity used to group instances into draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(pub u32);

/// Meshlets are grouped this many per task-shader workgroup.
pub const MESHLETS_PER_TASK_GROUP: u32 = 32;

/// Device addresses of the mesh-shading buffers of one mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshletBuffers {
    /// Raw vertex buffer address
    pub vertices: u64,
    /// Meshlet descriptor buffer address
    pub meshlets: u64,
    /// Meshlet vertex index buffer address
    pub meshlet_vertices: u64,
    /// Meshlet triangle (micro-index) buffer address
    pub meshlet_triangles: u64,
    /// Number of meshlets
    pub meshlet_count: u32,
}

/// Loaded mesh as seen by culling and draw generation
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    /// Identity for grouping
    pub id: MeshId,
    /// Bounding sphere centre in mesh space
    pub centroid: Vec3,
    /// Bounding sphere radius in mesh space
    pub bounding_radius: f32,
    /// First index in the shared index buffer
    pub first_index: u32,
    /// Number of indices
    pub index_count: u32,
    /// Offset added to each index
    pub vertex_offset: i32,
    /// Mesh-shading buffers
    pub meshlets: MeshletBuffers,
    /// Index into the material table
    pub material_index: u32,
}

impl MeshAsset {
    /// Mesh with bounds and index range; meshlet data left empty
    pub fn new(id: MeshId, centroid: Vec3, bounding_radius: f32, first_index: u32, index_count: u32) -> Self {
        Self {
            id,
            centroid,
            bounding_radius,
            first_index,
            index_count,
            vertex_offset: 0,
            meshlets: MeshletBuffers::default(),
            material_index: 0,
        }
    }

    /// Builder pattern: set vertex offset
    pub fn with_vertex_offset(mut self, vertex_offset: i32) -> Self {
        self.vertex_offset = vertex_offset;
        self
    }

    /// Builder pattern: set meshlet buffers
    pub fn with_meshlets(mut self, meshlets: MeshletBuffers) -> Self {
        self.meshlets = meshlets;
        self
    }

    /// Builder pattern: set material index
    pub fn with_material(mut self, material_index: u32) -> Self {
        self.material_index = material_index;
        self
    }

    /// Task workgroups needed to cover every meshlet once
    pub fn task_group_count(&self) -> u32 {
        self.meshlets.meshlet_count.div_ceil(MESHLETS_PER_TASK_GROUP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_group_count_rounds_up() {
        let mut mesh = MeshAsset::new(MeshId(0), Vec3::zeros(), 1.0, 0, 36);
        assert_eq!(mesh.task_group_count(), 0);

        mesh.meshlets.meshlet_count = 32;
        assert_eq!(mesh.task_group_count(), 1);

        mesh.meshlets.meshlet_count = 33;
        assert_eq!(mesh.task_group_count(), 2);
    }
}
