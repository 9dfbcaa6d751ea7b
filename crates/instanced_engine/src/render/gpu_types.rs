//! GPU-visible record layouts
//!
//! Every struct here is uploaded verbatim, so layouts are `#[repr(C)]`, free
//! of implicit padding and mirror the GLSL declarations (std430 for storage
//! buffers, std140 for the scene uniform).

use bytemuck::{Pod, Zeroable};

use crate::assets::MeshAsset;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};
use crate::scene::frustum::world_bounding_sphere;

/// Per-instance data read by culling and vertex/mesh shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// World matrix, column-major
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the model 3x3, padded columns
    pub normal: [[f32; 4]; 3],
    /// World-space bounding sphere: xyz centre, w radius
    pub bounds: [f32; 4],
    /// Index of the draw (or mesh draw) this instance belongs to
    pub draw_id: u32,
    /// Index into the material table
    pub material_index: u32,
    /// std430 tail padding
    pub _padding: [u32; 2],
}

impl InstanceData {
    /// Build the record for one entity
    pub fn new(world_matrix: &Mat4, mesh: &MeshAsset, draw_id: u32) -> Self {
        let (center, radius) = world_bounding_sphere(world_matrix, &mesh.centroid, mesh.bounding_radius);
        Self {
            model: world_matrix.to_cols_array(),
            normal: utils::mat3_to_padded_columns(&utils::normal_matrix(world_matrix)),
            bounds: [center.x, center.y, center.z, radius],
            draw_id,
            material_index: mesh.material_index,
            _padding: [0; 2],
        }
    }

    /// Bounding sphere centre
    pub fn center(&self) -> Vec3 {
        Vec3::new(self.bounds[0], self.bounds[1], self.bounds[2])
    }

    /// Bounding sphere radius
    pub fn radius(&self) -> f32 {
        self.bounds[3]
    }
}

/// `VkDrawIndexedIndirectCommand`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectCommand {
    /// Indices per instance
    pub index_count: u32,
    /// Instances to draw; written by the cull pass in GPU-driven mode
    pub instance_count: u32,
    /// First index in the shared index buffer
    pub first_index: u32,
    /// Added to each index
    pub vertex_offset: i32,
    /// First instance (start of this draw's instance range)
    pub first_instance: u32,
}

/// `VkDrawMeshTasksIndirectCommandEXT`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawMeshTasksIndirectCommand {
    /// Task workgroups covering the meshlets
    pub group_count_x: u32,
    /// One row of workgroups per instance
    pub group_count_y: u32,
    /// Always 1
    pub group_count_z: u32,
}

/// Per meshlet draw group data read by the task/mesh shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshDrawData {
    /// Raw vertex buffer address
    pub vertex_address: u64,
    /// Meshlet descriptor buffer address
    pub meshlet_address: u64,
    /// Meshlet vertex index buffer address
    pub meshlet_vertices_address: u64,
    /// Meshlet triangle buffer address
    pub meshlet_triangles_address: u64,
    /// Number of meshlets in the mesh
    pub meshlet_count: u32,
    /// First instance of the group
    pub first_instance: u32,
    /// Instances in the group
    pub instance_count: u32,
    /// Index into the material table
    pub material_index: u32,
}

impl MeshDrawData {
    /// Start a group for `mesh` at `first_instance`
    pub fn new(mesh: &MeshAsset, first_instance: u32) -> Self {
        Self {
            vertex_address: mesh.meshlets.vertices,
            meshlet_address: mesh.meshlets.meshlets,
            meshlet_vertices_address: mesh.meshlets.meshlet_vertices,
            meshlet_triangles_address: mesh.meshlets.meshlet_triangles,
            meshlet_count: mesh.meshlets.meshlet_count,
            first_instance,
            instance_count: 0,
            material_index: mesh.material_index,
        }
    }
}

/// Push constants of the instance cull compute shader
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InstanceCullPushConstants {
    /// Number of indirect draw commands
    pub draw_count: u32,
    /// Number of instances to test
    pub instance_count: u32,
    /// Device address of the indirect draw commands
    pub draw_commands_address: u64,
}

/// Push constants of the meshlet cull compute shader
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshletCullPushConstants {
    /// Number of mesh-task indirect commands
    pub command_count: u32,
    /// Number of instances
    pub instance_count: u32,
    /// Device address of the mesh-task commands
    pub commands_address: u64,
    /// Device address of the mesh draw data
    pub mesh_draws_address: u64,
}

/// Push constants of the graphics passes
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawPushConstants {
    /// Instance buffer address
    pub instances_address: u64,
    /// Visible-instance index buffer written by GPU culling, 0 otherwise
    pub instance_output_address: u64,
    /// Mesh draw data address (meshlet path), 0 otherwise
    pub mesh_draws_address: u64,
}

/// Per-frame scene uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneData {
    /// World to view
    pub view: [[f32; 4]; 4],
    /// Inverse-transpose of `view`
    pub view_inverse_transpose: [[f32; 4]; 4],
    /// View to clip
    pub projection: [[f32; 4]; 4],
    /// `projection * view`
    pub view_projection: [[f32; 4]; 4],
    /// View-projection of the previous unpaused frame
    pub previous_view_projection: [[f32; 4]; 4],
    /// Frozen (or live, when not paused) view
    pub debug_view: [[f32; 4]; 4],
    /// Frozen projection
    pub debug_projection: [[f32; 4]; 4],
    /// Frozen view-projection
    pub debug_view_projection: [[f32; 4]; 4],
    /// Previous view-projection captured with the freeze
    pub debug_previous_view_projection: [[f32; 4]; 4],
    /// Live frustum planes (left, right, bottom, top, near, far)
    pub frustum_planes: [[f32; 4]; 6],
    /// Frozen frustum planes
    pub debug_frustum_planes: [[f32; 4]; 6],
    /// Live camera position (w = 1)
    pub camera_position: [f32; 4],
    /// Frozen camera position (w = 1)
    pub debug_camera_position: [f32; 4],
    /// Normalized sun direction, w = intensity
    pub sun_direction: [f32; 4],
    /// Sun colour, w unused
    pub sun_color: [f32; 4],
    /// Ambient colour, w = intensity
    pub ambient_color: [f32; 4],
    /// Debug opacities: frustum, bounds, cones, unused
    pub debug_opacity: [f32; 4],
    /// Non-zero: culling shaders read the debug frustum set
    pub use_debug_frustum: u32,
    /// [`crate::scene::DebugFlags`] bits
    pub debug_flags: u32,
    /// std140 tail padding
    pub _padding: [u32; 2],
}

impl Default for SceneData {
    fn default() -> Self {
        let identity = Mat4::identity().to_cols_array();
        Self {
            view: identity,
            view_inverse_transpose: identity,
            projection: identity,
            view_projection: identity,
            previous_view_projection: identity,
            debug_view: identity,
            debug_projection: identity,
            debug_view_projection: identity,
            debug_previous_view_projection: identity,
            ..Zeroable::zeroed()
        }
    }
}
