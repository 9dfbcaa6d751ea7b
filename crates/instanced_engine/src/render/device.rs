//! Device and command-recording seams
//!
//! The scene renderer only talks to the GPU through these two object-safe
//! traits. [`crate::backend::vulkan`] implements them on ash,
//! [`crate::backend::headless`] on host memory for tests and tooling.

use ash::vk;

use super::error::RenderResult;

/// Where a buffer's memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Device-local, filled through transfers
    GpuOnly,
    /// Host-visible and coherent, written with [`GpuDevice::write_buffer`]
    CpuToGpu,
}

/// Parameters for [`GpuDevice::create_buffer`]
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    /// Size in bytes, never zero
    pub size: u64,
    /// Vulkan usage flags; `SHADER_DEVICE_ADDRESS` requests an address query
    pub usage: vk::BufferUsageFlags,
    /// Memory placement
    pub location: MemoryLocation,
    /// Debug name
    pub label: &'a str,
}

/// A created buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBuffer {
    /// Buffer handle
    pub handle: vk::Buffer,
    /// Allocated size in bytes
    pub size: u64,
    /// Device address, 0 unless requested at creation
    pub device_address: u64,
}

/// Execution and memory dependency between two pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    /// Stages that must complete
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait
    pub dst_stage: vk::PipelineStageFlags,
    /// Writes made available
    pub src_access: vk::AccessFlags,
    /// Reads made visible
    pub dst_access: vk::AccessFlags,
}

impl MemoryBarrier {
    /// Transfer write → every access the frame's passes make to uploaded data
    ///
    /// Use after the staging copies, before culling and drawing. The cull
    /// passes write instance counts into the freshly copied command buffers,
    /// so shader writes are in the destination scope too.
    pub fn transfer_to_frame_reads() -> Self {
        Self {
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::COMPUTE_SHADER
                | vk::PipelineStageFlags::DRAW_INDIRECT
                | vk::PipelineStageFlags::ALL_GRAPHICS,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::SHADER_WRITE
                | vk::AccessFlags::INDIRECT_COMMAND_READ
                | vk::AccessFlags::UNIFORM_READ,
        }
    }

    /// Compute write → indirect command and vertex shader read
    ///
    /// Use after the instance cull pass, before indexed indirect draws.
    pub fn compute_to_indirect_draw() -> Self {
        Self {
            src_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
            dst_stage: vk::PipelineStageFlags::DRAW_INDIRECT | vk::PipelineStageFlags::VERTEX_SHADER,
            src_access: vk::AccessFlags::SHADER_WRITE,
            dst_access: vk::AccessFlags::INDIRECT_COMMAND_READ | vk::AccessFlags::SHADER_READ,
        }
    }

    /// Compute write → indirect command and task/mesh shader read
    ///
    /// Use after the meshlet cull pass, before mesh-task indirect draws.
    pub fn compute_to_mesh_tasks() -> Self {
        Self {
            src_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
            dst_stage: vk::PipelineStageFlags::DRAW_INDIRECT | vk::PipelineStageFlags::ALL_GRAPHICS,
            src_access: vk::AccessFlags::SHADER_WRITE,
            dst_access: vk::AccessFlags::INDIRECT_COMMAND_READ | vk::AccessFlags::SHADER_READ,
        }
    }
}

/// One buffer descriptor written with push descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBufferBinding {
    /// Binding slot in set 0
    pub binding: u32,
    /// Uniform or storage buffer
    pub descriptor_type: vk::DescriptorType,
    /// Buffer handle
    pub buffer: vk::Buffer,
    /// Byte range bound, starting at 0
    pub range: u64,
}

impl DescriptorBufferBinding {
    /// Uniform buffer binding covering all of `buffer`
    pub fn uniform(binding: u32, buffer: &GpuBuffer) -> Self {
        Self {
            binding,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            buffer: buffer.handle,
            range: buffer.size,
        }
    }

    /// Storage buffer binding covering all of `buffer`
    pub fn storage(binding: u32, buffer: &GpuBuffer) -> Self {
        Self {
            binding,
            descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
            buffer: buffer.handle,
            range: buffer.size,
        }
    }
}

/// Resource creation and host synchronisation
pub trait GpuDevice {
    /// Create a buffer; queries its device address when the usage asks for one
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> RenderResult<GpuBuffer>;

    /// Destroy a buffer and free its memory
    fn destroy_buffer(&mut self, buffer: GpuBuffer);

    /// Copy `data` into a [`MemoryLocation::CpuToGpu`] buffer at `offset`
    fn write_buffer(&mut self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> RenderResult<()>;

    /// Create an unsignaled fence
    fn create_fence(&mut self) -> RenderResult<vk::Fence>;

    /// Destroy a fence
    fn destroy_fence(&mut self, fence: vk::Fence);

    /// Block until `fence` signals or `timeout_ns` elapses
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> RenderResult<()>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()>;
}

/// Command buffer recording
pub trait CommandRecorder {
    /// Bind a compute or graphics pipeline
    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);

    /// Write buffer descriptors into set 0 of `layout` (`VK_KHR_push_descriptor`)
    fn push_descriptor_buffers(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        bindings: &[DescriptorBufferBinding],
    );

    /// Update push constants at `offset`
    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]);

    /// Dispatch compute workgroups
    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);

    /// Copy regions between buffers
    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);

    /// Record a global memory barrier
    fn pipeline_barrier(&mut self, barrier: &MemoryBarrier);

    /// Bind the shared index buffer
    fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: u64, index_type: vk::IndexType);

    /// Direct indexed draw
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Indexed draws read from `buffer`
    fn draw_indexed_indirect(&mut self, buffer: vk::Buffer, offset: u64, draw_count: u32, stride: u32);

    /// Whether [`Self::draw_mesh_tasks_indirect`] can be recorded
    fn supports_mesh_tasks(&self) -> bool;

    /// Mesh-task draws read from `buffer` (`VK_EXT_mesh_shader`)
    fn draw_mesh_tasks_indirect(&mut self, buffer: vk::Buffer, offset: u64, draw_count: u32, stride: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_barrier_orders_cull_writes() {
        let barrier = MemoryBarrier::transfer_to_frame_reads();
        assert!(barrier.src_access.contains(vk::AccessFlags::TRANSFER_WRITE));
        assert!(barrier.dst_stage.contains(vk::PipelineStageFlags::COMPUTE_SHADER));
        assert!(barrier
            .dst_access
            .contains(vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE));
        assert!(barrier.dst_access.contains(vk::AccessFlags::INDIRECT_COMMAND_READ));
    }
}
