//! Command buffer recording on ash

use ash::extensions::{ext::MeshShader, khr::PushDescriptor};
use ash::{vk, Device, Instance};

use crate::render::{CommandRecorder, DescriptorBufferBinding, MemoryBarrier};

/// Extension loaders shared by every recorder of a device
#[derive(Clone)]
pub struct RecorderExtensions {
    push_descriptor: PushDescriptor,
    mesh_shader: Option<MeshShader>,
}

impl RecorderExtensions {
    /// Load `VK_KHR_push_descriptor` and, if enabled on the device, `VK_EXT_mesh_shader`
    pub fn load(instance: &Instance, device: &Device, mesh_shader_enabled: bool) -> Self {
        Self {
            push_descriptor: PushDescriptor::new(instance, device),
            mesh_shader: mesh_shader_enabled.then(|| MeshShader::new(instance, device)),
        }
    }

    /// Whether mesh-task draws can be recorded
    pub fn supports_mesh_shading(&self) -> bool {
        self.mesh_shader.is_some()
    }
}

/// [`CommandRecorder`] writing into a primary command buffer
///
/// The command buffer must be in the recording state, inside a render pass
/// (or dynamic rendering scope) before any draw is recorded and outside one
/// for copies and dispatches.
pub struct VulkanCommandRecorder {
    device: Device,
    extensions: RecorderExtensions,
    command_buffer: vk::CommandBuffer,
}

impl VulkanCommandRecorder {
    /// Record into `command_buffer`
    pub fn new(device: Device, extensions: RecorderExtensions, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            extensions,
            command_buffer,
        }
    }

    /// The command buffer being recorded
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl CommandRecorder for VulkanCommandRecorder {
    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.command_buffer, bind_point, pipeline);
        }
    }

    fn push_descriptor_buffers(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        bindings: &[DescriptorBufferBinding],
    ) {
        let infos: Vec<[vk::DescriptorBufferInfo; 1]> = bindings
            .iter()
            .map(|binding| {
                [vk::DescriptorBufferInfo {
                    buffer: binding.buffer,
                    offset: 0,
                    range: binding.range,
                }]
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = bindings
            .iter()
            .zip(&infos)
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_binding(binding.binding)
                    .descriptor_type(binding.descriptor_type)
                    .buffer_info(info)
                    .build()
            })
            .collect();

        unsafe {
            self.extensions
                .push_descriptor
                .cmd_push_descriptor_set(self.command_buffer, bind_point, layout, 0, &writes);
        }
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        unsafe {
            self.device
                .cmd_push_constants(self.command_buffer, layout, stages, offset, data);
        }
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe {
            self.device
                .cmd_dispatch(self.command_buffer, group_count_x, group_count_y, group_count_z);
        }
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, regions);
        }
    }

    fn pipeline_barrier(&mut self, barrier: &MemoryBarrier) {
        let memory_barrier = vk::MemoryBarrier::builder()
            .src_access_mask(barrier.src_access)
            .dst_access_mask(barrier.dst_access)
            .build();
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                barrier.src_stage,
                barrier.dst_stage,
                vk::DependencyFlags::empty(),
                &[memory_barrier],
                &[],
                &[],
            );
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: u64, index_type: vk::IndexType) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.command_buffer, buffer, offset, index_type);
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn draw_indexed_indirect(&mut self, buffer: vk::Buffer, offset: u64, draw_count: u32, stride: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed_indirect(self.command_buffer, buffer, offset, draw_count, stride);
        }
    }

    fn supports_mesh_tasks(&self) -> bool {
        self.extensions.supports_mesh_shading()
    }

    fn draw_mesh_tasks_indirect(&mut self, buffer: vk::Buffer, offset: u64, draw_count: u32, stride: u32) {
        match &self.extensions.mesh_shader {
            Some(mesh_shader) => unsafe {
                mesh_shader.cmd_draw_mesh_tasks_indirect(self.command_buffer, buffer, offset, draw_count, stride);
            },
            None => log::error!("Mesh-task draw recorded without VK_EXT_mesh_shader; skipped"),
        }
    }
}
