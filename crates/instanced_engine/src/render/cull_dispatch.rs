//! GPU culling passes
//!
//! Both passes read the scene uniform (which selects live or frozen planes)
//! and the instance records, and write the indirect commands the following
//! draws consume. They are skipped when the slot has nothing uploaded.

use ash::vk;

use super::device::{CommandRecorder, DescriptorBufferBinding, MemoryBarrier};
use super::frame_buffers::FrameBuffers;
use super::gpu_types::{InstanceCullPushConstants, MeshletCullPushConstants};

/// Threads per workgroup of both cull shaders
pub const CULL_WORKGROUP_SIZE: u32 = 64;

/// A compute pipeline and its layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullPipeline {
    /// Compute pipeline
    pub pipeline: vk::Pipeline,
    /// Layout with a push-descriptor set 0 and a compute push-constant range
    pub layout: vk::PipelineLayout,
}

/// Per-instance frustum test feeding indexed indirect draws
///
/// Each visible instance bumps `instance_count` of its draw and writes its
/// index into the instance-output buffer. Returns whether anything was
/// recorded.
pub fn dispatch_instance_cull(
    recorder: &mut dyn CommandRecorder,
    pipeline: &CullPipeline,
    buffers: &FrameBuffers,
    draw_count: u32,
    instance_count: u32,
) -> bool {
    let (Some(scene), Some(instances), Some(output), Some(draws)) =
        (buffers.scene, buffers.instances, buffers.instance_output, buffers.draws)
    else {
        log::trace!("Instance cull skipped: frame buffers not allocated");
        return false;
    };

    recorder.bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline.pipeline);
    recorder.push_descriptor_buffers(
        vk::PipelineBindPoint::COMPUTE,
        pipeline.layout,
        &[
            DescriptorBufferBinding::uniform(0, &scene),
            DescriptorBufferBinding::storage(1, &instances),
            DescriptorBufferBinding::storage(2, &output),
        ],
    );

    let constants = InstanceCullPushConstants {
        draw_count,
        instance_count,
        draw_commands_address: draws.device_address,
    };
    recorder.push_constants(
        pipeline.layout,
        vk::ShaderStageFlags::COMPUTE,
        0,
        bytemuck::bytes_of(&constants),
    );
    recorder.dispatch(instance_count.div_ceil(CULL_WORKGROUP_SIZE), 1, 1);
    recorder.pipeline_barrier(&MemoryBarrier::compute_to_indirect_draw());
    true
}

/// Per-mesh-draw pass preparing mesh-task commands for meshlet culling
///
/// One thread per task command; the task shader then culls individual
/// meshlets. Returns whether anything was recorded.
pub fn dispatch_meshlet_cull(
    recorder: &mut dyn CommandRecorder,
    pipeline: &CullPipeline,
    buffers: &FrameBuffers,
    command_count: u32,
    instance_count: u32,
) -> bool {
    let (Some(scene), Some(instances), Some(tasks), Some(mesh_draws)) =
        (buffers.scene, buffers.instances, buffers.mesh_tasks, buffers.mesh_draws)
    else {
        log::trace!("Meshlet cull skipped: frame buffers not allocated");
        return false;
    };

    recorder.bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline.pipeline);
    recorder.push_descriptor_buffers(
        vk::PipelineBindPoint::COMPUTE,
        pipeline.layout,
        &[
            DescriptorBufferBinding::uniform(0, &scene),
            DescriptorBufferBinding::storage(1, &instances),
        ],
    );

    let constants = MeshletCullPushConstants {
        command_count,
        instance_count,
        commands_address: tasks.device_address,
        mesh_draws_address: mesh_draws.device_address,
    };
    recorder.push_constants(
        pipeline.layout,
        vk::ShaderStageFlags::COMPUTE,
        0,
        bytemuck::bytes_of(&constants),
    );
    recorder.dispatch(command_count.div_ceil(CULL_WORKGROUP_SIZE), 1, 1);
    recorder.pipeline_barrier(&MemoryBarrier::compute_to_mesh_tasks());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessRecorder, RecordedCommand};
    use crate::render::device::GpuBuffer;
    use ash::vk::Handle;

    fn buffer(raw: u64) -> Option<GpuBuffer> {
        Some(GpuBuffer {
            handle: vk::Buffer::from_raw(raw),
            size: 256,
            device_address: raw << 16,
        })
    }

    fn pipeline() -> CullPipeline {
        CullPipeline {
            pipeline: vk::Pipeline::from_raw(7),
            layout: vk::PipelineLayout::from_raw(8),
        }
    }

    #[test]
    fn test_skipped_without_buffers() {
        let mut recorder = HeadlessRecorder::new();
        let buffers = FrameBuffers {
            scene: buffer(1),
            ..Default::default()
        };

        assert!(!dispatch_instance_cull(&mut recorder, &pipeline(), &buffers, 0, 0));
        assert!(!dispatch_meshlet_cull(&mut recorder, &pipeline(), &buffers, 0, 0));
        assert!(recorder.commands().is_empty());
    }

    #[test]
    fn test_instance_cull_records_dispatch_and_barrier() {
        let mut recorder = HeadlessRecorder::new();
        let buffers = FrameBuffers {
            scene: buffer(1),
            instances: buffer(2),
            draws: buffer(3),
            instance_output: buffer(4),
            ..Default::default()
        };

        assert!(dispatch_instance_cull(&mut recorder, &pipeline(), &buffers, 3, 130));
        let commands = recorder.commands();

        assert!(matches!(
            commands[0],
            RecordedCommand::BindPipeline { bind_point: vk::PipelineBindPoint::COMPUTE, .. }
        ));
        let RecordedCommand::PushDescriptors { bindings, .. } = &commands[1] else {
            panic!("expected push descriptors, got {:?}", commands[1]);
        };
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[2].buffer, vk::Buffer::from_raw(4));

        let RecordedCommand::PushConstants { data, .. } = &commands[2] else {
            panic!("expected push constants, got {:?}", commands[2]);
        };
        let constants: InstanceCullPushConstants = bytemuck::pod_read_unaligned(data);
        assert_eq!(constants.draw_count, 3);
        assert_eq!(constants.instance_count, 130);
        assert_eq!(constants.draw_commands_address, 3 << 16);

        assert_eq!(commands[3], RecordedCommand::Dispatch { x: 3, y: 1, z: 1 });
        assert_eq!(
            commands[4],
            RecordedCommand::PipelineBarrier(MemoryBarrier::compute_to_indirect_draw())
        );
    }

    #[test]
    fn test_meshlet_cull_uses_two_bindings() {
        let mut recorder = HeadlessRecorder::new();
        let buffers = FrameBuffers {
            scene: buffer(1),
            instances: buffer(2),
            mesh_draws: buffer(5),
            mesh_tasks: buffer(6),
            ..Default::default()
        };

        assert!(dispatch_meshlet_cull(&mut recorder, &pipeline(), &buffers, 64, 1000));
        let commands = recorder.commands();

        let RecordedCommand::PushDescriptors { bindings, .. } = &commands[1] else {
            panic!("expected push descriptors, got {:?}", commands[1]);
        };
        assert_eq!(bindings.len(), 2);

        let RecordedCommand::PushConstants { data, .. } = &commands[2] else {
            panic!("expected push constants, got {:?}", commands[2]);
        };
        let constants: MeshletCullPushConstants = bytemuck::pod_read_unaligned(data);
        assert_eq!(constants.commands_address, 6 << 16);
        assert_eq!(constants.mesh_draws_address, 5 << 16);

        assert_eq!(commands[3], RecordedCommand::Dispatch { x: 1, y: 1, z: 1 });
        assert_eq!(
            commands[4],
            RecordedCommand::PipelineBarrier(MemoryBarrier::compute_to_mesh_tasks())
        );
    }
}
