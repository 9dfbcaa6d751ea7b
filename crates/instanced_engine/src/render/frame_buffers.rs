//! Per-slot frame buffers and the staging upload
//!
//! Every in-flight slot owns its own device-local copy of each per-frame
//! array, so the host never overwrites a buffer the device may still read.
//! One host-visible staging buffer per slot carries all arrays; its layout is
//! computed once per frame by [`StagingLayout`] and used for both the host
//! writes and the copy regions.

use ash::vk;
use bytemuck::Pod;

use crate::core::{BufferPolicy, RenderMode};
use crate::scene::FrameGeometry;

use super::deletion_queue::DeletionQueue;
use super::device::{BufferDesc, CommandRecorder, GpuBuffer, GpuDevice, MemoryBarrier, MemoryLocation};
use super::error::{RenderError, RenderResult};
use super::gpu_types::SceneData;

/// Offset alignment of every region in the staging buffer
pub const STAGING_ALIGNMENT: u64 = 16;

/// Bytes per entry of the GPU-driven visible-instance output
pub const INSTANCE_OUTPUT_STRIDE: u64 = std::mem::size_of::<u32>() as u64;

/// A byte range inside the staging buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingRegion {
    /// Start offset
    pub offset: u64,
    /// Length in bytes, 0 for an empty array
    pub size: u64,
}

impl StagingRegion {
    /// Whether the region carries no data
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Placement of each array in the staging buffer
///
/// Order is fixed: instances, draws, mesh draws, mesh-task commands, scene
/// data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingLayout {
    /// Instance records
    pub instances: StagingRegion,
    /// Indexed draw commands
    pub draws: StagingRegion,
    /// Mesh draw data
    pub mesh_draws: StagingRegion,
    /// Mesh-task commands
    pub mesh_tasks: StagingRegion,
    /// Scene uniform
    pub scene: StagingRegion,
    /// Bytes needed for the whole buffer
    pub total: u64,
}

impl StagingLayout {
    /// Lay out `geometry` followed by one [`SceneData`]
    pub fn new(geometry: &FrameGeometry) -> Self {
        let mut cursor = 0;
        let mut region = |size: u64| {
            let region = StagingRegion { offset: cursor, size };
            cursor = align_up(cursor + size, STAGING_ALIGNMENT);
            region
        };

        let instances = region(byte_len(&geometry.instances));
        let draws = region(byte_len(&geometry.draws));
        let mesh_draws = region(byte_len(&geometry.mesh_draws));
        let mesh_tasks = region(byte_len(&geometry.mesh_tasks));
        let scene = region(std::mem::size_of::<SceneData>() as u64);

        Self {
            instances,
            draws,
            mesh_draws,
            mesh_tasks,
            scene,
            total: cursor,
        }
    }
}

/// The buffers a frame reads, as uploaded into its slot
///
/// `None` means the array was empty this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameBuffers {
    /// Instance records
    pub instances: Option<GpuBuffer>,
    /// Indexed draw commands
    pub draws: Option<GpuBuffer>,
    /// Mesh draw data
    pub mesh_draws: Option<GpuBuffer>,
    /// Mesh-task commands
    pub mesh_tasks: Option<GpuBuffer>,
    /// Visible-instance indices written by the GPU-driven cull pass
    pub instance_output: Option<GpuBuffer>,
    /// Scene uniform
    pub scene: Option<GpuBuffer>,
}

impl FrameBuffers {
    /// Device addresses, 0 for absent buffers
    pub fn addresses(&self) -> FrameAddresses {
        let address = |buffer: &Option<GpuBuffer>| buffer.map_or(0, |buffer| buffer.device_address);
        FrameAddresses {
            instances: address(&self.instances),
            draws: address(&self.draws),
            mesh_draws: address(&self.mesh_draws),
            mesh_tasks: address(&self.mesh_tasks),
            instance_output: address(&self.instance_output),
        }
    }
}

/// Device addresses handed to shaders through push constants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameAddresses {
    /// Instance records
    pub instances: u64,
    /// Indexed draw commands
    pub draws: u64,
    /// Mesh draw data
    pub mesh_draws: u64,
    /// Mesh-task commands
    pub mesh_tasks: u64,
    /// Visible-instance output
    pub instance_output: u64,
}

/// What one upload did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameUpload {
    /// Buffers the frame reads
    pub buffers: FrameBuffers,
    /// Layout used for the staging writes and copies
    pub layout: StagingLayout,
    /// Bytes written to the staging buffer
    pub bytes_uploaded: u64,
    /// Buffers created this frame
    pub buffers_created: usize,
    /// Buffers handed to the deletion queue this frame
    pub buffers_retired: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameArray {
    Instances,
    Draws,
    MeshDraws,
    MeshTasks,
    InstanceOutput,
    Scene,
    Staging,
}

impl FrameArray {
    fn usage(self) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as Usage;
        match self {
            Self::Instances | Self::MeshDraws => {
                Usage::STORAGE_BUFFER | Usage::TRANSFER_DST | Usage::SHADER_DEVICE_ADDRESS
            }
            Self::Draws | Self::MeshTasks => {
                Usage::STORAGE_BUFFER
                    | Usage::INDIRECT_BUFFER
                    | Usage::TRANSFER_DST
                    | Usage::SHADER_DEVICE_ADDRESS
            }
            Self::InstanceOutput => Usage::STORAGE_BUFFER | Usage::SHADER_DEVICE_ADDRESS,
            Self::Scene => Usage::UNIFORM_BUFFER | Usage::TRANSFER_DST,
            Self::Staging => Usage::TRANSFER_SRC,
        }
    }

    fn location(self) -> MemoryLocation {
        match self {
            Self::Staging => MemoryLocation::CpuToGpu,
            _ => MemoryLocation::GpuOnly,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Instances => "instances",
            Self::Draws => "draw_commands",
            Self::MeshDraws => "mesh_draws",
            Self::MeshTasks => "mesh_task_commands",
            Self::InstanceOutput => "instance_output",
            Self::Scene => "scene_data",
            Self::Staging => "frame_staging",
        }
    }
}

#[derive(Debug, Default)]
struct SlotBuffers {
    instances: Option<GpuBuffer>,
    draws: Option<GpuBuffer>,
    mesh_draws: Option<GpuBuffer>,
    mesh_tasks: Option<GpuBuffer>,
    instance_output: Option<GpuBuffer>,
    scene: Option<GpuBuffer>,
    staging: Option<GpuBuffer>,
}

impl SlotBuffers {
    fn drain(&mut self) -> impl Iterator<Item = GpuBuffer> {
        [
            self.instances.take(),
            self.draws.take(),
            self.mesh_draws.take(),
            self.mesh_tasks.take(),
            self.instance_output.take(),
            self.scene.take(),
            self.staging.take(),
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Default)]
struct Counters {
    created: usize,
    retired: usize,
}

/// Replicates the per-frame arrays across in-flight slots and uploads them
#[derive(Debug)]
pub struct FrameBufferSynchronizer {
    slots: Vec<SlotBuffers>,
    policy: BufferPolicy,
}

impl FrameBufferSynchronizer {
    /// One empty set of buffers per slot
    pub fn new(frames_in_flight: usize, policy: BufferPolicy) -> Self {
        Self {
            slots: (0..frames_in_flight).map(|_| SlotBuffers::default()).collect(),
            policy,
        }
    }

    /// Active sizing policy
    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    /// Stage `geometry` and `scene` and record the copies into `slot`'s buffers
    ///
    /// Superseded buffers go to `deletion`, which must belong to `slot`. Empty
    /// arrays get no buffer, no copy and a zero address. The copies are
    /// followed by a transfer → shader/indirect/uniform read barrier.
    #[allow(clippy::too_many_arguments)]
    pub fn upload(
        &mut self,
        device: &mut dyn GpuDevice,
        recorder: &mut dyn CommandRecorder,
        deletion: &mut DeletionQueue,
        slot: usize,
        mode: RenderMode,
        geometry: &FrameGeometry,
        scene: &SceneData,
    ) -> RenderResult<FrameUpload> {
        let policy = self.policy;
        let buffers = &mut self.slots[slot];
        let layout = StagingLayout::new(geometry);
        let mut counters = Counters::default();

        let output_size = match mode {
            RenderMode::GpuDriven => geometry.instances.len() as u64 * INSTANCE_OUTPUT_STRIDE,
            RenderMode::CpuDriven | RenderMode::Meshlet => 0,
        };

        let mut ensure = |buffer: &mut Option<GpuBuffer>, array: FrameArray, size: u64| {
            ensure_buffer(device, deletion, buffer, array, size, policy, &mut counters)
        };
        let frame = FrameBuffers {
            instances: ensure(&mut buffers.instances, FrameArray::Instances, layout.instances.size)?,
            draws: ensure(&mut buffers.draws, FrameArray::Draws, layout.draws.size)?,
            mesh_draws: ensure(&mut buffers.mesh_draws, FrameArray::MeshDraws, layout.mesh_draws.size)?,
            mesh_tasks: ensure(&mut buffers.mesh_tasks, FrameArray::MeshTasks, layout.mesh_tasks.size)?,
            instance_output: ensure(&mut buffers.instance_output, FrameArray::InstanceOutput, output_size)?,
            scene: None,
        };
        let staging = ensure(&mut buffers.staging, FrameArray::Staging, layout.total)?;

        // the uniform has a fixed size, so it is created once per slot
        let scene_buffer = match buffers.scene {
            Some(buffer) => buffer,
            None => {
                let buffer = create(device, FrameArray::Scene, layout.scene.size)?;
                counters.created += 1;
                buffers.scene = Some(buffer);
                buffer
            }
        };
        let frame = FrameBuffers {
            scene: Some(scene_buffer),
            ..frame
        };

        let Some(staging) = staging else {
            return Err(RenderError::InvalidOperation {
                reason: "staging buffer missing for a non-empty layout".to_string(),
            });
        };

        let uploads: [(StagingRegion, &[u8], Option<GpuBuffer>); 5] = [
            (layout.instances, bytes(&geometry.instances), frame.instances),
            (layout.draws, bytes(&geometry.draws), frame.draws),
            (layout.mesh_draws, bytes(&geometry.mesh_draws), frame.mesh_draws),
            (layout.mesh_tasks, bytes(&geometry.mesh_tasks), frame.mesh_tasks),
            (layout.scene, bytemuck::bytes_of(scene), frame.scene),
        ];

        let mut bytes_uploaded = 0;
        for (region, data, destination) in uploads {
            let Some(destination) = destination.filter(|_| !region.is_empty()) else {
                continue;
            };
            device.write_buffer(&staging, region.offset, data)?;
            recorder.copy_buffer(
                staging.handle,
                destination.handle,
                &[vk::BufferCopy {
                    src_offset: region.offset,
                    dst_offset: 0,
                    size: region.size,
                }],
            );
            bytes_uploaded += region.size;
        }
        recorder.pipeline_barrier(&MemoryBarrier::transfer_to_frame_reads());

        log::trace!(
            "Slot {} upload: {} bytes, {} buffers created, {} retired",
            slot,
            bytes_uploaded,
            counters.created,
            counters.retired
        );

        Ok(FrameUpload {
            buffers: frame,
            layout,
            bytes_uploaded,
            buffers_created: counters.created,
            buffers_retired: counters.retired,
        })
    }

    /// Destroy every slot buffer immediately
    ///
    /// The caller must have waited for all in-flight frames.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        let mut count = 0;
        for slot in &mut self.slots {
            for buffer in slot.drain() {
                device.destroy_buffer(buffer);
                count += 1;
            }
        }
        log::debug!("FrameBufferSynchronizer destroyed {} buffers", count);
    }
}

/// Make `buffer` fit `size` under `policy`; returns the buffer to use this frame
fn ensure_buffer(
    device: &mut dyn GpuDevice,
    deletion: &mut DeletionQueue,
    buffer: &mut Option<GpuBuffer>,
    array: FrameArray,
    size: u64,
    policy: BufferPolicy,
    counters: &mut Counters,
) -> RenderResult<Option<GpuBuffer>> {
    let mut retire = |buffer: &mut Option<GpuBuffer>| {
        if let Some(old) = buffer.take() {
            deletion.push_buffer(old);
            counters.retired += 1;
        }
    };

    let capacity = match policy {
        BufferPolicy::Exact => {
            retire(buffer);
            if size == 0 {
                return Ok(None);
            }
            size
        }
        BufferPolicy::Growable { slack_percent } => {
            if size == 0 {
                return Ok(None);
            }
            if let Some(existing) = buffer.filter(|existing| existing.size >= size) {
                return Ok(Some(existing));
            }
            retire(buffer);
            align_up(size + size * u64::from(slack_percent) / 100, STAGING_ALIGNMENT)
        }
    };

    let created = create(device, array, capacity)?;
    counters.created += 1;
    *buffer = Some(created);
    Ok(Some(created))
}

fn create(device: &mut dyn GpuDevice, array: FrameArray, size: u64) -> RenderResult<GpuBuffer> {
    device.create_buffer(&BufferDesc {
        size,
        usage: array.usage(),
        location: array.location(),
        label: array.label(),
    })
}

fn bytes<T: Pod>(items: &[T]) -> &[u8] {
    bytemuck::cast_slice(items)
}

fn byte_len<T>(items: &[T]) -> u64 {
    std::mem::size_of_val(items) as u64
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessDevice, HeadlessRecorder, RecordedCommand};
    use crate::render::gpu_types::{DrawIndexedIndirectCommand, InstanceData};

    fn geometry(instances: usize, draws: usize) -> FrameGeometry {
        FrameGeometry {
            instances: vec![bytemuck::Zeroable::zeroed(); instances],
            draws: vec![DrawIndexedIndirectCommand::default(); draws],
            ..Default::default()
        }
    }

    fn copies(recorder: &HeadlessRecorder) -> Vec<(vk::Buffer, u64, u64)> {
        recorder
            .commands()
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::CopyBuffer { dst, regions, .. } => {
                    Some((*dst, regions[0].src_offset, regions[0].size))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_layout_order_and_alignment() {
        let layout = StagingLayout::new(&geometry(3, 1));
        let instance_bytes = 3 * std::mem::size_of::<InstanceData>() as u64;

        assert_eq!(layout.instances, StagingRegion { offset: 0, size: instance_bytes });
        assert_eq!(layout.draws, StagingRegion { offset: instance_bytes, size: 20 });
        assert_eq!(layout.mesh_draws.offset, align_up(instance_bytes + 20, 16));
        assert!(layout.mesh_draws.is_empty());
        assert_eq!(layout.scene.offset, layout.mesh_tasks.offset);
        assert_eq!(layout.total % STAGING_ALIGNMENT, 0);
        assert!(layout.total >= layout.scene.offset + layout.scene.size);
    }

    #[test]
    fn test_empty_scene_uploads_only_scene_data() {
        let mut device = HeadlessDevice::new();
        let mut recorder = HeadlessRecorder::new();
        let mut deletion = DeletionQueue::new();
        let mut sync = FrameBufferSynchronizer::new(2, BufferPolicy::Exact);

        let upload = sync
            .upload(
                &mut device,
                &mut recorder,
                &mut deletion,
                0,
                RenderMode::GpuDriven,
                &FrameGeometry::default(),
                &SceneData::default(),
            )
            .unwrap();

        assert_eq!(upload.buffers.instances, None);
        assert_eq!(upload.buffers.draws, None);
        assert_eq!(upload.buffers.instance_output, None);
        assert_eq!(upload.buffers.addresses(), FrameAddresses::default());
        // staging + scene uniform
        assert_eq!(upload.buffers_created, 2);
        let scene = upload.buffers.scene.unwrap();
        assert_eq!(copies(&recorder), vec![(scene.handle, upload.layout.scene.offset, upload.layout.scene.size)]);
        assert!(matches!(recorder.commands().last(), Some(RecordedCommand::PipelineBarrier(_))));
    }

    #[test]
    fn test_exact_policy_reallocates_and_retires() {
        let mut device = HeadlessDevice::new();
        let mut recorder = HeadlessRecorder::new();
        let mut deletion = DeletionQueue::new();
        let mut sync = FrameBufferSynchronizer::new(1, BufferPolicy::Exact);
        let scene = SceneData::default();

        let first = sync
            .upload(&mut device, &mut recorder, &mut deletion, 0, RenderMode::GpuDriven, &geometry(4, 1), &scene)
            .unwrap();
        assert_eq!(first.buffers_created, 5);
        assert_eq!(first.buffers_retired, 0);
        assert_eq!(first.buffers.instance_output.unwrap().size, 16);
        assert_ne!(first.buffers.addresses().instances, 0);

        let second = sync
            .upload(&mut device, &mut recorder, &mut deletion, 0, RenderMode::GpuDriven, &geometry(4, 1), &scene)
            .unwrap();
        // instances, draws, output and staging again; scene uniform kept
        assert_eq!(second.buffers_created, 4);
        assert_eq!(second.buffers_retired, 4);
        assert_eq!(deletion.len(), 4);
        assert_eq!(second.buffers.scene, first.buffers.scene);
        assert_ne!(second.buffers.instances, first.buffers.instances);
    }

    #[test]
    fn test_growable_policy_reuses_until_too_small() {
        let mut device = HeadlessDevice::new();
        let mut recorder = HeadlessRecorder::new();
        let mut deletion = DeletionQueue::new();
        let mut sync = FrameBufferSynchronizer::new(1, BufferPolicy::Growable { slack_percent: 50 });
        let scene = SceneData::default();

        let first = sync
            .upload(&mut device, &mut recorder, &mut deletion, 0, RenderMode::CpuDriven, &geometry(4, 1), &scene)
            .unwrap();
        let instances = first.buffers.instances.unwrap();
        assert_eq!(instances.size, 4 * 144 * 3 / 2);

        let smaller = sync
            .upload(&mut device, &mut recorder, &mut deletion, 0, RenderMode::CpuDriven, &geometry(5, 1), &scene)
            .unwrap();
        assert_eq!(smaller.buffers.instances, Some(instances));
        assert_eq!(smaller.buffers_created, 0);

        let larger = sync
            .upload(&mut device, &mut recorder, &mut deletion, 0, RenderMode::CpuDriven, &geometry(7, 1), &scene)
            .unwrap();
        assert_ne!(larger.buffers.instances, Some(instances));
        assert_eq!(deletion.len(), larger.buffers_retired);
        assert!(larger.buffers_retired >= 1);
    }

    #[test]
    fn test_slots_have_separate_buffers() {
        let mut device = HeadlessDevice::new();
        let mut recorder = HeadlessRecorder::new();
        let mut deletion = DeletionQueue::new();
        let mut sync = FrameBufferSynchronizer::new(2, BufferPolicy::Exact);
        let scene = SceneData::default();

        let a = sync
            .upload(&mut device, &mut recorder, &mut deletion, 0, RenderMode::CpuDriven, &geometry(1, 1), &scene)
            .unwrap();
        let b = sync
            .upload(&mut device, &mut recorder, &mut deletion, 1, RenderMode::CpuDriven, &geometry(1, 1), &scene)
            .unwrap();
        assert_ne!(a.buffers.scene, b.buffers.scene);
        assert!(deletion.is_empty());

        sync.destroy(&mut device);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn test_copies_land_in_device_buffers() {
        let mut device = HeadlessDevice::new();
        let mut recorder = HeadlessRecorder::new();
        let mut deletion = DeletionQueue::new();
        let mut sync = FrameBufferSynchronizer::new(1, BufferPolicy::Exact);
        let mut frame = geometry(0, 2);
        frame.draws[1].index_count = 99;

        let upload = sync
            .upload(&mut device, &mut recorder, &mut deletion, 0, RenderMode::CpuDriven, &frame, &SceneData::default())
            .unwrap();
        let fence = device.create_fence().unwrap();
        device.submit(&recorder, fence);

        let draws = upload.buffers.draws.unwrap();
        let stored = device.buffer_bytes(draws.handle).unwrap();
        let second: DrawIndexedIndirectCommand = bytemuck::pod_read_unaligned(&stored[20..40]);
        assert_eq!(second.index_count, 99);
    }
}
