//! Host-memory backend
//!
//! [`HeadlessDevice`] keeps buffer contents in host memory and hands out fake
//! handles and device addresses. [`HeadlessRecorder`] stores the commands it
//! is given so they can be inspected, and [`HeadlessDevice::submit`] replays
//! the buffer copies so uploads can be checked byte for byte.

use std::collections::HashMap;

use ash::vk::{self, Handle};

use crate::render::{
    BufferDesc, CommandRecorder, DescriptorBufferBinding, GpuBuffer, GpuDevice, MemoryBarrier, RenderError,
    RenderResult,
};

/// First fake device address handed out
const ADDRESS_BASE: u64 = 0x1_0000;

/// Fake device addresses are spaced to this alignment
const ADDRESS_ALIGNMENT: u64 = 256;

#[derive(Debug)]
struct HostBuffer {
    bytes: Vec<u8>,
    label: String,
}

/// A device that lives entirely in host memory
#[derive(Debug)]
pub struct HeadlessDevice {
    next_handle: u64,
    next_address: u64,
    buffers: HashMap<vk::Buffer, HostBuffer>,
    fences: HashMap<vk::Fence, bool>,
    destroyed: Vec<vk::Buffer>,
    buffers_created: usize,
    fence_waits: usize,
    allocation_limit: Option<u64>,
}

impl HeadlessDevice {
    /// Create an empty device
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            next_address: ADDRESS_BASE,
            buffers: HashMap::new(),
            fences: HashMap::new(),
            destroyed: Vec::new(),
            buffers_created: 0,
            fence_waits: 0,
            allocation_limit: None,
        }
    }

    /// Fail every buffer creation larger than `limit` bytes
    pub fn set_allocation_limit(&mut self, limit: Option<u64>) {
        self.allocation_limit = limit;
    }

    /// Buffers currently alive
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Buffers created over the device's lifetime
    pub fn buffers_created(&self) -> usize {
        self.buffers_created
    }

    /// Destroyed buffer handles, in destruction order
    pub fn destroyed_buffers(&self) -> &[vk::Buffer] {
        &self.destroyed
    }

    /// Contents of a live buffer
    pub fn buffer_bytes(&self, buffer: vk::Buffer) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|host| host.bytes.as_slice())
    }

    /// Debug label of a live buffer
    pub fn buffer_label(&self, buffer: vk::Buffer) -> Option<&str> {
        self.buffers.get(&buffer).map(|host| host.label.as_str())
    }

    /// Fences currently alive
    pub fn live_fence_count(&self) -> usize {
        self.fences.len()
    }

    /// Fence waits performed so far
    pub fn fence_waits(&self) -> usize {
        self.fence_waits
    }

    /// Mark `fence` signaled, as the queue would on completion
    pub fn signal_fence(&mut self, fence: vk::Fence) {
        if let Some(signaled) = self.fences.get_mut(&fence) {
            *signaled = true;
        }
    }

    /// "Execute" a recorded frame: replay its copies and signal `fence`
    pub fn submit(&mut self, recorder: &HeadlessRecorder, fence: vk::Fence) {
        for command in recorder.commands() {
            if let RecordedCommand::CopyBuffer { src, dst, regions } = command {
                for region in regions {
                    self.copy_region(*src, *dst, region);
                }
            }
        }
        self.signal_fence(fence);
    }

    fn copy_region(&mut self, src: vk::Buffer, dst: vk::Buffer, region: &BufferCopyRegion) {
        let range = |offset: u64| offset as usize..(offset + region.size) as usize;
        let Some(data) = self
            .buffers
            .get(&src)
            .and_then(|host| host.bytes.get(range(region.src_offset)))
            .map(<[u8]>::to_vec)
        else {
            log::warn!("Headless copy from {:?} out of bounds", src);
            return;
        };
        match self
            .buffers
            .get_mut(&dst)
            .and_then(|host| host.bytes.get_mut(range(region.dst_offset)))
        {
            Some(target) => target.copy_from_slice(&data),
            None => log::warn!("Headless copy into {:?} out of bounds", dst),
        }
    }

    fn next_raw_handle(&mut self) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        raw
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> RenderResult<GpuBuffer> {
        if desc.size == 0 {
            return Err(RenderError::InvalidOperation {
                reason: format!("zero-sized buffer '{}'", desc.label),
            });
        }
        if self.allocation_limit.is_some_and(|limit| desc.size > limit) {
            return Err(RenderError::AllocationFailed { requested: desc.size });
        }

        let handle = vk::Buffer::from_raw(self.next_raw_handle());
        let device_address = if desc.usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
            let address = self.next_address;
            self.next_address += desc.size.div_ceil(ADDRESS_ALIGNMENT) * ADDRESS_ALIGNMENT;
            address
        } else {
            0
        };

        self.buffers.insert(
            handle,
            HostBuffer {
                bytes: vec![0; desc.size as usize],
                label: desc.label.to_string(),
            },
        );
        self.buffers_created += 1;
        log::trace!("Headless buffer '{}' created: {} bytes", desc.label, desc.size);

        Ok(GpuBuffer {
            handle,
            size: desc.size,
            device_address,
        })
    }

    fn destroy_buffer(&mut self, buffer: GpuBuffer) {
        if self.buffers.remove(&buffer.handle).is_some() {
            self.destroyed.push(buffer.handle);
        } else {
            log::warn!("Headless buffer {:?} destroyed twice", buffer.handle);
        }
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> RenderResult<()> {
        let target = self
            .buffers
            .get_mut(&buffer.handle)
            .and_then(|host| host.bytes.get_mut(offset as usize..offset as usize + data.len()))
            .ok_or_else(|| RenderError::InvalidOperation {
                reason: format!("write of {} bytes at {} outside {:?}", data.len(), offset, buffer.handle),
            })?;
        target.copy_from_slice(data);
        Ok(())
    }

    fn create_fence(&mut self) -> RenderResult<vk::Fence> {
        let fence = vk::Fence::from_raw(self.next_raw_handle());
        self.fences.insert(fence, false);
        Ok(fence)
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        self.fences.remove(&fence);
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> RenderResult<()> {
        self.fence_waits += 1;
        match self.fences.get(&fence) {
            Some(true) => Ok(()),
            Some(false) => Err(RenderError::FenceTimeout { timeout_ns }),
            None => Err(RenderError::InvalidOperation {
                reason: format!("unknown fence {:?}", fence),
            }),
        }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        match self.fences.get_mut(&fence) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(RenderError::InvalidOperation {
                reason: format!("unknown fence {:?}", fence),
            }),
        }
    }
}

/// A buffer copy region, comparable unlike `vk::BufferCopy`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopyRegion {
    /// Offset in the source buffer
    pub src_offset: u64,
    /// Offset in the destination buffer
    pub dst_offset: u64,
    /// Bytes copied
    pub size: u64,
}

/// A command captured by [`HeadlessRecorder`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RecordedCommand {
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    PushDescriptors {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        bindings: Vec<DescriptorBufferBinding>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<BufferCopyRegion>,
    },
    PipelineBarrier(MemoryBarrier),
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndexedIndirect {
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    DrawMeshTasksIndirect {
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
}

/// Records commands into a list
#[derive(Debug, Default, Clone)]
pub struct HeadlessRecorder {
    commands: Vec<RecordedCommand>,
    no_mesh_tasks: bool,
}

impl HeadlessRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder behaving like a device without `VK_EXT_mesh_shader`
    pub fn without_mesh_shading() -> Self {
        Self {
            no_mesh_tasks: true,
            ..Self::default()
        }
    }

    /// Commands recorded so far
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Forget all recorded commands
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl CommandRecorder for HeadlessRecorder {
    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.commands.push(RecordedCommand::BindPipeline { bind_point, pipeline });
    }

    fn push_descriptor_buffers(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        bindings: &[DescriptorBufferBinding],
    ) {
        self.commands.push(RecordedCommand::PushDescriptors {
            bind_point,
            layout,
            bindings: bindings.to_vec(),
        });
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        self.commands.push(RecordedCommand::PushConstants {
            layout,
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.commands.push(RecordedCommand::Dispatch {
            x: group_count_x,
            y: group_count_y,
            z: group_count_z,
        });
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.commands.push(RecordedCommand::CopyBuffer {
            src,
            dst,
            regions: regions
                .iter()
                .map(|region| BufferCopyRegion {
                    src_offset: region.src_offset,
                    dst_offset: region.dst_offset,
                    size: region.size,
                })
                .collect(),
        });
    }

    fn pipeline_barrier(&mut self, barrier: &MemoryBarrier) {
        self.commands.push(RecordedCommand::PipelineBarrier(*barrier));
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: u64, index_type: vk::IndexType) {
        self.commands.push(RecordedCommand::BindIndexBuffer {
            buffer,
            offset,
            index_type,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.commands.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn draw_indexed_indirect(&mut self, buffer: vk::Buffer, offset: u64, draw_count: u32, stride: u32) {
        self.commands.push(RecordedCommand::DrawIndexedIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }

    fn supports_mesh_tasks(&self) -> bool {
        !self.no_mesh_tasks
    }

    fn draw_mesh_tasks_indirect(&mut self, buffer: vk::Buffer, offset: u64, draw_count: u32, stride: u32) {
        if self.no_mesh_tasks {
            log::error!("Mesh-task draw on a recorder without mesh shading; skipped");
            return;
        }
        self.commands.push(RecordedCommand::DrawMeshTasksIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MemoryLocation;

    fn desc(size: u64, usage: vk::BufferUsageFlags) -> BufferDesc<'static> {
        BufferDesc {
            size,
            usage,
            location: MemoryLocation::CpuToGpu,
            label: "test",
        }
    }

    #[test]
    fn test_addresses_only_when_requested() {
        let mut device = HeadlessDevice::new();
        let plain = device.create_buffer(&desc(16, vk::BufferUsageFlags::TRANSFER_SRC)).unwrap();
        let a = device
            .create_buffer(&desc(300, vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS))
            .unwrap();
        let b = device
            .create_buffer(&desc(16, vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS))
            .unwrap();

        assert_eq!(plain.device_address, 0);
        assert_eq!(a.device_address, ADDRESS_BASE);
        assert_eq!(b.device_address, ADDRESS_BASE + 512);
        assert_eq!(device.buffer_label(a.handle), Some("test"));
    }

    #[test]
    fn test_write_out_of_bounds_rejected() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer(&desc(8, vk::BufferUsageFlags::TRANSFER_SRC)).unwrap();
        assert!(device.write_buffer(&buffer, 4, &[1, 2, 3, 4]).is_ok());
        assert!(device.write_buffer(&buffer, 6, &[1, 2, 3]).is_err());
        assert_eq!(device.buffer_bytes(buffer.handle).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_submit_replays_copies_and_signals() {
        let mut device = HeadlessDevice::new();
        let src = device.create_buffer(&desc(8, vk::BufferUsageFlags::TRANSFER_SRC)).unwrap();
        let dst = device.create_buffer(&desc(4, vk::BufferUsageFlags::TRANSFER_DST)).unwrap();
        device.write_buffer(&src, 0, &[9, 8, 7, 6, 5, 4, 3, 2]).unwrap();
        let fence = device.create_fence().unwrap();

        let mut recorder = HeadlessRecorder::new();
        recorder.copy_buffer(
            src.handle,
            dst.handle,
            &[vk::BufferCopy {
                src_offset: 4,
                dst_offset: 0,
                size: 4,
            }],
        );
        assert!(device.wait_for_fence(fence, 10).is_err());

        device.submit(&recorder, fence);
        assert_eq!(device.buffer_bytes(dst.handle).unwrap(), &[5, 4, 3, 2]);
        assert!(device.wait_for_fence(fence, 10).is_ok());
    }

    #[test]
    fn test_allocation_limit() {
        let mut device = HeadlessDevice::new();
        device.set_allocation_limit(Some(32));
        assert_eq!(
            device.create_buffer(&desc(64, vk::BufferUsageFlags::TRANSFER_SRC)),
            Err(RenderError::AllocationFailed { requested: 64 })
        );
        assert!(device.create_buffer(&desc(32, vk::BufferUsageFlags::TRANSFER_SRC)).is_ok());
    }
}
