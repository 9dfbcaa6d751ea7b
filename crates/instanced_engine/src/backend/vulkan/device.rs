//! Buffer, memory and fence management on ash
//!
//! Each buffer owns one dedicated allocation. Host-visible buffers stay
//! mapped for their whole lifetime so per-frame staging writes are a plain
//! copy.

use std::collections::HashMap;
use std::ffi::c_void;

use ash::{vk, Device, Instance};

use crate::render::{BufferDesc, GpuBuffer, GpuDevice, MemoryLocation, RenderError, RenderResult};

struct Allocation {
    memory: vk::DeviceMemory,
    mapped: Option<*mut c_void>,
    size: vk::DeviceSize,
}

/// [`GpuDevice`] over an existing ash logical device
///
/// The instance and device are borrowed: the caller creates them with
/// `bufferDeviceAddress` enabled and destroys them after this object.
pub struct VulkanDevice {
    device: Device,
    instance: Instance,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    allocations: HashMap<vk::Buffer, Allocation>,
    fences: Vec<vk::Fence>,
}

impl VulkanDevice {
    /// Wrap a logical device
    pub fn new(instance: Instance, device: Device, physical_device: vk::PhysicalDevice) -> Self {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        Self {
            device,
            instance,
            physical_device,
            memory_properties,
            allocations: HashMap::new(),
            fences: Vec::new(),
        }
    }

    /// The wrapped logical device
    pub fn handle(&self) -> &Device {
        &self.device
    }

    /// The instance the device was created from
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The physical device
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Buffers currently alive
    pub fn live_buffer_count(&self) -> usize {
        self.allocations.len()
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
        device_address: bool,
    ) -> RenderResult<vk::DeviceMemory> {
        let memory_type_index = find_memory_type(&self.memory_properties, requirements.memory_type_bits, properties)?;

        let mut flags_info = vk::MemoryAllocateFlagsInfo::builder().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let mut alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        if device_address {
            alloc_info = alloc_info.push_next(&mut flags_info);
        }

        let result = unsafe { self.device.allocate_memory(&alloc_info, None) };
        result.map_err(|err| match err {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                RenderError::AllocationFailed {
                    requested: requirements.size,
                }
            }
            other => other.into(),
        })
    }

    fn free(&self, buffer: vk::Buffer, allocation: &Allocation) {
        unsafe {
            if allocation.mapped.is_some() {
                self.device.unmap_memory(allocation.memory);
            }
            self.device.destroy_buffer(buffer, None);
            self.device.free_memory(allocation.memory, None);
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> RenderResult<GpuBuffer> {
        if desc.size == 0 {
            return Err(RenderError::InvalidOperation {
                reason: format!("zero-sized buffer '{}'", desc.label),
            });
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let properties = match desc.location {
            MemoryLocation::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryLocation::CpuToGpu => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        };
        let wants_address = desc.usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS);

        let memory = match self.allocate(requirements, properties, wants_address) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        let bound = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) };
        let mapped = match (bound, desc.location) {
            (Err(err), _) => Err(err),
            (Ok(()), MemoryLocation::GpuOnly) => Ok(None),
            (Ok(()), MemoryLocation::CpuToGpu) => unsafe {
                self.device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                    .map(Some)
            },
        };
        let mapped = match mapped {
            Ok(mapped) => mapped,
            Err(err) => {
                unsafe {
                    self.device.destroy_buffer(buffer, None);
                    self.device.free_memory(memory, None);
                }
                return Err(err.into());
            }
        };

        let device_address = if wants_address {
            let info = vk::BufferDeviceAddressInfo::builder().buffer(buffer);
            unsafe { self.device.get_buffer_device_address(&info) }
        } else {
            0
        };

        self.allocations.insert(
            buffer,
            Allocation {
                memory,
                mapped,
                size: desc.size,
            },
        );
        log::debug!(
            "Created buffer '{}': {} bytes ({} allocated), {:?}",
            desc.label,
            desc.size,
            requirements.size,
            desc.location
        );

        Ok(GpuBuffer {
            handle: buffer,
            size: desc.size,
            device_address,
        })
    }

    fn destroy_buffer(&mut self, buffer: GpuBuffer) {
        match self.allocations.remove(&buffer.handle) {
            Some(allocation) => self.free(buffer.handle, &allocation),
            None => log::warn!("Destroying unknown buffer {:?}", buffer.handle),
        }
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> RenderResult<()> {
        let allocation = self
            .allocations
            .get(&buffer.handle)
            .ok_or_else(|| RenderError::InvalidOperation {
                reason: format!("write to unknown buffer {:?}", buffer.handle),
            })?;
        let Some(mapped) = allocation.mapped else {
            return Err(RenderError::InvalidOperation {
                reason: format!("write to device-local buffer {:?}", buffer.handle),
            });
        };
        if offset + data.len() as u64 > allocation.size {
            return Err(RenderError::InvalidOperation {
                reason: format!(
                    "write of {} bytes at {} exceeds buffer size {}",
                    data.len(),
                    offset,
                    allocation.size
                ),
            });
        }

        // Memory is host-coherent, no flush needed.
        unsafe {
            let dst = mapped.cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    fn create_fence(&mut self) -> RenderResult<vk::Fence> {
        let create_info = vk::FenceCreateInfo::builder();
        let fence = unsafe { self.device.create_fence(&create_info, None) }?;
        self.fences.push(fence);
        Ok(fence)
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        self.fences.retain(|&known| known != fence);
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> RenderResult<()> {
        let result = unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) };
        result.map_err(|err| match err {
            vk::Result::TIMEOUT => RenderError::FenceTimeout { timeout_ns },
            other => other.into(),
        })
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        if !self.allocations.is_empty() || !self.fences.is_empty() {
            log::warn!(
                "VulkanDevice dropped with {} buffers and {} fences alive; releasing",
                self.allocations.len(),
                self.fences.len()
            );
        }
        for (buffer, allocation) in std::mem::take(&mut self.allocations) {
            self.free(buffer, &allocation);
        }
        for fence in self.fences.drain(..) {
            unsafe { self.device.destroy_fence(fence, None) };
        }
    }
}

/// Index of the first memory type allowed by `type_filter` with all of `properties`
pub(crate) fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize].property_flags.contains(properties)
        })
        .ok_or(RenderError::NoSuitableMemoryType)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &property_flags) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = property_flags;
        }
        props
    }

    #[test]
    fn test_find_memory_type_respects_filter() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(find_memory_type(&props, 0b111, host), Ok(1));
        assert_eq!(find_memory_type(&props, 0b100, host), Ok(2));
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Ok(0)
        );
    }

    #[test]
    fn test_find_memory_type_none() {
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Err(RenderError::NoSuitableMemoryType)
        );
    }
}
