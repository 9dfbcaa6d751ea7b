//! Vulkan implementation of the device seams
//!
//! Instance, device and swapchain creation stay with the application; this
//! module only needs the logical device handles and the extensions the scene
//! renderer records with (`VK_KHR_push_descriptor`, optionally
//! `VK_EXT_mesh_shader`, and the `bufferDeviceAddress` feature).

mod commands;
mod device;

pub use commands::{RecorderExtensions, VulkanCommandRecorder};
pub use device::VulkanDevice;
