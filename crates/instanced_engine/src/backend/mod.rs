//! # Backend Module
//!
//! Concrete implementations of the [`GpuDevice`](crate::render::GpuDevice)
//! and [`CommandRecorder`](crate::render::CommandRecorder) traits.
//!
//! ## Organization
//!
//! - **Vulkan**: ash-backed device and command recording
//! - **Headless**: host-memory device and a command log, for tests and tools

pub mod headless;
pub mod vulkan;

pub use headless::{HeadlessDevice, HeadlessRecorder, RecordedCommand};
pub use vulkan::{RecorderExtensions, VulkanCommandRecorder, VulkanDevice};
