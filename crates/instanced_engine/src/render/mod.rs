//! # Rendering System
//!
//! The GPU side of the scene core: record layouts, the device seams, the
//! frames-in-flight machinery and the per-frame renderer.
//!
//! ## Architecture
//!
//! - **SceneRenderer**: per-frame coordinator (upload, cull, draw)
//! - **FrameScheduler**: slot fences and deferred deletion
//! - **FrameBufferSynchronizer**: per-slot buffers and the staging upload
//! - **Cull Dispatch**: compute passes of the GPU-driven and meshlet modes
//! - **GpuDevice / CommandRecorder**: the only contact with the graphics API

pub mod cull_dispatch;
pub mod deletion_queue;
pub mod device;
pub mod error;
pub mod frame;
pub mod frame_buffers;
pub mod gpu_types;
pub mod scene_renderer;

pub use cull_dispatch::{dispatch_instance_cull, dispatch_meshlet_cull, CullPipeline, CULL_WORKGROUP_SIZE};
pub use deletion_queue::DeletionQueue;
pub use device::{
    BufferDesc, CommandRecorder, DescriptorBufferBinding, GpuBuffer, GpuDevice, MemoryBarrier, MemoryLocation,
};
pub use error::{RenderError, RenderResult};
pub use frame::{FrameScheduler, FrameSlot};
pub use frame_buffers::{FrameAddresses, FrameBufferSynchronizer, FrameBuffers, FrameUpload, StagingLayout};
pub use gpu_types::{
    DrawIndexedIndirectCommand, DrawMeshTasksIndirectCommand, InstanceData, MeshDrawData, SceneData,
};
pub use scene_renderer::{FrameStats, GraphicsPipeline, RenderPipelines, SceneRenderer};
