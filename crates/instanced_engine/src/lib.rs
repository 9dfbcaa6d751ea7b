//! # Instanced Engine
//!
//! Scene, culling and draw-submission core for scenes with very many
//! instances of a few meshes.
//!
//! ## Features
//!
//! - **ECS Scene**: entities with hierarchical transforms and incremental
//!   dirty propagation
//! - **Frustum Culling**: CPU sphere tests, or GPU compute culling with the
//!   same plane data
//! - **Three Render Modes**: CPU-culled instancing, GPU-driven indirect draws
//!   and meshlet mesh-shading
//! - **Frames in Flight**: per-slot buffers, fences and deferred deletion
//! - **Debug Freeze**: pause culling on a frozen camera and inspect the
//!   frustum from outside
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use instanced_engine::prelude::*;
//! use instanced_engine::backend::{HeadlessDevice, HeadlessRecorder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut device = HeadlessDevice::new();
//!     let mut renderer = SceneRenderer::new(
//!         &mut device,
//!         RendererConfig::default(),
//!         RenderPipelines::default(),
//!         ash::vk::Buffer::null(),
//!     )?;
//!
//!     let mut scene = SceneManager::new();
//!     let camera = CameraComponent::perspective(60.0, 16.0 / 9.0, 0.1, 500.0);
//!     scene.spawn_camera(TransformComponent::from_translation(Vec3::new(0.0, 2.0, 10.0)), camera);
//!
//!     let mut recorder = HeadlessRecorder::new();
//!     let stats = renderer.render_frame(&mut scene, &mut device, &mut recorder)?;
//!     log::info!("{} of {} instances visible", stats.gather.visible, stats.gather.total);
//!
//!     renderer.destroy(&mut device);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

// Core engine modules
pub mod core;
pub mod config;
pub mod foundation;

// Scene side
pub mod ecs;
pub mod assets;
pub mod scene;

// GPU side
pub mod render;
pub mod backend;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{MeshAsset, MeshId},
        core::{BufferPolicy, LightingConfig, RenderMode, RendererConfig},
        ecs::{
            components::{CameraComponent, MainCamera, MeshComponent, TransformComponent},
            Entity, World,
        },
        foundation::math::{Mat4, Quat, Vec3, Vec4},
        render::{
            CommandRecorder, FrameStats, GpuDevice, RenderError, RenderPipelines, RenderResult, SceneRenderer,
        },
        scene::{DebugSettings, FrameGeometry, Frustum, SceneManager},
    };
}
