//! Scene management system
//!
//! Bridges the ECS world and the renderer:
//!
//! ```text
//! ECS World (TransformComponent, MeshComponent, CameraComponent)
//!      ↓  transform_propagation
//! Scene Manager (camera, SceneData, culling freeze)
//!      ↓  gather
//! FrameGeometry (InstanceData + draw commands)
//!      ↓
//! SceneRenderer (upload, cull dispatch, draw)
//! ```

pub mod debug;
pub mod debug_draw;
pub mod frustum;
pub mod gather;
mod scene_manager;
pub mod transform_propagation;

pub use debug::{DebugFlags, DebugSettings, FrozenCamera};
pub use debug_draw::{collect_debug_lines, DebugLine};
pub use frustum::{extract_frustum_planes, is_visible, Frustum};
pub use gather::{gather_instances, FrameGeometry, GatherStats, MAX_TASK_INSTANCES_PER_COMMAND};
pub use scene_manager::{CameraState, SceneManager};
pub use transform_propagation::propagate;
