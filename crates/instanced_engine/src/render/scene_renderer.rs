//! Scene Renderer - drives one frame from scene update to draw submission
//!
//! ```text
//! SceneManager::update      propagate transforms, camera, SceneData
//! FrameScheduler::begin     wait slot fence, flush deletions
//! gather                    InstanceData + draw records for the mode
//! FrameBufferSynchronizer   stage, copy, barrier
//! cull dispatch             GPU-driven / meshlet modes only
//! draws                     direct, indexed indirect or mesh-task indirect
//! ```
//!
//! Command buffer begin/end, queue submission with the slot fence, render
//! pass and presentation belong to the caller.

use ash::vk;

use crate::core::{RenderMode, RendererConfig};
use crate::scene::{collect_debug_lines, DebugLine, FrameGeometry, GatherStats, SceneManager};

use super::cull_dispatch::{dispatch_instance_cull, dispatch_meshlet_cull, CullPipeline};
use super::device::{CommandRecorder, DescriptorBufferBinding, GpuDevice};
use super::error::{RenderError, RenderResult};
use super::frame::FrameScheduler;
use super::frame_buffers::{FrameBufferSynchronizer, FrameBuffers};
use super::gpu_types::{DrawIndexedIndirectCommand, DrawMeshTasksIndirectCommand, DrawPushConstants};

/// A graphics pipeline and its layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsPipeline {
    /// Graphics pipeline
    pub pipeline: vk::Pipeline,
    /// Layout with a push-descriptor set 0 and a push-constant range
    pub layout: vk::PipelineLayout,
    /// Stages covered by the push-constant range
    pub push_constant_stages: vk::ShaderStageFlags,
}

/// Pipelines built by the pipeline collaborator
///
/// Missing pipelines make the matching mode skip its pass with a warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderPipelines {
    /// Vertex pipeline for the indexed modes
    pub mesh: Option<GraphicsPipeline>,
    /// Task/mesh pipeline for the meshlet mode
    pub meshlet: Option<GraphicsPipeline>,
    /// Per-instance cull compute pipeline
    pub instance_cull: Option<CullPipeline>,
    /// Per-mesh-draw cull compute pipeline
    pub meshlet_cull: Option<CullPipeline>,
}

/// Counters of one rendered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame counter
    pub frame_number: u64,
    /// In-flight slot used
    pub slot: usize,
    /// Fence the caller must submit the frame with
    pub fence: vk::Fence,
    /// Mode the frame was rendered in
    pub mode: RenderMode,
    /// Gather counters
    pub gather: GatherStats,
    /// Whether a cull pass was recorded
    pub cull_dispatched: bool,
    /// Draw calls recorded (a multi-draw indirect counts once)
    pub draw_calls: usize,
    /// Bytes copied from staging
    pub bytes_uploaded: u64,
    /// Buffers created this frame
    pub buffers_created: usize,
    /// Buffers queued for deferred deletion this frame
    pub buffers_retired: usize,
}

/// Per-frame orchestration of the scene core
pub struct SceneRenderer {
    config: RendererConfig,
    scheduler: FrameScheduler,
    buffers: FrameBufferSynchronizer,
    pipelines: RenderPipelines,
    index_buffer: vk::Buffer,
    geometry: FrameGeometry,
    debug_lines: Vec<DebugLine>,
}

impl SceneRenderer {
    /// Create the renderer and its frame slots
    ///
    /// `index_buffer` is the shared index buffer all indexed meshes live in.
    pub fn new(
        device: &mut dyn GpuDevice,
        config: RendererConfig,
        pipelines: RenderPipelines,
        index_buffer: vk::Buffer,
    ) -> RenderResult<Self> {
        config.validate().map_err(|e| RenderError::InvalidOperation {
            reason: e.to_string(),
        })?;
        log::info!(
            "Creating SceneRenderer: {} frames in flight, {} mode, {:?} buffers",
            config.max_frames_in_flight,
            config.render_mode.label(),
            config.buffer_policy
        );

        let scheduler = FrameScheduler::new(device, config.max_frames_in_flight, config.fence_timeout_ns())?;
        let buffers = FrameBufferSynchronizer::new(config.max_frames_in_flight, config.buffer_policy);

        Ok(Self {
            config,
            scheduler,
            buffers,
            pipelines,
            index_buffer,
            geometry: FrameGeometry::default(),
            debug_lines: Vec::new(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Switch the culling/draw strategy from the next frame on
    pub fn set_render_mode(&mut self, mode: RenderMode) {
        if self.config.render_mode != mode {
            log::info!("Render mode: {} -> {}", self.config.render_mode.label(), mode.label());
            self.config.render_mode = mode;
        }
    }

    /// Toggle host frustum culling in CPU-driven mode
    pub fn set_frustum_culling(&mut self, enabled: bool) {
        self.config.frustum_culling = enabled;
    }

    /// Records gathered for the last frame
    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Debug lines generated for the last frame
    pub fn debug_lines(&self) -> &[DebugLine] {
        &self.debug_lines
    }

    /// Record one frame into `recorder`
    ///
    /// The caller submits the recorded commands with [`FrameStats::fence`].
    /// A [`RenderError::MainCamera`] or [`RenderError::AllocationFailed`]
    /// error means the frame was dropped and the next one can be attempted.
    /// Meshlet mode fails with [`RenderError::InvalidOperation`] before
    /// anything is recorded when `recorder` cannot draw mesh tasks.
    pub fn render_frame(
        &mut self,
        scene: &mut SceneManager,
        device: &mut dyn GpuDevice,
        recorder: &mut dyn CommandRecorder,
    ) -> RenderResult<FrameStats> {
        let mode = self.config.render_mode;
        if mode == RenderMode::Meshlet && !recorder.supports_mesh_tasks() {
            return Err(RenderError::InvalidOperation {
                reason: "meshlet mode requires VK_EXT_mesh_shader".to_string(),
            });
        }

        let scene_data = *scene.update()?;
        let slot = self.scheduler.begin_frame(device)?;

        let gather = scene.gather(mode, self.config.frustum_culling, &mut self.geometry);

        let upload = match self.buffers.upload(
            device,
            recorder,
            self.scheduler.deletion_queue(slot.index),
            slot.index,
            mode,
            &self.geometry,
            &scene_data,
        ) {
            Ok(upload) => upload,
            Err(e) => {
                log::error!("Frame {} upload failed: {}", slot.frame_number, e);
                self.scheduler.abort_frame();
                return Err(e);
            }
        };

        let cull_dispatched = self.record_cull(recorder, mode, &upload.buffers);
        let draw_calls = self.record_draws(recorder, mode, &upload.buffers);

        self.debug_lines = collect_debug_lines(
            scene.debug(),
            &scene.camera().map_or_else(crate::foundation::math::Mat4::identity, |camera| camera.view),
            &self.geometry.instances,
        );

        self.scheduler.end_frame();
        scene.commit_frame();

        Ok(FrameStats {
            frame_number: slot.frame_number,
            slot: slot.index,
            fence: slot.fence,
            mode,
            gather,
            cull_dispatched,
            draw_calls,
            bytes_uploaded: upload.bytes_uploaded,
            buffers_created: upload.buffers_created,
            buffers_retired: upload.buffers_retired,
        })
    }

    /// Wait for all slots and free every renderer-owned resource
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.scheduler.destroy(device);
        self.buffers.destroy(device);
        log::info!("SceneRenderer destroyed");
    }

    fn record_cull(&self, recorder: &mut dyn CommandRecorder, mode: RenderMode, buffers: &FrameBuffers) -> bool {
        match mode {
            RenderMode::CpuDriven => false,
            RenderMode::GpuDriven => match &self.pipelines.instance_cull {
                Some(pipeline) => dispatch_instance_cull(
                    recorder,
                    pipeline,
                    buffers,
                    self.geometry.draws.len() as u32,
                    self.geometry.instances.len() as u32,
                ),
                None => {
                    log::warn!("GPU-driven mode without an instance cull pipeline");
                    false
                }
            },
            RenderMode::Meshlet => match &self.pipelines.meshlet_cull {
                Some(pipeline) => dispatch_meshlet_cull(
                    recorder,
                    pipeline,
                    buffers,
                    self.geometry.mesh_tasks.len() as u32,
                    self.geometry.instances.len() as u32,
                ),
                None => {
                    log::warn!("Meshlet mode without a meshlet cull pipeline");
                    false
                }
            },
        }
    }

    fn record_draws(&self, recorder: &mut dyn CommandRecorder, mode: RenderMode, buffers: &FrameBuffers) -> usize {
        let pipeline = match mode {
            RenderMode::CpuDriven | RenderMode::GpuDriven => self.pipelines.mesh,
            RenderMode::Meshlet => self.pipelines.meshlet,
        };
        let Some(pipeline) = pipeline else {
            log::warn!("No graphics pipeline for {} mode, nothing drawn", mode.label());
            return 0;
        };
        let (Some(scene), Some(_)) = (buffers.scene, buffers.instances) else {
            return 0;
        };

        let addresses = buffers.addresses();
        let constants = DrawPushConstants {
            instances_address: addresses.instances,
            instance_output_address: addresses.instance_output,
            mesh_draws_address: addresses.mesh_draws,
        };

        recorder.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
        recorder.push_descriptor_buffers(
            vk::PipelineBindPoint::GRAPHICS,
            pipeline.layout,
            &[DescriptorBufferBinding::uniform(0, &scene)],
        );
        recorder.push_constants(
            pipeline.layout,
            pipeline.push_constant_stages,
            0,
            bytemuck::bytes_of(&constants),
        );

        match mode {
            RenderMode::CpuDriven => {
                recorder.bind_index_buffer(self.index_buffer, 0, vk::IndexType::UINT32);
                for draw in &self.geometry.draws {
                    recorder.draw_indexed(
                        draw.index_count,
                        draw.instance_count,
                        draw.first_index,
                        draw.vertex_offset,
                        draw.first_instance,
                    );
                }
                self.geometry.draws.len()
            }
            RenderMode::GpuDriven => {
                let Some(draws) = buffers.draws else {
                    return 0;
                };
                recorder.bind_index_buffer(self.index_buffer, 0, vk::IndexType::UINT32);
                recorder.draw_indexed_indirect(
                    draws.handle,
                    0,
                    self.geometry.draws.len() as u32,
                    std::mem::size_of::<DrawIndexedIndirectCommand>() as u32,
                );
                1
            }
            RenderMode::Meshlet => {
                let Some(tasks) = buffers.mesh_tasks else {
                    return 0;
                };
                if !recorder.supports_mesh_tasks() {
                    return 0;
                }
                recorder.draw_mesh_tasks_indirect(
                    tasks.handle,
                    0,
                    self.geometry.mesh_tasks.len() as u32,
                    std::mem::size_of::<DrawMeshTasksIndirectCommand>() as u32,
                );
                1
            }
        }
    }
}
