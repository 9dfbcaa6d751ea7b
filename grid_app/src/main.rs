//! Grid demo application
//!
//! Builds a large grid of instanced meshes and renders it on the headless
//! backend in every render mode, logging what the culling and upload stages
//! did each frame. Pass a `.toml` or `.ron` renderer config as the first
//! argument to override the defaults.

use std::sync::Arc;

use ash::vk::{self, Handle};
use instanced_engine::backend::{HeadlessDevice, HeadlessRecorder};
use instanced_engine::config::Config;
use instanced_engine::foundation::logging;
use instanced_engine::prelude::*;
use instanced_engine::render::{
    BufferDesc, CullPipeline, GpuBuffer, GraphicsPipeline, MemoryLocation,
};
use instanced_engine::assets::MeshletBuffers;
use rand::Rng;
use thiserror::Error;

const GRID_SIZE: usize = 40;
const GRID_SPACING: f32 = 3.0;
const FRAMES_PER_MODE: usize = 4;

#[derive(Error, Debug)]
enum AppError {
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Config error: {0}")]
    Config(#[from] instanced_engine::config::ConfigError),
}

struct GridApp {
    device: HeadlessDevice,
    recorder: HeadlessRecorder,
    renderer: SceneRenderer,
    scene: SceneManager,
    index_buffer: GpuBuffer,
    camera: Entity,
    rows: Vec<Entity>,
}

impl GridApp {
    fn new(config: RendererConfig) -> Result<Self, AppError> {
        let mut device = HeadlessDevice::new();
        let index_buffer = device.create_buffer(&BufferDesc {
            size: 64 * 1024,
            usage: vk::BufferUsageFlags::INDEX_BUFFER,
            location: MemoryLocation::GpuOnly,
            label: "shared indices",
        })?;
        let renderer = SceneRenderer::new(&mut device, config, placeholder_pipelines(), index_buffer.handle)?;

        let mut scene = SceneManager::new();
        let camera = scene.spawn_camera(
            TransformComponent::from_translation(Vec3::new(0.0, 6.0, 30.0)),
            CameraComponent::perspective(60.0, 16.0 / 9.0, 0.1, 200.0),
        );
        let rows = populate_grid(&mut scene);

        log::info!(
            "Grid ready: {} rows, {} entities",
            rows.len(),
            scene.world().entity_count()
        );

        Ok(Self {
            device,
            recorder: HeadlessRecorder::new(),
            renderer,
            scene,
            index_buffer,
            camera,
            rows,
        })
    }

    fn run(&mut self) -> Result<(), AppError> {
        for mode in [RenderMode::CpuDriven, RenderMode::GpuDriven, RenderMode::Meshlet] {
            self.renderer.set_render_mode(mode);
            for _ in 0..FRAMES_PER_MODE {
                self.step(0.05);
                self.frame()?;
            }
        }

        // Freeze culling, then fly the camera away: the frozen frustum keeps
        // deciding visibility until culling resumes.
        self.renderer.set_render_mode(RenderMode::CpuDriven);
        self.frame()?;
        if self.scene.freeze_culling() {
            log::info!("Culling paused");
        }
        for _ in 0..FRAMES_PER_MODE {
            self.move_camera(Vec3::new(0.0, 0.0, 25.0));
            self.frame()?;
        }
        log::info!("{} debug lines while paused", self.renderer.debug_lines().len());
        self.scene.unfreeze_culling();
        self.frame()?;
        Ok(())
    }

    fn frame(&mut self) -> Result<(), AppError> {
        self.recorder.clear();
        match self.renderer.render_frame(&mut self.scene, &mut self.device, &mut self.recorder) {
            Ok(stats) => {
                self.device.submit(&self.recorder, stats.fence);
                log::info!(
                    "Frame {} [{}] slot {}: {}/{} visible, {} draws, {} calls, {} bytes, +{} -{} buffers",
                    stats.frame_number,
                    stats.mode.label(),
                    stats.slot,
                    stats.gather.visible,
                    stats.gather.total,
                    stats.gather.draw_count,
                    stats.draw_calls,
                    stats.bytes_uploaded,
                    stats.buffers_created,
                    stats.buffers_retired
                );
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                log::warn!("Frame dropped: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn step(&mut self, angle: f32) {
        for (i, &row) in self.rows.iter().enumerate() {
            if let Some(transform) = self.scene.world_mut().get_mut::<TransformComponent>(row) {
                let direction = if i % 2 == 0 { 1.0 } else { -1.0 };
                let spin = Quat::from_axis_angle(&Vec3::y_axis(), angle * direction);
                transform.set_rotation(spin * transform.rotation());
            }
        }
    }

    fn move_camera(&mut self, offset: Vec3) {
        if let Some(transform) = self.scene.world_mut().get_mut::<TransformComponent>(self.camera) {
            transform.translate(offset);
        }
    }

    fn shutdown(mut self) {
        self.renderer.destroy(&mut self.device);
        self.device.destroy_buffer(self.index_buffer);
        log::info!(
            "Shutdown: {} buffers created, {} still alive",
            self.device.buffers_created(),
            self.device.live_buffer_count()
        );
    }
}

/// One row entity per grid line, mesh instances as its children
fn populate_grid(scene: &mut SceneManager) -> Vec<Entity> {
    let cube = Arc::new(
        MeshAsset::new(MeshId(0), Vec3::zeros(), 0.87, 0, 36).with_meshlets(MeshletBuffers {
            meshlet_count: 2,
            ..Default::default()
        }),
    );
    let sphere = Arc::new(
        MeshAsset::new(MeshId(1), Vec3::zeros(), 1.0, 36, 2880).with_meshlets(MeshletBuffers {
            meshlet_count: 40,
            ..Default::default()
        }),
    );

    let mut rng = rand::thread_rng();
    let half = GRID_SIZE as f32 * GRID_SPACING * 0.5;
    let mut rows = Vec::with_capacity(GRID_SIZE);

    for z in 0..GRID_SIZE {
        let row_z = -(z as f32) * GRID_SPACING;
        let row = scene.spawn(None, TransformComponent::from_translation(Vec3::new(0.0, 0.0, row_z)));
        for x in 0..GRID_SIZE {
            let jitter = Vec3::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.2..0.2), rng.gen_range(-0.5..0.5));
            let position = Vec3::new(x as f32 * GRID_SPACING - half, 0.0, 0.0) + jitter;
            let mesh = if (x + z) % 3 == 0 { &sphere } else { &cube };
            let scale = rng.gen_range(0.5..1.5);

            let entity = scene.spawn(
                Some(row),
                TransformComponent::from_translation(position).with_uniform_scale(scale),
            );
            scene.world_mut().insert(entity, MeshComponent::new(Arc::clone(mesh)));
        }
        rows.push(row);
    }
    rows
}

/// Stand-in pipeline handles; the headless backend only records them
fn placeholder_pipelines() -> RenderPipelines {
    let graphics = |raw| GraphicsPipeline {
        pipeline: vk::Pipeline::from_raw(raw),
        layout: vk::PipelineLayout::from_raw(raw + 100),
        push_constant_stages: vk::ShaderStageFlags::VERTEX,
    };
    let compute = |raw| CullPipeline {
        pipeline: vk::Pipeline::from_raw(raw),
        layout: vk::PipelineLayout::from_raw(raw + 100),
    };

    RenderPipelines {
        mesh: Some(graphics(1)),
        meshlet: Some(GraphicsPipeline {
            push_constant_stages: vk::ShaderStageFlags::TASK_EXT | vk::ShaderStageFlags::MESH_EXT,
            ..graphics(2)
        }),
        instance_cull: Some(compute(3)),
        meshlet_cull: Some(compute(4)),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("info");
    log::info!("Starting grid demo");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading renderer config from {}", path);
            RendererConfig::load_from_file(&path).map_err(AppError::from)?
        }
        None => RendererConfig::default().with_buffer_policy(BufferPolicy::Growable { slack_percent: 25 }),
    };

    let mut app = GridApp::new(config)?;
    app.run()?;
    app.shutdown();

    log::info!("Grid demo finished");
    Ok(())
}
