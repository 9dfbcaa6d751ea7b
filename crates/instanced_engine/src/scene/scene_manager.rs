//! Scene Manager - owns the ECS world and produces per-frame scene state
//!
//! Each frame the manager:
//! 1. Propagates dirty transforms down the hierarchy
//! 2. Resolves the main camera into view/projection matrices
//! 3. Builds the [`SceneData`] uniform, honouring the culling freeze
//! 4. Hands the world to the instance gatherer

use std::sync::Arc;

use crate::assets::MeshAsset;
use crate::core::{LightingConfig, RenderMode};
use crate::ecs::components::{CameraComponent, MainCamera, MeshComponent, TransformComponent};
use crate::ecs::{Entity, World};
use crate::foundation::math::{Mat4, Mat4Ext, Vec3, Vec4};
use crate::render::gpu_types::SceneData;
use crate::render::{RenderError, RenderResult};

use super::debug::{DebugSettings, FrozenCamera};
use super::frustum::Frustum;
use super::gather::{gather_instances, FrameGeometry, GatherStats};
use super::transform_propagation::propagate;

/// Live camera matrices resolved during [`SceneManager::update`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// World to view
    pub view: Mat4,
    /// View to clip
    pub projection: Mat4,
    /// `projection * view`
    pub view_projection: Mat4,
    /// Camera world position
    pub position: Vec3,
}

/// Scene Manager - the ECS world plus the camera and debug state around it
pub struct SceneManager {
    world: World,
    root: Entity,
    debug: DebugSettings,
    lighting: LightingConfig,
    camera: Option<CameraState>,
    /// View-projection of the last committed unpaused frame; becomes next frame's previous
    last_unpaused_view_projection: Option<Mat4>,
    /// View-projection built by the last update, committed once its frame is submitted
    pending_view_projection: Option<Mat4>,
    scene_data: SceneData,
    live_frustum: Frustum,
    culling_frustum: Frustum,
}

impl SceneManager {
    /// Create an empty scene with default lighting
    pub fn new() -> Self {
        Self::with_lighting(LightingConfig::default())
    }

    /// Create an empty scene with the given lighting
    pub fn with_lighting(lighting: LightingConfig) -> Self {
        let mut world = World::new();
        let root = world.spawn();
        world.insert(root, TransformComponent::root());

        Self {
            world,
            root,
            debug: DebugSettings::default(),
            lighting,
            camera: None,
            last_unpaused_view_projection: None,
            pending_view_projection: None,
            scene_data: SceneData::default(),
            live_frustum: Frustum::default(),
            culling_frustum: Frustum::default(),
        }
    }

    /// The ECS world
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable ECS world
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Root of the transform hierarchy
    pub fn root(&self) -> Entity {
        self.root
    }

    /// Spawn an entity with `transform` under `parent` (the root if `None`)
    pub fn spawn(&mut self, parent: Option<Entity>, transform: TransformComponent) -> Entity {
        let entity = self.world.spawn_child(parent.unwrap_or(self.root));
        self.world.insert(entity, transform);
        entity
    }

    /// Spawn a mesh instance under the root
    pub fn spawn_mesh(&mut self, transform: TransformComponent, mesh: Arc<MeshAsset>) -> Entity {
        let entity = self.spawn(None, transform);
        self.world.insert(entity, MeshComponent::new(mesh));
        entity
    }

    /// Spawn the main camera under the root
    ///
    /// Spawning a second main camera makes [`Self::update`] fail until one of
    /// them is despawned or loses its [`MainCamera`] marker.
    pub fn spawn_camera(&mut self, transform: TransformComponent, camera: CameraComponent) -> Entity {
        let entity = self.spawn(None, transform);
        self.world.insert(entity, camera);
        self.world.insert(entity, MainCamera);
        entity
    }

    /// Despawn an entity and its subtree; the root cannot be despawned
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if entity == self.root {
            log::warn!("Refusing to despawn the scene root");
            return false;
        }
        self.world.despawn(entity)
    }

    /// Move `child` under `parent` (the root if `None`)
    pub fn set_parent(&mut self, child: Entity, parent: Option<Entity>) -> bool {
        if child == self.root {
            return false;
        }
        self.world.set_parent(child, Some(parent.unwrap_or(self.root)))
    }

    /// Debug settings
    pub fn debug(&self) -> &DebugSettings {
        &self.debug
    }

    /// Mutable debug settings
    pub fn debug_mut(&mut self) -> &mut DebugSettings {
        &mut self.debug
    }

    /// Lighting constants
    pub fn lighting(&self) -> &LightingConfig {
        &self.lighting
    }

    /// Replace the lighting constants
    pub fn set_lighting(&mut self, lighting: LightingConfig) {
        self.lighting = lighting;
    }

    /// Freeze culling at the camera of the last update
    ///
    /// Returns `false` if already frozen or no camera has been resolved yet.
    pub fn freeze_culling(&mut self) -> bool {
        let Some(camera) = self.camera else {
            log::warn!("Cannot pause culling before the first scene update");
            return false;
        };
        self.debug.freeze(FrozenCamera {
            view: camera.view,
            projection: camera.projection,
            view_projection: camera.view_projection,
            position: camera.position,
            previous_view_projection: Mat4::from(self.scene_data.previous_view_projection),
        })
    }

    /// Resume culling against the live camera
    pub fn unfreeze_culling(&mut self) {
        self.debug.unfreeze();
    }

    /// Propagate transforms, resolve the camera and rebuild the scene uniform
    ///
    /// Fails with [`RenderError::MainCamera`] unless exactly one entity carries
    /// both [`MainCamera`] and [`CameraComponent`]; the previous scene data is
    /// left untouched in that case.
    ///
    /// The camera of this update only becomes the next frame's previous
    /// view-projection after [`Self::commit_frame`]; a dropped frame leaves
    /// the previous matrix where it was.
    pub fn update(&mut self) -> RenderResult<&SceneData> {
        propagate(&mut self.world, self.root);

        let camera = self.resolve_main_camera()?;
        self.camera = Some(camera);

        let previous = self
            .last_unpaused_view_projection
            .unwrap_or(camera.view_projection);
        self.pending_view_projection = if self.debug.pause_culling() {
            None
        } else {
            Some(camera.view_projection)
        };

        self.live_frustum = Frustum::from_view_projection(&camera.view_projection);
        self.culling_frustum = match self.debug.frozen() {
            Some(frozen) => Frustum::from_view_projection(&frozen.view_projection),
            None => self.live_frustum,
        };

        self.scene_data = self.build_scene_data(&camera, &previous);
        Ok(&self.scene_data)
    }

    /// Mark the frame built by the last [`Self::update`] as submitted
    ///
    /// Its view-projection becomes the previous one for the next update,
    /// unless culling was paused. Calling this twice is a no-op.
    pub fn commit_frame(&mut self) {
        if let Some(view_projection) = self.pending_view_projection.take() {
            self.last_unpaused_view_projection = Some(view_projection);
        }
    }

    /// Scene uniform built by the last successful [`Self::update`]
    pub fn scene_data(&self) -> &SceneData {
        &self.scene_data
    }

    /// Live camera of the last successful update
    pub fn camera(&self) -> Option<&CameraState> {
        self.camera.as_ref()
    }

    /// Frustum of the live camera
    pub fn live_frustum(&self) -> &Frustum {
        &self.live_frustum
    }

    /// Frustum used for culling: the frozen one while paused
    pub fn culling_frustum(&self) -> &Frustum {
        &self.culling_frustum
    }

    /// Gather instance and draw records for `mode`
    pub fn gather(&self, mode: RenderMode, frustum_culling: bool, out: &mut FrameGeometry) -> GatherStats {
        let culling = frustum_culling.then_some(&self.culling_frustum);
        gather_instances(&self.world, mode, culling, out)
    }

    fn resolve_main_camera(&self) -> RenderResult<CameraState> {
        let cameras = self.world.query2::<MainCamera, CameraComponent>();
        let [(entity, _, camera)] = cameras.as_slice() else {
            log::warn!("Scene has {} main cameras, skipping frame", cameras.len());
            return Err(RenderError::MainCamera { found: cameras.len() });
        };

        let camera_world = self
            .world
            .get::<TransformComponent>(*entity)
            .map_or_else(Mat4::identity, |transform| *transform.world_matrix());
        let view = camera_world
            .try_inverse()
            .ok_or_else(|| RenderError::InvalidOperation {
                reason: "main camera transform is not invertible".to_string(),
            })?;
        let projection = camera.projection_matrix();

        Ok(CameraState {
            view,
            projection,
            view_projection: projection * view,
            position: Vec3::new(camera_world.m14, camera_world.m24, camera_world.m34),
        })
    }

    fn build_scene_data(&self, camera: &CameraState, previous: &Mat4) -> SceneData {
        let debug_camera = self.debug.frozen().copied().unwrap_or(FrozenCamera {
            view: camera.view,
            projection: camera.projection,
            view_projection: camera.view_projection,
            position: camera.position,
            previous_view_projection: *previous,
        });

        let sun = Vec3::from(self.lighting.sun_direction)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| -Vec3::y());
        let [sun_r, sun_g, sun_b] = self.lighting.sun_color;
        let [ambient_r, ambient_g, ambient_b] = self.lighting.ambient_color;

        SceneData {
            view: camera.view.to_cols_array(),
            view_inverse_transpose: camera
                .view
                .try_inverse()
                .map_or_else(Mat4::identity, |inverse| inverse.transpose())
                .to_cols_array(),
            projection: camera.projection.to_cols_array(),
            view_projection: camera.view_projection.to_cols_array(),
            previous_view_projection: previous.to_cols_array(),
            debug_view: debug_camera.view.to_cols_array(),
            debug_projection: debug_camera.projection.to_cols_array(),
            debug_view_projection: debug_camera.view_projection.to_cols_array(),
            debug_previous_view_projection: debug_camera.previous_view_projection.to_cols_array(),
            frustum_planes: self.live_frustum.to_gpu(),
            debug_frustum_planes: self.culling_frustum.to_gpu(),
            camera_position: point(&camera.position),
            debug_camera_position: point(&debug_camera.position),
            sun_direction: [sun.x, sun.y, sun.z, self.lighting.sun_intensity],
            sun_color: [sun_r, sun_g, sun_b, 0.0],
            ambient_color: [ambient_r, ambient_g, ambient_b, self.lighting.ambient_intensity],
            debug_opacity: [
                self.debug.frustum_opacity(),
                self.debug.bounds_opacity(),
                self.debug.cones_opacity(),
                0.0,
            ],
            use_debug_frustum: u32::from(self.debug.pause_culling()),
            debug_flags: self.debug.flags().bits(),
            _padding: [0; 2],
        }
    }
}

impl Default for SceneManager {
    fn default() -> Self {
        Self::new()
    }
}

fn point(position: &Vec3) -> [f32; 4] {
    Vec4::new(position.x, position.y, position.z, 1.0).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MeshId;
    use approx::assert_relative_eq;

    fn scene_with_camera() -> (SceneManager, Entity) {
        let mut scene = SceneManager::new();
        let camera = scene.spawn_camera(
            TransformComponent::from_translation(Vec3::new(0.0, 0.0, 10.0)),
            CameraComponent::default(),
        );
        (scene, camera)
    }

    fn move_camera(scene: &mut SceneManager, camera: Entity, x: f32) {
        scene
            .world_mut()
            .get_mut::<TransformComponent>(camera)
            .unwrap()
            .set_translation(Vec3::new(x, 0.0, 10.0));
    }

    fn vp(scene: &SceneManager) -> Mat4 {
        scene.camera().unwrap().view_projection
    }

    fn frame(scene: &mut SceneManager) {
        scene.update().unwrap();
        scene.commit_frame();
    }

    #[test]
    fn test_update_requires_one_main_camera() {
        let mut scene = SceneManager::new();
        assert_eq!(scene.update().unwrap_err(), RenderError::MainCamera { found: 0 });

        scene.spawn_camera(TransformComponent::identity(), CameraComponent::default());
        assert!(scene.update().is_ok());

        scene.spawn_camera(TransformComponent::identity(), CameraComponent::default());
        assert_eq!(scene.update().unwrap_err(), RenderError::MainCamera { found: 2 });
    }

    #[test]
    fn test_view_is_inverse_of_camera_world() {
        let (mut scene, _) = scene_with_camera();
        scene.update().unwrap();
        let camera = scene.camera().unwrap();

        assert_relative_eq!(camera.position, Vec3::new(0.0, 0.0, 10.0));
        let origin_in_view = camera.view.transform_point(&crate::foundation::math::Point3::origin());
        assert_relative_eq!(origin_in_view.coords, Vec3::new(0.0, 0.0, -10.0), epsilon = 1e-5);
        assert!(scene.live_frustum().is_sphere_visible(&Vec3::zeros(), 1.0));
    }

    #[test]
    fn test_previous_view_projection_tracks_prior_frame() {
        let (mut scene, camera) = scene_with_camera();
        frame(&mut scene);
        let first = vp(&scene);
        assert_eq!(scene.scene_data().previous_view_projection, first.to_cols_array());

        move_camera(&mut scene, camera, 1.0);
        frame(&mut scene);
        assert_eq!(scene.scene_data().previous_view_projection, first.to_cols_array());
        assert_ne!(scene.scene_data().view_projection, first.to_cols_array());
    }

    #[test]
    fn test_uncommitted_frame_does_not_advance_previous() {
        let (mut scene, camera) = scene_with_camera();
        frame(&mut scene);
        let presented = vp(&scene);

        // built but never submitted
        move_camera(&mut scene, camera, 5.0);
        scene.update().unwrap();

        move_camera(&mut scene, camera, 9.0);
        frame(&mut scene);
        assert_eq!(scene.scene_data().previous_view_projection, presented.to_cols_array());

        // a second commit without an update changes nothing
        let current = vp(&scene);
        scene.commit_frame();
        scene.commit_frame();
        frame(&mut scene);
        assert_eq!(scene.scene_data().previous_view_projection, current.to_cols_array());
    }

    #[test]
    fn test_freeze_twice_keeps_first_snapshot() {
        let (mut scene, camera) = scene_with_camera();
        scene.update().unwrap();
        let frozen_vp = vp(&scene);
        assert!(scene.freeze_culling());

        move_camera(&mut scene, camera, 3.0);
        scene.update().unwrap();
        assert!(!scene.freeze_culling());

        assert_eq!(scene.debug().frozen().unwrap().view_projection, frozen_vp);
        assert_eq!(scene.scene_data().debug_view_projection, frozen_vp.to_cols_array());
        assert_eq!(scene.scene_data().use_debug_frustum, 1);
        assert_eq!(*scene.culling_frustum(), Frustum::from_view_projection(&frozen_vp));
    }

    #[test]
    fn test_previous_view_projection_paused_then_resumed() {
        let (mut scene, camera) = scene_with_camera();
        frame(&mut scene);
        let before_pause = vp(&scene);
        scene.freeze_culling();

        for x in [1.0, 2.0, 3.0] {
            move_camera(&mut scene, camera, x);
            frame(&mut scene);
            assert_eq!(scene.scene_data().previous_view_projection, before_pause.to_cols_array());
        }

        scene.unfreeze_culling();
        move_camera(&mut scene, camera, 4.0);
        frame(&mut scene);
        let live = vp(&scene);
        assert_eq!(scene.scene_data().use_debug_frustum, 0);

        move_camera(&mut scene, camera, 5.0);
        frame(&mut scene);
        assert_eq!(scene.scene_data().previous_view_projection, live.to_cols_array());
    }

    #[test]
    fn test_gather_uses_frozen_frustum() {
        let (mut scene, camera) = scene_with_camera();
        let mesh = Arc::new(MeshAsset::new(MeshId(0), Vec3::zeros(), 0.5, 0, 3));
        scene.spawn_mesh(TransformComponent::identity(), mesh.clone());
        scene.spawn_mesh(TransformComponent::from_translation(Vec3::new(200.0, 0.0, 0.0)), mesh);
        scene.update().unwrap();
        scene.freeze_culling();

        // live camera now looks at the far mesh; culling still uses the frozen view
        move_camera(&mut scene, camera, 200.0);
        scene.update().unwrap();

        let mut out = FrameGeometry::default();
        let stats = scene.gather(RenderMode::CpuDriven, true, &mut out);
        assert_eq!(stats.visible, 1);
        assert_relative_eq!(out.instances[0].center(), Vec3::zeros());

        scene.unfreeze_culling();
        scene.update().unwrap();
        scene.gather(RenderMode::CpuDriven, true, &mut out);
        assert_relative_eq!(out.instances[0].center(), Vec3::new(200.0, 0.0, 0.0));
    }

    #[test]
    fn test_root_cannot_be_despawned_or_moved() {
        let mut scene = SceneManager::new();
        let root = scene.root();
        assert!(!scene.despawn(root));
        assert!(!scene.set_parent(root, None));

        let a = scene.spawn(None, TransformComponent::identity());
        let b = scene.spawn(Some(a), TransformComponent::identity());
        assert!(scene.set_parent(b, None));
        assert_eq!(scene.world().parent(b), Some(root));
        assert!(scene.despawn(a));
    }
}
