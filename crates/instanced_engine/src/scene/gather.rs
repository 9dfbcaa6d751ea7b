//! Instance gathering
//!
//! Turns every entity with a mesh and a transform into GPU records for the
//! active [`RenderMode`]. Entities are visited in mesh-id order so that runs of
//! the same mesh become a single draw.

use crate::assets::MeshId;
use crate::core::RenderMode;
use crate::ecs::components::{MeshComponent, TransformComponent};
use crate::ecs::World;
use crate::render::gpu_types::{
    DrawIndexedIndirectCommand, DrawMeshTasksIndirectCommand, InstanceData, MeshDrawData,
};

use super::frustum::Frustum;

/// Most instances one mesh-task command covers
///
/// Instances ride on `group_count_y`, and 65535 is the smallest
/// `maxTaskWorkGroupCount[1]` a mesh-shading device may report. Larger runs
/// of one mesh are split into several groups.
pub const MAX_TASK_INSTANCES_PER_COMMAND: u32 = 65_535;

/// Arrays produced for one frame
///
/// Reused across frames: [`gather_instances`] clears it first, keeping the
/// allocations.
#[derive(Debug, Default, Clone)]
pub struct FrameGeometry {
    /// One record per emitted instance
    pub instances: Vec<InstanceData>,
    /// Indexed draws (CPU and GPU-driven modes)
    pub draws: Vec<DrawIndexedIndirectCommand>,
    /// Mesh draw groups (meshlet mode)
    pub mesh_draws: Vec<MeshDrawData>,
    /// Task-shader indirect commands (meshlet mode), parallel to `mesh_draws`
    pub mesh_tasks: Vec<DrawMeshTasksIndirectCommand>,
}

impl FrameGeometry {
    /// Drop all records, keeping capacity
    pub fn clear(&mut self) {
        self.instances.clear();
        self.draws.clear();
        self.mesh_draws.clear();
        self.mesh_tasks.clear();
    }

    /// Whether nothing was gathered
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
            && self.draws.is_empty()
            && self.mesh_draws.is_empty()
            && self.mesh_tasks.is_empty()
    }
}

/// Counters reported by one gather
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GatherStats {
    /// Entities carrying a mesh and a transform
    pub total: usize,
    /// Instances emitted
    pub visible: usize,
    /// Instances rejected by host culling
    pub culled: usize,
    /// Draw commands emitted (indexed or mesh-task)
    pub draw_count: usize,
}

/// Fill `out` with the records for `mode`
///
/// `culling` is only honoured in [`RenderMode::CpuDriven`]; the GPU modes
/// always emit every instance and leave culling to the compute pass.
pub fn gather_instances(
    world: &World,
    mode: RenderMode,
    culling: Option<&Frustum>,
    out: &mut FrameGeometry,
) -> GatherStats {
    gather_with_task_cap(world, mode, culling, out, MAX_TASK_INSTANCES_PER_COMMAND)
}

fn gather_with_task_cap(
    world: &World,
    mode: RenderMode,
    culling: Option<&Frustum>,
    out: &mut FrameGeometry,
    task_instance_cap: u32,
) -> GatherStats {
    out.clear();

    let rows = world.query2_sorted_by::<MeshComponent, TransformComponent, _>(|lhs, rhs| {
        lhs.1.mesh_id().cmp(&rhs.1.mesh_id())
    });

    let mut stats = GatherStats {
        total: rows.len(),
        ..Default::default()
    };
    let mut current: Option<MeshId> = None;

    for (_, mesh_component, transform) in rows {
        let mesh = &mesh_component.mesh;

        match mode {
            RenderMode::CpuDriven => {
                let draw_id = next_draw_id(current, mesh.id, out.draws.len());
                let instance = InstanceData::new(transform.world_matrix(), mesh, draw_id);
                if let Some(frustum) = culling {
                    if !frustum.is_sphere_visible(&instance.center(), instance.radius()) {
                        stats.culled += 1;
                        continue;
                    }
                }

                if current == Some(mesh.id) {
                    if let Some(draw) = out.draws.last_mut() {
                        draw.instance_count += 1;
                    }
                } else {
                    out.draws.push(DrawIndexedIndirectCommand {
                        index_count: mesh.index_count,
                        instance_count: 1,
                        first_index: mesh.first_index,
                        vertex_offset: mesh.vertex_offset,
                        first_instance: out.instances.len() as u32,
                    });
                    current = Some(mesh.id);
                }
                out.instances.push(instance);
            }
            RenderMode::GpuDriven => {
                if current != Some(mesh.id) {
                    out.draws.push(DrawIndexedIndirectCommand {
                        index_count: mesh.index_count,
                        instance_count: 0,
                        first_index: mesh.first_index,
                        vertex_offset: mesh.vertex_offset,
                        first_instance: out.instances.len() as u32,
                    });
                    current = Some(mesh.id);
                }
                let draw_id = out.draws.len() as u32 - 1;
                out.instances.push(InstanceData::new(transform.world_matrix(), mesh, draw_id));
            }
            RenderMode::Meshlet => {
                let group_full = out
                    .mesh_draws
                    .last()
                    .is_some_and(|group| group.instance_count >= task_instance_cap);
                if current != Some(mesh.id) || group_full {
                    out.mesh_draws.push(MeshDrawData::new(mesh, out.instances.len() as u32));
                    out.mesh_tasks.push(DrawMeshTasksIndirectCommand {
                        group_count_x: mesh.task_group_count(),
                        group_count_y: 0,
                        group_count_z: 1,
                    });
                    current = Some(mesh.id);
                }
                if let (Some(group), Some(task)) = (out.mesh_draws.last_mut(), out.mesh_tasks.last_mut()) {
                    group.instance_count += 1;
                    task.group_count_y += 1;
                }
                let draw_id = out.mesh_draws.len() as u32 - 1;
                out.instances.push(InstanceData::new(transform.world_matrix(), mesh, draw_id));
            }
        }
    }

    stats.visible = out.instances.len();
    stats.draw_count = match mode {
        RenderMode::CpuDriven | RenderMode::GpuDriven => out.draws.len(),
        RenderMode::Meshlet => out.mesh_tasks.len(),
    };

    log::trace!(
        "Gathered {} of {} instances into {} draws ({} mode)",
        stats.visible,
        stats.total,
        stats.draw_count,
        mode.label()
    );
    stats
}

/// Draw index an instance of `mesh` will land in if it survives culling
fn next_draw_id(current: Option<MeshId>, mesh: MeshId, draw_count: usize) -> u32 {
    if current == Some(mesh) {
        draw_count as u32 - 1
    } else {
        draw_count as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{MeshAsset, MeshletBuffers};
    use crate::ecs::Entity;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::scene::transform_propagation::propagate;
    use std::sync::Arc;

    fn mesh(id: u32, meshlet_count: u32) -> Arc<MeshAsset> {
        Arc::new(
            MeshAsset::new(MeshId(id), Vec3::zeros(), 0.5, id * 100, 36).with_meshlets(MeshletBuffers {
                vertices: 0x1000,
                meshlets: 0x2000,
                meshlet_vertices: 0x3000,
                meshlet_triangles: 0x4000,
                meshlet_count,
            }),
        )
    }

    fn world_with(entries: &[(Arc<MeshAsset>, Vec3)]) -> World {
        let mut world = World::new();
        let root = world.spawn();
        world.insert(root, TransformComponent::root());
        for (mesh, position) in entries {
            let entity: Entity = world.spawn_child(root);
            world.insert(entity, TransformComponent::from_translation(*position));
            world.insert(entity, MeshComponent::new(mesh.clone()));
        }
        propagate(&mut world, root);
        world
    }

    /// Two meshes interleaved in spawn order: 3 of mesh 1, 2 of mesh 0
    fn interleaved() -> World {
        let (a, b) = (mesh(1, 40), mesh(0, 10));
        world_with(&[
            (a.clone(), Vec3::zeros()),
            (b.clone(), Vec3::zeros()),
            (a.clone(), Vec3::zeros()),
            (b, Vec3::zeros()),
            (a, Vec3::zeros()),
        ])
    }

    #[test]
    fn test_cpu_mode_merges_same_mesh() {
        let world = interleaved();
        let mut out = FrameGeometry::default();
        let stats = gather_instances(&world, RenderMode::CpuDriven, None, &mut out);

        assert_eq!(out.draws.len(), 2);
        assert_eq!(out.draws[0].instance_count, 2);
        assert_eq!(out.draws[0].first_instance, 0);
        assert_eq!(out.draws[0].first_index, 0);
        assert_eq!(out.draws[1].instance_count, 3);
        assert_eq!(out.draws[1].first_instance, 2);
        assert_eq!(out.draws[1].first_index, 100);
        assert_eq!(out.instances.iter().map(|i| i.draw_id).collect::<Vec<_>>(), vec![0, 0, 1, 1, 1]);
        assert_eq!(stats, GatherStats { total: 5, visible: 5, culled: 0, draw_count: 2 });
    }

    #[test]
    fn test_cpu_mode_culls_outside_frustum() {
        let a = mesh(0, 1);
        let world = world_with(&[
            (a.clone(), Vec3::zeros()),
            (a.clone(), Vec3::new(5.0, 0.0, 0.0)),
            (a, Vec3::new(0.0, 0.5, 0.0)),
        ]);
        let frustum = Frustum::from_view_projection(&Mat4::identity());
        let mut out = FrameGeometry::default();
        let stats = gather_instances(&world, RenderMode::CpuDriven, Some(&frustum), &mut out);

        assert_eq!(stats.visible, 2);
        assert_eq!(stats.culled, 1);
        assert_eq!(out.draws.len(), 1);
        assert_eq!(out.draws[0].instance_count, 2);
    }

    #[test]
    fn test_cpu_mode_culled_group_gets_no_draw() {
        let (a, b) = (mesh(0, 1), mesh(1, 1));
        let world = world_with(&[(a, Vec3::new(9.0, 0.0, 0.0)), (b, Vec3::zeros())]);
        let frustum = Frustum::from_view_projection(&Mat4::identity());
        let mut out = FrameGeometry::default();
        gather_instances(&world, RenderMode::CpuDriven, Some(&frustum), &mut out);

        assert_eq!(out.draws.len(), 1);
        assert_eq!(out.draws[0].first_index, 100);
        assert_eq!(out.instances[0].draw_id, 0);
    }

    #[test]
    fn test_gpu_mode_emits_everything() {
        let a = mesh(0, 1);
        let world = world_with(&[
            (a.clone(), Vec3::new(100.0, 0.0, 0.0)),
            (a.clone(), Vec3::zeros()),
            (mesh(1, 1), Vec3::new(0.0, -100.0, 0.0)),
        ]);
        let frustum = Frustum::from_view_projection(&Mat4::identity());
        let mut out = FrameGeometry::default();
        let stats = gather_instances(&world, RenderMode::GpuDriven, Some(&frustum), &mut out);

        assert_eq!(out.instances.len(), 3);
        assert_eq!(stats.culled, 0);
        assert_eq!(out.draws.len(), 2);
        assert!(out.draws.iter().all(|draw| draw.instance_count == 0));
        assert_eq!(out.draws[1].first_instance, 2);
        assert_eq!(out.instances.iter().map(|i| i.draw_id).collect::<Vec<_>>(), vec![0, 0, 1]);
    }

    #[test]
    fn test_meshlet_mode_groups_and_task_counts() {
        let world = interleaved();
        let mut out = FrameGeometry::default();
        let stats = gather_instances(&world, RenderMode::Meshlet, None, &mut out);

        assert!(out.draws.is_empty());
        assert_eq!(out.mesh_draws.len(), 2);
        assert_eq!(out.mesh_draws[0].instance_count, 2);
        assert_eq!(out.mesh_draws[1].instance_count, 3);
        assert_eq!(out.mesh_draws[1].first_instance, 2);
        assert_eq!(out.mesh_draws[1].meshlet_count, 40);
        assert_eq!(
            out.mesh_tasks,
            vec![
                DrawMeshTasksIndirectCommand { group_count_x: 1, group_count_y: 2, group_count_z: 1 },
                DrawMeshTasksIndirectCommand { group_count_x: 2, group_count_y: 3, group_count_z: 1 },
            ]
        );
        assert_eq!(stats.draw_count, 2);
    }

    #[test]
    fn test_meshlet_mode_splits_groups_at_instance_cap() {
        let (a, b) = (mesh(0, 33), mesh(1, 8));
        let mut entries = vec![(a, Vec3::zeros()); 5];
        entries.push((b, Vec3::zeros()));
        let world = world_with(&entries);
        let mut out = FrameGeometry::default();
        let stats = gather_with_task_cap(&world, RenderMode::Meshlet, None, &mut out, 2);

        let groups: Vec<_> = out.mesh_draws.iter().map(|g| (g.first_instance, g.instance_count)).collect();
        assert_eq!(groups, vec![(0, 2), (2, 2), (4, 1), (5, 1)]);
        assert_eq!(
            out.mesh_tasks.iter().map(|t| (t.group_count_x, t.group_count_y)).collect::<Vec<_>>(),
            vec![(2, 2), (2, 2), (2, 1), (1, 1)]
        );
        assert_eq!(out.instances.iter().map(|i| i.draw_id).collect::<Vec<_>>(), vec![0, 0, 1, 1, 2, 3]);
        assert_eq!(stats.draw_count, 4);
        assert!(out.mesh_tasks.iter().all(|t| t.group_count_y <= 2));
    }

    #[test]
    fn test_empty_world_gathers_nothing() {
        let world = world_with(&[]);
        let mut out = FrameGeometry::default();
        for mode in [RenderMode::CpuDriven, RenderMode::GpuDriven, RenderMode::Meshlet] {
            let stats = gather_instances(&world, mode, None, &mut out);
            assert!(out.is_empty());
            assert_eq!(stats, GatherStats::default());
        }
    }

    #[test]
    fn test_gather_reuses_geometry() {
        let world = interleaved();
        let mut out = FrameGeometry::default();
        gather_instances(&world, RenderMode::Meshlet, None, &mut out);
        gather_instances(&world, RenderMode::CpuDriven, None, &mut out);
        assert!(out.mesh_draws.is_empty());
        assert_eq!(out.instances.len(), 5);
    }
}
