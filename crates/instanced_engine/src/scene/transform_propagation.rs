//! Transform hierarchy update
//!
//! Two passes. The first widens the dirty set: anything below a dirty
//! transform is stale as well. The second walks the hierarchy breadth-first so
//! a parent's world matrix is always final before its children read it.

use std::collections::VecDeque;

use crate::ecs::components::TransformComponent;
use crate::ecs::{Entity, World};
use crate::foundation::math::Mat4;

/// Recompute every stale world matrix reachable from `root`
///
/// Entities without a parent other than `root` are treated as roots of their
/// own with an identity parent. Entities lacking a transform hand their
/// parent's world matrix straight to their children. Returns the number of
/// transforms recomputed.
pub fn propagate(world: &mut World, root: Entity) -> usize {
    mark_dirty_subtrees(world);

    let mut updated = resolve_subtree(world, root);
    let detached: Vec<Entity> = world.roots().filter(|&entity| entity != root).collect();
    for entity in detached {
        updated += resolve_subtree(world, entity);
    }

    if updated > 0 {
        log::trace!("Transform propagation recomputed {} world matrices", updated);
    }
    updated
}

fn mark_dirty_subtrees(world: &mut World) {
    let dirty: Vec<Entity> = world
        .iter::<TransformComponent>()
        .filter(|(_, transform)| transform.is_dirty())
        .map(|(entity, _)| entity)
        .collect();

    for entity in dirty {
        for descendant in world.cascade(entity).into_iter().skip(1) {
            if let Some(transform) = world.get_mut::<TransformComponent>(descendant) {
                transform.mark_dirty();
            }
        }
    }
}

fn resolve_subtree(world: &mut World, start: Entity) -> usize {
    let mut updated = 0;
    let mut queue = VecDeque::from([(start, Mat4::identity())]);

    while let Some((entity, parent_world)) = queue.pop_front() {
        let world_matrix = match world.get_mut::<TransformComponent>(entity) {
            Some(transform) => {
                if transform.is_dirty() {
                    transform.resolve(&parent_world);
                    updated += 1;
                }
                *transform.world_matrix()
            }
            None => parent_world,
        };
        queue.extend(world.children(entity).iter().map(|&child| (child, world_matrix)));
    }
    updated
}
