//! ECS World implementation
//!
//! Owns entity lifetimes, the parent/child hierarchy and one sparse-set
//! storage per component type. Children keep the order in which they were
//! attached, so hierarchy walks are deterministic.

use std::any::TypeId;
use std::collections::{HashMap, VecDeque};

use slotmap::SlotMap;

use super::components::TransformComponent;
use super::storage::{ComponentStorage, ErasedStorage};
use super::{Component, Entity};

#[derive(Debug, Default)]
struct EntityNode {
    parent: Option<Entity>,
    children: Vec<Entity>,
}

/// ECS World containing all entities and components
pub struct World {
    entities: SlotMap<Entity, EntityNode>,
    storages: HashMap<TypeId, Box<dyn ErasedStorage>>,
}

impl World {
    /// Create a new world
    pub fn new() -> Self {
        Self {
            entities: SlotMap::with_key(),
            storages: HashMap::new(),
        }
    }

    /// Create a new entity with no parent
    pub fn spawn(&mut self) -> Entity {
        self.entities.insert(EntityNode::default())
    }

    /// Create a new entity attached under `parent`
    ///
    /// If `parent` is no longer alive the entity is created detached.
    pub fn spawn_child(&mut self, parent: Entity) -> Entity {
        let entity = self.spawn();
        if let Some(node) = self.entities.get_mut(parent) {
            node.children.push(entity);
            self.entities[entity].parent = Some(parent);
        } else {
            log::warn!("spawn_child: parent {:?} is not alive, entity created detached", parent);
        }
        entity
    }

    /// Despawn an entity and its whole subtree
    ///
    /// Returns `false` if the entity was already gone.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.entities.contains_key(entity) {
            return false;
        }
        self.detach(entity);

        for doomed in self.cascade(entity) {
            for storage in self.storages.values_mut() {
                storage.remove_entity(doomed);
            }
            self.entities.remove(doomed);
        }
        true
    }

    /// Move `child` under `parent` (or detach it with `None`)
    ///
    /// Rejects moves that would create a cycle. The moved subtree's transform
    /// is marked dirty since its parent matrix changed.
    pub fn set_parent(&mut self, child: Entity, parent: Option<Entity>) -> bool {
        if !self.entities.contains_key(child) {
            return false;
        }
        if let Some(parent) = parent {
            if !self.entities.contains_key(parent) || parent == child || self.is_ancestor(child, parent) {
                log::warn!("set_parent: refusing to attach {:?} under {:?}", child, parent);
                return false;
            }
        }

        self.detach(child);
        if let Some(parent) = parent {
            self.entities[parent].children.push(child);
            self.entities[child].parent = Some(parent);
        }

        if let Some(transform) = self.get_mut::<TransformComponent>(child) {
            transform.mark_dirty();
        }
        true
    }

    /// Whether the entity is alive
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.contains_key(entity)
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Parent of an entity
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.entities.get(entity).and_then(|node| node.parent)
    }

    /// Children of an entity, in attachment order
    pub fn children(&self, entity: Entity) -> &[Entity] {
        self.entities
            .get(entity)
            .map_or(&[], |node| node.children.as_slice())
    }

    /// Entities without a parent
    pub fn roots(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(entity, _)| entity)
    }

    /// Breadth-first walk of the subtree rooted at `root`, parents before children
    pub fn cascade(&self, root: Entity) -> Vec<Entity> {
        let mut order = Vec::new();
        if !self.entities.contains_key(root) {
            return order;
        }

        let mut queue = VecDeque::from([root]);
        while let Some(entity) = queue.pop_front() {
            order.push(entity);
            queue.extend(self.children(entity).iter().copied());
        }
        order
    }

    /// Add (or replace) a component on an entity
    ///
    /// Returns `false` if the entity is not alive.
    pub fn insert<T: Component>(&mut self, entity: Entity, component: T) -> bool {
        if !self.entities.contains_key(entity) {
            return false;
        }
        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ComponentStorage::<T>::new()));

        match storage.as_any_mut().downcast_mut::<ComponentStorage<T>>() {
            Some(storage) => {
                storage.insert(entity, component);
                true
            }
            None => false,
        }
    }

    /// Remove a component from an entity
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        self.storage_mut::<T>()?.remove(entity)
    }

    /// Get a component from an entity
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.storage::<T>()?.get(entity)
    }

    /// Get a mutable component from an entity
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.storage_mut::<T>()?.get_mut(entity)
    }

    /// Whether an entity has a component
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.storage::<T>().is_some_and(|storage| storage.contains(entity))
    }

    /// Typed storage, if any component of this type was ever inserted
    pub fn storage<T: Component>(&self) -> Option<&ComponentStorage<T>> {
        self.storages
            .get(&TypeId::of::<T>())?
            .as_any()
            .downcast_ref::<ComponentStorage<T>>()
    }

    /// Mutable typed storage
    pub fn storage_mut<T: Component>(&mut self) -> Option<&mut ComponentStorage<T>> {
        self.storages
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<ComponentStorage<T>>()
    }

    /// Iterate all entities carrying `T`
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.storage::<T>().into_iter().flat_map(|storage| storage.iter())
    }

    fn detach(&mut self, entity: Entity) {
        let Some(parent) = self.entities.get_mut(entity).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent_node) = self.entities.get_mut(parent) {
            parent_node.children.retain(|&child| child != entity);
        }
    }

    fn is_ancestor(&self, ancestor: Entity, mut entity: Entity) -> bool {
        while let Some(parent) = self.parent(entity) {
            if parent == ancestor {
                return true;
            }
            entity = parent;
        }
        false
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[test]
    fn test_cascade_is_breadth_first() {
        let mut world = World::new();
        let root = world.spawn();
        let a = world.spawn_child(root);
        let b = world.spawn_child(root);
        let a1 = world.spawn_child(a);
        let b1 = world.spawn_child(b);

        assert_eq!(world.cascade(root), vec![root, a, b, a1, b1]);
    }

    #[test]
    fn test_despawn_removes_subtree_and_components() {
        let mut world = World::new();
        let root = world.spawn();
        let a = world.spawn_child(root);
        let a1 = world.spawn_child(a);
        world.insert(a1, Health(3));

        assert!(world.despawn(a));
        assert!(!world.is_alive(a));
        assert!(!world.is_alive(a1));
        assert!(world.children(root).is_empty());
        assert_eq!(world.iter::<Health>().count(), 0);
        assert!(!world.despawn(a));
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let mut world = World::new();
        let a = world.spawn();
        let b = world.spawn_child(a);

        assert!(!world.set_parent(a, Some(b)));
        assert!(!world.set_parent(a, Some(a)));
        assert!(world.set_parent(b, None));
        assert_eq!(world.parent(b), None);
        assert!(world.children(a).is_empty());
    }

    #[test]
    fn test_insert_on_dead_entity_fails() {
        let mut world = World::new();
        let a = world.spawn();
        world.despawn(a);
        assert!(!world.insert(a, Health(1)));
        assert!(world.get::<Health>(a).is_none());
    }

    #[test]
    fn test_component_roundtrip() {
        let mut world = World::new();
        let a = world.spawn();
        world.insert(a, Health(10));
        world.get_mut::<Health>(a).unwrap().0 -= 4;

        assert!(world.has::<Health>(a));
        assert_eq!(world.remove::<Health>(a), Some(Health(6)));
        assert!(!world.has::<Health>(a));
    }
}
