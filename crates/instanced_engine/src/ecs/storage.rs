//! Sparse-set component storage
//!
//! Components of one type live in a dense `Vec` for cache-friendly iteration.
//! A secondary map from entity to dense index gives O(1) lookup. Removal is a
//! swap-remove, so iteration order is insertion order perturbed by removals:
//! callers needing a specific order sort explicitly.

use std::any::Any;

use slotmap::SecondaryMap;

use super::{Component, Entity};

/// Dense storage for one component type
pub struct ComponentStorage<T: Component> {
    dense: Vec<T>,
    owners: Vec<Entity>,
    index: SecondaryMap<Entity, usize>,
}

impl<T: Component> ComponentStorage<T> {
    /// Create an empty storage
    pub fn new() -> Self {
        Self {
            dense: Vec::new(),
            owners: Vec::new(),
            index: SecondaryMap::new(),
        }
    }

    /// Insert or replace the component of `entity`, returning the old value
    pub fn insert(&mut self, entity: Entity, component: T) -> Option<T> {
        if let Some(&slot) = self.index.get(entity) {
            return Some(std::mem::replace(&mut self.dense[slot], component));
        }
        self.index.insert(entity, self.dense.len());
        self.dense.push(component);
        self.owners.push(entity);
        None
    }

    /// Remove the component of `entity`
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.index.remove(entity)?;
        let removed = self.dense.swap_remove(slot);
        self.owners.swap_remove(slot);

        if let Some(&moved) = self.owners.get(slot) {
            if let Some(moved_slot) = self.index.get_mut(moved) {
                *moved_slot = slot;
            }
        }
        Some(removed)
    }

    /// Component of `entity`, if present
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.index.get(entity).map(|&slot| &self.dense[slot])
    }

    /// Mutable component of `entity`, if present
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let slot = *self.index.get(entity)?;
        self.dense.get_mut(slot)
    }

    /// Whether `entity` has this component
    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains_key(entity)
    }

    /// Number of stored components
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Whether the storage is empty
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Iterate `(entity, component)` in dense order
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.owners.iter().copied().zip(self.dense.iter())
    }

    /// Iterate `(entity, component)` mutably in dense order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.owners.iter().copied().zip(self.dense.iter_mut())
    }
}

impl<T: Component> Default for ComponentStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view used by the world to clean up despawned entities
pub(crate) trait ErasedStorage: Send + Sync {
    fn remove_entity(&mut self, entity: Entity);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedStorage for ComponentStorage<T> {
    fn remove_entity(&mut self, entity: Entity) {
        self.remove(entity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
