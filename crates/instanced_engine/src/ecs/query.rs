//! Multi-component queries
//!
//! Queries walk the storage of the first component type and join the second.
//! The result order is the first storage's dense order unless an explicit
//! ordering predicate is supplied.

use std::cmp::Ordering;

use super::{Component, Entity, World};

/// One row of a two-component query
pub type QueryRow<'w, A, B> = (Entity, &'w A, &'w B);

impl World {
    /// All entities carrying both `A` and `B`
    pub fn query2<A: Component, B: Component>(&self) -> Vec<QueryRow<'_, A, B>> {
        let Some(second) = self.storage::<B>() else {
            return Vec::new();
        };
        self.iter::<A>()
            .filter_map(|(entity, a)| second.get(entity).map(|b| (entity, a, b)))
            .collect()
    }

    /// Like [`World::query2`], stably sorted by `compare`
    ///
    /// Rows comparing equal keep their storage order.
    pub fn query2_sorted_by<A, B, F>(&self, mut compare: F) -> Vec<QueryRow<'_, A, B>>
    where
        A: Component,
        B: Component,
        F: FnMut(&QueryRow<'_, A, B>, &QueryRow<'_, A, B>) -> Ordering,
    {
        let mut rows = self.query2::<A, B>();
        rows.sort_by(|lhs, rhs| compare(lhs, rhs));
        rows
    }

    /// Number of entities carrying `T`
    pub fn count<T: Component>(&self) -> usize {
        self.storage::<T>().map_or(0, |storage| storage.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Key(u32);
    impl Component for Key {}

    #[derive(Debug)]
    struct Payload(&'static str);
    impl Component for Payload {}

    #[test]
    fn test_query2_joins_only_complete_entities() {
        let mut world = World::new();
        let a = world.spawn();
        let b = world.spawn();
        world.insert(a, Key(1));
        world.insert(a, Payload("a"));
        world.insert(b, Key(2));

        let rows = world.query2::<Key, Payload>();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, a);
    }

    #[test]
    fn test_sorted_query_is_stable() {
        let mut world = World::new();
        let keys = [2, 1, 2, 1];
        let names = ["first-2", "first-1", "second-2", "second-1"];
        for (key, name) in keys.into_iter().zip(names) {
            let e = world.spawn();
            world.insert(e, Key(key));
            world.insert(e, Payload(name));
        }

        let rows = world.query2_sorted_by::<Key, Payload, _>(|l, r| l.1 .0.cmp(&r.1 .0));
        let order: Vec<_> = rows.iter().map(|row| row.2 .0).collect();
        assert_eq!(order, vec!["first-1", "second-1", "first-2", "second-2"]);
    }

    #[test]
    fn test_query_without_storage_is_empty() {
        let world = World::new();
        assert!(world.query2::<Key, Payload>().is_empty());
        assert_eq!(world.count::<Key>(), 0);
    }
}
