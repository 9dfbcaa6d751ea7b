//! Entity-Component-System implementation
//!
//! A small sparse-set ECS with an entity hierarchy, sized for what the scene
//! core needs: stable handles, typed storage, ordered child lists and queries
//! with an explicit ordering predicate.

pub mod component;
pub mod components;
pub mod entity;
pub mod query;
pub mod storage;
pub mod world;

pub use component::Component;
pub use entity::Entity;
pub use query::QueryRow;
pub use storage::ComponentStorage;
pub use world::World;
