//! ECS Components module

pub mod camera;
pub mod mesh;
pub mod transform;

pub use camera::{CameraComponent, MainCamera};
pub use mesh::MeshComponent;
pub use transform::TransformComponent;
