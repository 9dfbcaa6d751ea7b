//! Asset metadata shared with the scene core
//!
//! Loading and uploading live outside this crate; only the metadata the
//! culling and draw paths read is modelled here.

pub mod mesh;

pub use mesh::{MeshAsset, MeshId, MeshletBuffers, MESHLETS_PER_TASK_GROUP};
