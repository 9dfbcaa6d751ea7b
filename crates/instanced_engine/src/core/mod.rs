//! # Core Engine Module
//!
//! Shared configuration types used by the scene and the renderer.

pub mod config;

pub use config::{
    BufferPolicy,
    Config,
    ConfigError,
    LightingConfig,
    RenderMode,
    RendererConfig,
};
