//! # Unified Configuration System
//!
//! Configuration for the renderer core and the scene lighting constants.
//! All structures are serializable (TOML, RON) and validated before use.

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Upper bound on in-flight frames; more only adds latency.
pub const MAX_SUPPORTED_FRAMES_IN_FLIGHT: usize = 8;

/// Culling and draw strategy used for the whole frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RenderMode {
    /// Host-side frustum culling, direct draw list of visible instances
    #[default]
    CpuDriven,
    /// All instances uploaded, compute pass writes indirect instance counts
    GpuDriven,
    /// Mesh-shader path, per-meshlet culling in the task stage
    Meshlet,
}

impl RenderMode {
    /// Short label for logs and stats
    pub fn label(self) -> &'static str {
        match self {
            Self::CpuDriven => "cpu",
            Self::GpuDriven => "gpu",
            Self::Meshlet => "meshlet",
        }
    }
}

/// How per-slot device buffers are sized from frame to frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferPolicy {
    /// New buffer every frame, exactly the size needed
    Exact,
    /// Keep the slot's buffer while it is large enough; grow with headroom
    Growable {
        /// Extra capacity added on growth, in percent of the requested size
        slack_percent: u32,
    },
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::Exact
    }
}

/// # Renderer Configuration
///
/// Frame pacing and culling behaviour of the scene renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Number of in-flight frame slots
    pub max_frames_in_flight: usize,
    /// Active culling/draw strategy
    pub render_mode: RenderMode,
    /// Host frustum culling in [`RenderMode::CpuDriven`]
    pub frustum_culling: bool,
    /// Per-slot buffer sizing policy
    pub buffer_policy: BufferPolicy,
    /// Fence wait timeout before a slot is reused, in milliseconds
    pub fence_timeout_ms: u64,
}

impl RendererConfig {
    /// Create a new renderer configuration with defaults
    pub fn new() -> Self {
        Self {
            max_frames_in_flight: 2,
            render_mode: RenderMode::default(),
            frustum_culling: true,
            buffer_policy: BufferPolicy::default(),
            fence_timeout_ms: 1_000,
        }
    }

    /// Set the render mode
    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable host frustum culling
    pub fn with_frustum_culling(mut self, enabled: bool) -> Self {
        self.frustum_culling = enabled;
        self
    }

    /// Set the buffer sizing policy
    pub fn with_buffer_policy(mut self, policy: BufferPolicy) -> Self {
        self.buffer_policy = policy;
        self
    }

    /// Fence timeout in nanoseconds, as Vulkan expects it
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frames_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "Max frames in flight must be at least 1".to_string(),
            ));
        }

        if self.max_frames_in_flight > MAX_SUPPORTED_FRAMES_IN_FLIGHT {
            return Err(ConfigError::Invalid(format!(
                "Max frames in flight should not exceed {MAX_SUPPORTED_FRAMES_IN_FLIGHT}"
            )));
        }

        if let BufferPolicy::Growable { slack_percent } = self.buffer_policy {
            if slack_percent > 400 {
                return Err(ConfigError::Invalid(format!(
                    "Buffer slack of {slack_percent}% is above the 400% limit"
                )));
            }
        }

        if self.fence_timeout_ms == 0 {
            return Err(ConfigError::Invalid("Fence timeout cannot be zero".to_string()));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for RendererConfig {}

/// # Lighting Configuration
///
/// Constants copied into the scene uniform every frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightingConfig {
    /// Direction the sun light travels (world space, need not be normalized)
    pub sun_direction: [f32; 3],
    /// Sun colour (linear RGB)
    pub sun_color: [f32; 3],
    /// Sun intensity multiplier
    pub sun_intensity: f32,
    /// Ambient colour (linear RGB)
    pub ambient_color: [f32; 3],
    /// Ambient intensity multiplier
    pub ambient_intensity: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            sun_direction: [-0.7, -1.0, 0.3],
            sun_color: [1.0, 0.95, 0.9],
            sun_intensity: 1.0,
            ambient_color: [0.2, 0.2, 0.25],
            ambient_intensity: 1.0,
        }
    }
}

impl Config for LightingConfig {}
