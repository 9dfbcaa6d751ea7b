//! Rendering error types

use ash::vk;
use thiserror::Error;

/// Errors surfaced by the scene renderer and its device backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Device memory could not be allocated; the frame can be dropped and retried
    #[error("Allocation failed: {requested} bytes")]
    AllocationFailed {
        /// Number of bytes that were requested
        requested: u64,
    },

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// The logical device was lost
    #[error("Device lost")]
    DeviceLost,

    /// A frame slot fence did not signal in time
    #[error("Fence wait timed out after {timeout_ns} ns")]
    FenceTimeout {
        /// Timeout that elapsed
        timeout_ns: u64,
    },

    /// The scene does not have exactly one main camera
    #[error("Expected exactly one main camera, found {found}")]
    MainCamera {
        /// Number of main cameras present
        found: usize,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

impl RenderError {
    /// Whether the current frame can simply be skipped and the next one tried
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. } | Self::MainCamera { .. })
    }
}

impl From<vk::Result> for RenderError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            other => Self::Api(other),
        }
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_maps_from_vk() {
        assert_eq!(RenderError::from(vk::Result::ERROR_DEVICE_LOST), RenderError::DeviceLost);
        assert_eq!(
            RenderError::from(vk::Result::ERROR_INITIALIZATION_FAILED),
            RenderError::Api(vk::Result::ERROR_INITIALIZATION_FAILED)
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(RenderError::AllocationFailed { requested: 64 }.is_recoverable());
        assert!(RenderError::MainCamera { found: 0 }.is_recoverable());
        assert!(!RenderError::DeviceLost.is_recoverable());
        assert!(!RenderError::FenceTimeout { timeout_ns: 1 }.is_recoverable());
    }
}
