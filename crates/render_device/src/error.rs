//! Device error types
//!
//! Every failure path logs before it returns one of these; no native error is
//! swallowed silently.

use ash::vk;
use thiserror::Error;

/// Errors surfaced by the device layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Device bring-up failed (no compatible GPU, missing capability)
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A handle was destroyed or never belonged to this device
    #[error("Invalid {kind} handle")]
    InvalidHandle {
        /// Resource kind the handle refers to
        kind: &'static str,
    },

    /// An operation was issued in the wrong lifecycle state
    #[error("Invalid state: {reason}")]
    InvalidState {
        /// What was expected versus what was found
        reason: String,
    },

    /// The request itself is malformed
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// No memory type satisfies the requested properties
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// A write or slot index fell outside the resource
    #[error("Out of bounds: {reason}")]
    OutOfBounds {
        /// Offending range or index
        reason: String,
    },

    /// Configuration rejected during validation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeviceError {
    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState { reason: reason.into() }
    }

    pub(crate) fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }
}

impl From<vk::Result> for DeviceError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
