//! Device error types

use thiserror::Error;

/// Errors reported by a [`GpuDevice`](crate::device::GpuDevice)
///
/// The renderer never surfaces these from draw calls. Allocation failures
/// turn into skipped draws, and polled errors are only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// The device ran out of memory
    #[error("GPU out of memory: {0}")]
    OutOfMemory(String),

    /// An enum argument was rejected
    #[error("Invalid enum: {0}")]
    InvalidEnum(String),

    /// A numeric argument was out of range
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The call is not allowed in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The bound framebuffer is missing attachments
    #[error("Framebuffer incomplete: {0}")]
    IncompleteFramebuffer(String),

    /// Requested texture exceeds the device maximum
    #[error("Texture too large: {width}x{height} (max {max})")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    /// A handle that the device does not know about
    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, GpuError>;
