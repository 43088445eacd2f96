//! Error types for pool operations

use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur while creating or filling a [`crate::MemPool`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Requested buffer cannot hold the head frame and the end marker
    #[error("Pool of {size} bytes is too small (minimum {min})")]
    TooSmall { size: usize, min: usize },

    /// Frame offsets are 32-bit
    #[error("Pool of {size} bytes exceeds the 4 GiB frame range")]
    TooLarge { size: usize },

    /// The backing buffer could not be reserved
    #[error("Failed to reserve a {size} byte pool buffer")]
    OutOfMemory { size: usize },

    /// No free frame is large enough
    #[error("Pool exhausted: no free frame spans {required} bytes (largest free payload {largest})")]
    Exhausted { required: usize, largest: usize },

    /// Payloads are only aligned to the frame alignment
    #[error("Alignment {align} exceeds the pool frame alignment {max}")]
    UnsupportedAlignment { align: usize, max: usize },
}
