//! Error types for the allocator layer

use thiserror::Error;

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors surfaced by the fallible parts of the allocator layer
///
/// Capacity exhaustion inside an allocator chain is not an error: it is a
/// null descriptor. These variants cover the places where a caller asked for
/// a `Result` instead of a panic.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The allocator chain could not provide a block
    #[error("Failed to allocate {size} bytes")]
    AllocationFailed {
        size: usize,
    },

    /// The global allocator was already built when configuration arrived
    #[error("Global allocator is already initialized")]
    AlreadyInitialized,

    /// A configuration value is out of range
    #[error("Invalid memory configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be parsed
    #[error("Failed to parse memory configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error while reading configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        MemoryError::InvalidConfig(message.into())
    }
}
