//! # void_structures - Pooled Object Storage
//!
//! - MemPool: one fixed buffer carved into reference-counted frames
//! - PoolHandle: counted handle to a value living in a MemPool
//!
//! Pools are single-threaded; neither type is `Send` or `Sync`.

pub mod error;
pub mod mem_pool;
pub mod pool_handle;

pub use error::{PoolError, Result};
pub use mem_pool::{FrameId, FrameInfo, Frames, MemPool, PoolStats, FRAME_ALIGN, HEADER_SIZE};
pub use pool_handle::PoolHandle;

pub mod prelude {
    pub use crate::mem_pool::{MemPool, PoolStats};
    pub use crate::pool_handle::PoolHandle;
}
