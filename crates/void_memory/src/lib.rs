//! # void_memory - Composable Memory Allocators
//!
//! Small allocator policies that nest into a process-wide allocation strategy:
//! - Null / System: terminal policies
//! - Stack / Heap: fixed-capacity bump allocation with LIFO rewind
//! - Freelist: fixed-size block recycling on top of any allocator
//! - Segregator: size-based routing between two allocators
//! - Fallback: primary allocator with a secondary safety net
//!
//! The [`global`] module assembles them into one composed allocator reachable
//! through [`allocate`] and [`deallocate`]. Typed ownership on top of raw
//! descriptors is provided by [`UniqueHandle`] and [`SharedHandle`].
//!
//! Everything here is single-threaded. No type in this crate is `Send` or
//! `Sync` once it hands out memory.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod fallback;
pub mod free_list;
pub mod global;
pub mod handle;
pub mod linear;
pub mod primitive;
pub mod segregator;
pub mod stats;
pub mod tracker;

pub use config::{MemoryConfig, ReportFormat};
pub use descriptor::MemoryDescriptor;
pub use error::{MemoryError, Result};
pub use fallback::FallbackAllocator;
pub use free_list::FreelistAllocator;
pub use global::{allocate, deallocate, Global, GlobalAllocator};
pub use handle::{
    make_shared, make_shared_in, make_unique, make_unique_in, try_make_shared, try_make_shared_in,
    try_make_unique, try_make_unique_in, AllocRef, SharedHandle, UniqueHandle,
};
pub use linear::{HeapAllocator, StackAllocator};
pub use primitive::{NullAllocator, SystemAllocator};
pub use segregator::SegregatorAllocator;
pub use stats::{AllocatorStats, StatsReport};
pub use tracker::{AllocationLedger, CallSiteRecord};

/// Common trait for all allocator policies
///
/// Policies are composed by value: a decorator owns its children and forwards
/// to them. A failed allocation is a null descriptor, never a panic.
pub trait Allocator {
    /// Allocate `size` bytes, or return [`MemoryDescriptor::null`] when the
    /// request cannot be satisfied
    fn allocate(&mut self, size: usize) -> MemoryDescriptor;

    /// Return a block to this allocator
    ///
    /// # Safety
    /// The descriptor must have been produced by this allocator (or by the
    /// chain it routes to), must not have been deallocated already, and no
    /// value may still live inside the block.
    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor);

    /// Whether this allocator considers itself responsible for the block
    fn owns(&self, descriptor: &MemoryDescriptor) -> bool;

    /// Snapshot of the allocation counters, nested like the composition tree
    fn stats(&self) -> StatsReport;
}

/// Bytes in `n` kibibytes
#[inline]
pub const fn kib(n: usize) -> usize {
    n << 10
}

/// Bytes in `n` mebibytes
#[inline]
pub const fn mib(n: usize) -> usize {
    n << 20
}

/// Bytes in `n` gibibytes
#[inline]
pub const fn gib(n: usize) -> usize {
    n << 30
}

/// Align a value up to the given alignment
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

pub mod prelude {
    pub use crate::{Allocator, MemoryDescriptor, StatsReport};
    pub use crate::{FallbackAllocator, FreelistAllocator, SegregatorAllocator};
    pub use crate::{HeapAllocator, NullAllocator, StackAllocator, SystemAllocator};
    pub use crate::{make_shared, make_unique, SharedHandle, UniqueHandle};
    pub use crate::{allocate, deallocate};
    pub use crate::{kib, mib, gib};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_helpers() {
        assert_eq!(kib(1), 1024);
        assert_eq!(mib(16), 16 * 1024 * 1024);
        assert_eq!(gib(1), 1 << 30);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(20, 8), 24);
        assert_eq!(align_up(24, 8), 24);
    }
}
