//! Terminal allocators that never delegate

use std::alloc::{self, Layout};

use crate::{Allocator, AllocatorStats, MemoryDescriptor, StatsReport};

/// Allocator that never succeeds
///
/// Useful as the inert end of a composition and as a zero-capacity stand-in
/// when testing fallback paths.
#[derive(Debug, Default)]
pub struct NullAllocator;

impl Allocator for NullAllocator {
    fn allocate(&mut self, _size: usize) -> MemoryDescriptor {
        MemoryDescriptor::null()
    }

    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor) {
        debug_assert!(descriptor.is_null(), "NullAllocator never hands out memory");
    }

    fn owns(&self, descriptor: &MemoryDescriptor) -> bool {
        descriptor.is_null()
    }

    fn stats(&self) -> StatsReport {
        StatsReport::leaf(AllocatorStats::new("NullAllocator"))
    }
}

/// Allocator backed by the system heap
///
/// Blocks are aligned to [`SystemAllocator::ALIGN`]. This is the only policy
/// that keeps succeeding until the operating system runs out of memory, so it
/// conventionally sits as the secondary of the outermost fallback.
#[derive(Debug)]
pub struct SystemAllocator {
    stats: AllocatorStats,
}

impl SystemAllocator {
    /// Alignment of every block returned by the system allocator
    pub const ALIGN: usize = 16;

    /// Create a new system allocator
    pub fn new() -> Self {
        Self {
            stats: AllocatorStats::new("SystemAllocator"),
        }
    }

    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, Self::ALIGN).ok()
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&mut self, size: usize) -> MemoryDescriptor {
        if size == 0 {
            return MemoryDescriptor::null();
        }
        let Some(layout) = Self::layout(size) else {
            return MemoryDescriptor::null();
        };

        // SAFETY: layout has a non-zero size
        let ptr = unsafe { alloc::alloc(layout) };
        let descriptor = MemoryDescriptor::from_raw(ptr, size);
        if !descriptor.is_null() {
            self.stats.record_allocation(size);
        }
        descriptor
    }

    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor) {
        if descriptor.is_null() {
            return;
        }
        let Some(layout) = Self::layout(descriptor.size()) else {
            return;
        };
        self.stats.record_deallocation(descriptor.size());
        alloc::dealloc(descriptor.as_ptr(), layout);
    }

    /// The system heap cannot tell its blocks apart from anyone else's, so
    /// every non-null block is claimed
    fn owns(&self, descriptor: &MemoryDescriptor) -> bool {
        !descriptor.is_null()
    }

    fn stats(&self) -> StatsReport {
        StatsReport::leaf(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_allocator() {
        let mut alloc = NullAllocator;
        assert!(alloc.allocate(8).is_null());
        assert!(alloc.allocate(0).is_null());
    }

    #[test]
    fn test_system_allocator_roundtrip() {
        let mut alloc = SystemAllocator::new();

        let d = alloc.allocate(100);
        assert!(!d.is_null());
        assert_eq!(d.size(), 100);
        assert_eq!(d.addr() % SystemAllocator::ALIGN, 0);
        assert!(alloc.owns(&d));

        unsafe {
            d.as_ptr().write_bytes(0xAB, d.size());
            alloc.deallocate(d);
        }

        let report = alloc.stats();
        assert_eq!(report.stats.count_allocated, 1);
        assert_eq!(report.stats.total_deallocated, 100);
    }

    #[test]
    fn test_system_allocator_zero_size() {
        let mut alloc = SystemAllocator::new();
        assert!(alloc.allocate(0).is_null());
        assert_eq!(alloc.stats().stats.count_allocated, 0);
    }
}
