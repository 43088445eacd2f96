//! Segregator - routes requests to one of two allocators by size

use crate::{Allocator, MemoryDescriptor, StatsReport};

/// Sends requests of at most `THRESHOLD` bytes to `Small`, the rest to `Large`
///
/// Deallocation is routed by `descriptor.size()` with the same rule, not by
/// which child produced the block. The two children therefore have to serve
/// disjoint size ranges; nothing checks this at run time.
#[derive(Debug, Default)]
pub struct SegregatorAllocator<Small, Large, const THRESHOLD: usize> {
    small: Small,
    large: Large,
}

impl<Small, Large, const THRESHOLD: usize> SegregatorAllocator<Small, Large, THRESHOLD>
where
    Small: Allocator,
    Large: Allocator,
{
    pub fn new(small: Small, large: Large) -> Self {
        Self { small, large }
    }

    /// Size at or below which requests go to the small allocator
    pub const fn threshold(&self) -> usize {
        THRESHOLD
    }

    #[inline]
    const fn is_small(size: usize) -> bool {
        size <= THRESHOLD
    }

    pub fn small(&self) -> &Small {
        &self.small
    }

    pub fn large(&self) -> &Large {
        &self.large
    }
}

impl<Small, Large, const THRESHOLD: usize> Allocator for SegregatorAllocator<Small, Large, THRESHOLD>
where
    Small: Allocator,
    Large: Allocator,
{
    fn allocate(&mut self, size: usize) -> MemoryDescriptor {
        if Self::is_small(size) {
            self.small.allocate(size)
        } else {
            self.large.allocate(size)
        }
    }

    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor) {
        if Self::is_small(descriptor.size()) {
            self.small.deallocate(descriptor)
        } else {
            self.large.deallocate(descriptor)
        }
    }

    fn owns(&self, descriptor: &MemoryDescriptor) -> bool {
        if Self::is_small(descriptor.size()) {
            self.small.owns(descriptor)
        } else {
            self.large.owns(descriptor)
        }
    }

    fn stats(&self) -> StatsReport {
        StatsReport::proxy("SegregatorAllocator", vec![self.small.stats(), self.large.stats()])
    }
}
