//! Fallback - a primary allocator with a secondary safety net

use crate::{Allocator, MemoryDescriptor, StatsReport};

/// Tries `Primary` first and `Secondary` when the primary comes back empty
///
/// Deallocation asks the primary whether it owns the block; whatever it
/// disowns goes to the secondary.
#[derive(Debug, Default)]
pub struct FallbackAllocator<Primary, Secondary> {
    primary: Primary,
    secondary: Secondary,
}

impl<Primary: Allocator, Secondary: Allocator> FallbackAllocator<Primary, Secondary> {
    pub fn new(primary: Primary, secondary: Secondary) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &Primary {
        &self.primary
    }

    pub fn secondary(&self) -> &Secondary {
        &self.secondary
    }
}

impl<Primary: Allocator, Secondary: Allocator> Allocator for FallbackAllocator<Primary, Secondary> {
    fn allocate(&mut self, size: usize) -> MemoryDescriptor {
        let descriptor = self.primary.allocate(size);
        if descriptor.is_null() && size > 0 {
            log::trace!("Primary allocator exhausted for {} bytes, using fallback", size);
            return self.secondary.allocate(size);
        }
        descriptor
    }

    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor) {
        if self.primary.owns(&descriptor) {
            self.primary.deallocate(descriptor);
        } else {
            self.secondary.deallocate(descriptor);
        }
    }

    fn owns(&self, descriptor: &MemoryDescriptor) -> bool {
        self.primary.owns(descriptor) || self.secondary.owns(descriptor)
    }

    fn stats(&self) -> StatsReport {
        StatsReport::proxy("FallbackAllocator", vec![self.primary.stats(), self.secondary.stats()])
    }
}
