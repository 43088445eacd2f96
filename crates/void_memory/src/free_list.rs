//! Freelist decorator - recycles fixed-size blocks without touching the child
//!
//! Freed blocks of exactly `BLOCK` bytes are threaded into an intrusive
//! singly-linked list whose links live in the first bytes of the blocks
//! themselves. Anything else passes straight through to the wrapped
//! allocator.

use core::ptr::NonNull;

use crate::{Allocator, AllocatorStats, MemoryDescriptor, StatsReport};

/// Freelist over `A` for blocks of `BLOCK` bytes
///
/// Parked blocks are handed back to `A` when the freelist is dropped.
pub struct FreelistAllocator<A: Allocator, const BLOCK: usize> {
    inner: A,
    head: Option<NonNull<u8>>,
    free_len: usize,
    stats: AllocatorStats,
}

impl<A: Allocator, const BLOCK: usize> FreelistAllocator<A, BLOCK> {
    const BLOCK_HOLDS_LINK: () = assert!(
        BLOCK >= core::mem::size_of::<*mut u8>(),
        "freelist block size must fit a list link"
    );

    /// Wrap `inner`
    pub fn new(inner: A) -> Self {
        let () = Self::BLOCK_HOLDS_LINK;
        Self {
            inner,
            head: None,
            free_len: 0,
            stats: AllocatorStats::new("FreelistAllocator"),
        }
    }

    /// Block size intercepted by this freelist
    pub const fn block_size(&self) -> usize {
        BLOCK
    }

    /// Number of blocks currently parked in the list
    pub fn free_len(&self) -> usize {
        self.free_len
    }

    /// Wrapped allocator
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Wrapped allocator, mutably
    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    fn pop(&mut self) -> Option<NonNull<u8>> {
        let node = self.head?;
        // SAFETY: every node is a parked block of BLOCK bytes whose first
        // bytes hold the next link written by `push`
        let next = unsafe { node.as_ptr().cast::<*mut u8>().read_unaligned() };
        self.head = NonNull::new(next);
        self.free_len -= 1;
        Some(node)
    }

    /// # Safety
    /// `node` must point to at least `BLOCK` writable bytes nobody else uses
    unsafe fn push(&mut self, node: NonNull<u8>) {
        let next = self.head.map_or(core::ptr::null_mut(), NonNull::as_ptr);
        node.as_ptr().cast::<*mut u8>().write_unaligned(next);
        self.head = Some(node);
        self.free_len += 1;
    }
}

impl<A: Allocator + Default, const BLOCK: usize> Default for FreelistAllocator<A, BLOCK> {
    fn default() -> Self {
        Self::new(A::default())
    }
}

impl<A: Allocator + core::fmt::Debug, const BLOCK: usize> core::fmt::Debug for FreelistAllocator<A, BLOCK> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FreelistAllocator")
            .field("block_size", &BLOCK)
            .field("free_len", &self.free_len)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<A: Allocator, const BLOCK: usize> Allocator for FreelistAllocator<A, BLOCK> {
    fn allocate(&mut self, size: usize) -> MemoryDescriptor {
        if size == BLOCK {
            if let Some(node) = self.pop() {
                self.stats.record_allocation(size);
                return MemoryDescriptor::new(node, size);
            }
        }
        self.inner.allocate(size)
    }

    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor) {
        match descriptor.non_null() {
            Some(node) if descriptor.size() == BLOCK => {
                self.stats.record_deallocation(BLOCK);
                self.push(node);
            }
            _ => self.inner.deallocate(descriptor),
        }
    }

    fn owns(&self, descriptor: &MemoryDescriptor) -> bool {
        descriptor.size() == BLOCK || self.inner.owns(descriptor)
    }

    fn stats(&self) -> StatsReport {
        StatsReport::decorator(self.stats, self.inner.stats())
    }
}

impl<A: Allocator, const BLOCK: usize> Drop for FreelistAllocator<A, BLOCK> {
    fn drop(&mut self) {
        let (mut returned, mut foreign) = (0usize, 0usize);
        while let Some(node) = self.pop() {
            let block = MemoryDescriptor::new(node, BLOCK);
            // A fallback chain may park blocks that another allocator produced;
            // `inner` cannot take those back
            if self.inner.owns(&block) {
                // SAFETY: `inner` produced this block and nothing else refers to it
                unsafe { self.inner.deallocate(block) };
                returned += 1;
            } else {
                foreign += 1;
            }
        }
        if returned + foreign > 0 {
            log::trace!(
                "Freelist returned {} parked blocks of {} bytes, {} foreign",
                returned,
                BLOCK,
                foreign
            );
        }
    }
}
