//! Linear (bump) allocators - stack-backed and heap-backed
//!
//! Both carve blocks from a fixed buffer by advancing a cursor. Freeing the
//! most recent block rewinds the cursor; freeing anything else leaves the
//! cursor where it is until the matching LIFO deallocation or a [`reset`].
//!
//! [`reset`]: HeapAllocator::reset

use core::cell::UnsafeCell;
use core::ptr::NonNull;
use std::alloc::{self, Layout};

use crate::{Allocator, AllocatorStats, MemoryDescriptor, StatsReport};

/// Cursor over a buffer whose base address is supplied per call
#[derive(Debug)]
struct BumpCursor {
    top: usize,
    capacity: usize,
}

impl BumpCursor {
    const fn new(capacity: usize) -> Self {
        Self { top: 0, capacity }
    }

    fn bump(&mut self, base: *mut u8, size: usize) -> MemoryDescriptor {
        if size == 0 || self.capacity - self.top < size {
            return MemoryDescriptor::null();
        }
        // SAFETY: top + size <= capacity, so the block lies inside the buffer
        let ptr = unsafe { base.add(self.top) };
        self.top += size;
        MemoryDescriptor::from_raw(ptr, size)
    }

    /// Rewind if `descriptor` is the most recent block
    fn rewind(&mut self, base: *mut u8, descriptor: &MemoryDescriptor) -> bool {
        let start = descriptor.addr().wrapping_sub(base as usize);
        if start.checked_add(descriptor.size()) == Some(self.top) {
            self.top = start;
            return true;
        }
        false
    }

    fn contains(&self, base: *mut u8, descriptor: &MemoryDescriptor) -> bool {
        if descriptor.is_null() {
            return false;
        }
        let base = base as usize;
        let addr = descriptor.addr();
        addr >= base && addr < base + self.capacity
    }
}

/// Bump allocator over an inline buffer of `N` bytes
///
/// The buffer lives inside the allocator value. Blocks refer to it by
/// address, so the allocator must stay put while any block is outstanding.
pub struct StackAllocator<const N: usize> {
    buffer: UnsafeCell<[u8; N]>,
    cursor: BumpCursor,
    stats: AllocatorStats,
}

impl<const N: usize> StackAllocator<N> {
    /// Create a new stack allocator with a zeroed buffer
    pub fn new() -> Self {
        Self {
            buffer: UnsafeCell::new([0; N]),
            cursor: BumpCursor::new(N),
            stats: AllocatorStats::new("StackAllocator"),
        }
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.buffer.get().cast()
    }

    /// Forget every outstanding block
    pub fn reset(&mut self) {
        self.cursor.top = 0;
    }

    /// Bytes between the start of the buffer and the cursor
    pub fn used(&self) -> usize {
        self.cursor.top
    }

    /// Get the total capacity
    pub fn capacity(&self) -> usize {
        N
    }

    /// Bytes left above the cursor
    pub fn available(&self) -> usize {
        N - self.cursor.top
    }
}

impl<const N: usize> Default for StackAllocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for StackAllocator<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StackAllocator")
            .field("capacity", &N)
            .field("used", &self.cursor.top)
            .finish()
    }
}

impl<const N: usize> Allocator for StackAllocator<N> {
    fn allocate(&mut self, size: usize) -> MemoryDescriptor {
        let descriptor = self.cursor.bump(self.base(), size);
        if !descriptor.is_null() {
            self.stats.record_allocation(size);
        }
        descriptor
    }

    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor) {
        if descriptor.is_null() {
            return;
        }
        debug_assert!(
            self.owns(&descriptor),
            "Stack allocator should own memory you are trying to free"
        );
        self.stats.record_deallocation(descriptor.size());
        self.cursor.rewind(self.base(), &descriptor);
    }

    fn owns(&self, descriptor: &MemoryDescriptor) -> bool {
        self.cursor.contains(self.base(), descriptor)
    }

    fn stats(&self) -> StatsReport {
        StatsReport::leaf(self.stats)
    }
}

/// Bump allocator over a buffer reserved from the system heap
///
/// If the reservation fails the allocator degrades to zero capacity and every
/// request yields a null descriptor.
pub struct HeapAllocator {
    buffer: Option<NonNull<u8>>,
    cursor: BumpCursor,
    stats: AllocatorStats,
}

impl HeapAllocator {
    /// Alignment of the reserved buffer
    pub const ALIGN: usize = 16;

    /// Reserve `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        let buffer = Self::reserve(capacity);
        let capacity = if buffer.is_some() { capacity } else { 0 };

        Self {
            buffer,
            cursor: BumpCursor::new(capacity),
            stats: AllocatorStats::new("HeapAllocator"),
        }
    }

    /// Create with capacity in KiB
    pub fn with_capacity_kb(kb: usize) -> Self {
        Self::new(crate::kib(kb))
    }

    /// Create with capacity in MiB
    pub fn with_capacity_mb(mb: usize) -> Self {
        Self::new(crate::mib(mb))
    }

    fn reserve(capacity: usize) -> Option<NonNull<u8>> {
        if capacity == 0 {
            return None;
        }
        let layout = Layout::from_size_align(capacity, Self::ALIGN).ok()?;
        // SAFETY: layout has a non-zero size
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) });
        match ptr {
            Some(_) => log::debug!("Heap allocator reserved {} bytes", capacity),
            None => log::warn!("Heap allocator failed to reserve {} bytes, running empty", capacity),
        }
        ptr
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.buffer.map_or(core::ptr::null_mut(), NonNull::as_ptr)
    }

    /// Forget every outstanding block
    pub fn reset(&mut self) {
        self.cursor.top = 0;
    }

    /// Bytes between the start of the buffer and the cursor
    pub fn used(&self) -> usize {
        self.cursor.top
    }

    /// Get the total capacity, zero if the reservation failed
    pub fn capacity(&self) -> usize {
        self.cursor.capacity
    }

    /// Bytes left above the cursor
    pub fn available(&self) -> usize {
        self.cursor.capacity - self.cursor.top
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new(crate::mib(1))
    }
}

impl Drop for HeapAllocator {
    fn drop(&mut self) {
        if let Some(ptr) = self.buffer.take() {
            // SAFETY: the buffer was reserved with exactly this layout
            unsafe {
                let layout = Layout::from_size_align_unchecked(self.cursor.capacity, Self::ALIGN);
                alloc::dealloc(ptr.as_ptr(), layout);
            }
            log::debug!("Heap allocator released {} bytes", self.cursor.capacity);
        }
    }
}

impl core::fmt::Debug for HeapAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeapAllocator")
            .field("capacity", &self.cursor.capacity)
            .field("used", &self.cursor.top)
            .finish()
    }
}

impl Allocator for HeapAllocator {
    fn allocate(&mut self, size: usize) -> MemoryDescriptor {
        if self.buffer.is_none() {
            return MemoryDescriptor::null();
        }
        let descriptor = self.cursor.bump(self.base(), size);
        if !descriptor.is_null() {
            self.stats.record_allocation(size);
        }
        descriptor
    }

    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor) {
        if descriptor.is_null() {
            return;
        }
        debug_assert!(
            self.owns(&descriptor),
            "Heap allocator should own memory you are trying to free"
        );
        self.stats.record_deallocation(descriptor.size());
        self.cursor.rewind(self.base(), &descriptor);
    }

    fn owns(&self, descriptor: &MemoryDescriptor) -> bool {
        self.buffer.is_some() && self.cursor.contains(self.base(), descriptor)
    }

    fn stats(&self) -> StatsReport {
        StatsReport::leaf(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_linear(alloc: &mut impl Allocator) {
        let eight = alloc.allocate(8);
        assert!(!eight.is_null(), "Can allocate 8 of 64 bytes");
        let fifty_six = alloc.allocate(56);
        assert!(!fifty_six.is_null(), "Can allocate 64 of 64 bytes");
        assert!(alloc.allocate(1).is_null(), "Can't allocate more than 64 bytes");

        unsafe { alloc.deallocate(fifty_six) };
        let sixteen = alloc.allocate(16);
        assert!(!sixteen.is_null(), "Can reuse the last block after freeing it");
        assert_eq!(sixteen.as_ptr(), fifty_six.as_ptr());
    }

    #[test]
    fn test_stack_allocator_basic() {
        let mut alloc = StackAllocator::<64>::new();
        exercise_linear(&mut alloc);
    }

    #[test]
    fn test_heap_allocator_basic() {
        let mut alloc = HeapAllocator::new(64);
        exercise_linear(&mut alloc);
    }

    #[test]
    fn test_out_of_order_free_keeps_cursor() {
        let mut alloc = StackAllocator::<64>::new();
        let a = alloc.allocate(16);
        let b = alloc.allocate(16);
        assert_eq!(alloc.used(), 32);

        unsafe { alloc.deallocate(a) };
        assert_eq!(alloc.used(), 32);

        unsafe { alloc.deallocate(b) };
        assert_eq!(alloc.used(), 16);

        alloc.reset();
        assert_eq!(alloc.used(), 0);
        assert_eq!(alloc.available(), 64);
    }

    #[test]
    fn test_owns_is_address_range() {
        let mut stack = StackAllocator::<32>::new();
        let mut heap = HeapAllocator::new(32);

        let s = stack.allocate(8);
        let h = heap.allocate(8);

        assert!(stack.owns(&s));
        assert!(!stack.owns(&h));
        assert!(heap.owns(&h));
        assert!(!heap.owns(&s));
        assert!(!heap.owns(&MemoryDescriptor::null()));
    }

    #[test]
    fn test_zero_size_request_is_null() {
        let mut alloc = StackAllocator::<16>::new();
        assert!(alloc.allocate(0).is_null());
        assert_eq!(alloc.used(), 0);
    }

    #[test]
    fn test_zero_capacity_heap() {
        let mut alloc = HeapAllocator::new(0);
        assert_eq!(alloc.capacity(), 0);
        assert!(alloc.allocate(1).is_null());
    }

    #[test]
    fn test_heap_buffer_alignment() {
        let mut alloc = HeapAllocator::with_capacity_kb(1);
        let d = alloc.allocate(1);
        assert_eq!(d.addr() % HeapAllocator::ALIGN, 0);
    }

    #[test]
    fn test_stats_count_only_successes() {
        let mut alloc = StackAllocator::<16>::new();
        let d = alloc.allocate(16);
        assert!(alloc.allocate(1).is_null());
        unsafe { alloc.deallocate(d) };

        let report = alloc.stats();
        assert_eq!(report.stats.name, "StackAllocator");
        assert_eq!(report.stats.count_allocated, 1);
        assert_eq!(report.stats.count_deallocated, 1);
        assert_eq!(report.stats.total_allocated, 16);
    }
}
