//! Composition and property tests for the allocator policies

use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use proptest::prelude::*;
use void_memory::prelude::*;
use void_memory::{GlobalAllocator, MemoryConfig};

/// Counts the calls reaching the wrapped allocator
struct Counting<A> {
    inner: A,
    allocations: Rc<Cell<usize>>,
    deallocations: Rc<Cell<usize>>,
}

impl<A: Allocator> Counting<A> {
    fn new(inner: A) -> Self {
        Self {
            inner,
            allocations: Rc::new(Cell::new(0)),
            deallocations: Rc::new(Cell::new(0)),
        }
    }
}

impl<A: Allocator> Allocator for Counting<A> {
    fn allocate(&mut self, size: usize) -> MemoryDescriptor {
        self.allocations.set(self.allocations.get() + 1);
        self.inner.allocate(size)
    }

    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor) {
        self.deallocations.set(self.deallocations.get() + 1);
        self.inner.deallocate(descriptor)
    }

    fn owns(&self, descriptor: &MemoryDescriptor) -> bool {
        self.inner.owns(descriptor)
    }

    fn stats(&self) -> StatsReport {
        self.inner.stats()
    }
}

#[test]
fn test_freelist_reuse_skips_child() {
    let child = Counting::new(StackAllocator::<1024>::new());
    let calls = child.allocations.clone();
    let mut freelist: FreelistAllocator<_, 32> = FreelistAllocator::new(child);

    let first = freelist.allocate(32);
    assert_eq!(calls.get(), 1);
    unsafe { freelist.deallocate(first) };

    let second = freelist.allocate(32);
    assert_eq!(second.as_ptr(), first.as_ptr());
    assert_eq!(calls.get(), 1);
    assert_eq!(freelist.inner().deallocations.get(), 0);
}

#[test]
fn test_fallback_with_empty_primary() {
    let secondary = Counting::new(SystemAllocator::new());
    let (allocs, deallocs) = (secondary.allocations.clone(), secondary.deallocations.clone());
    let primary = Counting::new(HeapAllocator::new(0));
    let primary_deallocs = primary.deallocations.clone();
    let mut fallback = FallbackAllocator::new(primary, secondary);

    let blocks: Vec<_> = [8, 64, 4096].iter().map(|&size| fallback.allocate(size)).collect();
    assert!(blocks.iter().all(|d| !d.is_null()));
    assert_eq!(allocs.get(), 3);

    for block in blocks {
        assert!(!fallback.primary().owns(&block));
        unsafe { fallback.deallocate(block) };
    }
    assert_eq!(deallocs.get(), 3);
    assert_eq!(primary_deallocs.get(), 0);
}

#[test]
fn test_freelist_returns_parked_blocks_on_drop() {
    let child = Counting::new(SystemAllocator::new());
    let deallocs = child.deallocations.clone();
    let mut freelist: FreelistAllocator<_, 64> = FreelistAllocator::new(child);

    let blocks: Vec<_> = (0..4).map(|_| freelist.allocate(64)).collect();
    for block in blocks {
        unsafe { freelist.deallocate(block) };
    }
    assert_eq!(freelist.free_len(), 4);
    assert_eq!(deallocs.get(), 0);

    drop(freelist);
    assert_eq!(deallocs.get(), 4);
}

#[test]
fn test_freelist_keeps_foreign_blocks_from_child_on_drop() {
    let mut foreign = [0u64; 4];
    let child = Counting::new(StackAllocator::<256>::new());
    let deallocs = child.deallocations.clone();
    let mut freelist: FreelistAllocator<_, 32> = FreelistAllocator::new(child);

    let own = freelist.allocate(32);
    unsafe {
        freelist.deallocate(own);
        freelist.deallocate(MemoryDescriptor::new(NonNull::from(&mut foreign).cast(), 32));
    }
    assert_eq!(freelist.free_len(), 2);

    drop(freelist);
    assert_eq!(deallocs.get(), 1);
}

#[test]
fn test_null_primary_and_secondary_yield_null() {
    let mut fallback = FallbackAllocator::new(NullAllocator, NullAllocator);
    assert!(fallback.allocate(16).is_null());
}

#[test]
fn test_global_composition_report() {
    let mut global = GlobalAllocator::new(&MemoryConfig::default().with_heap_capacity(kib(64)));
    let small = global.allocate(100);
    let large = global.allocate(1000);
    let huge = global.allocate(mib(1));

    let report = global.stats();
    assert!(report.is_proxy);
    assert_eq!(report.stats.name, "FallbackAllocator");
    assert_eq!(report.find("StackAllocator").unwrap().stats.total_allocated, 100);
    assert_eq!(report.find("HeapAllocator").unwrap().stats.total_allocated, 1000);
    assert_eq!(report.find("SystemAllocator").unwrap().stats.total_allocated, mib(1) as u64);

    unsafe {
        global.deallocate(huge);
        global.deallocate(large);
        global.deallocate(small);
    }

    let (allocated, deallocated) = global.stats().totals();
    assert_eq!(allocated, deallocated);

    let json: serde_json::Value = serde_json::from_str(&global.stats().to_json()).unwrap();
    assert_eq!(json["nested"][0]["stats"]["name"], "SegregatorAllocator");
    assert_eq!(json["nested"][1]["stats"]["count_deallocated"], 1);
}

#[test]
fn test_report_display_has_totals() {
    let mut global = GlobalAllocator::default();
    let block = global.allocate(64);
    let text = global.stats().to_string();
    assert!(text.contains("FallbackAllocator"));
    assert!(text.contains("Difference: 64 bytes"));
    unsafe { global.deallocate(block) };
}

proptest! {
    #[test]
    fn prop_reverse_free_restores_cursor(sizes in prop::collection::vec(1usize..64, 1..32)) {
        let mut stack = StackAllocator::<4096>::new();
        let blocks: Vec<_> = sizes.iter().map(|&size| stack.allocate(size)).collect();
        prop_assert_eq!(stack.used(), sizes.iter().sum::<usize>());

        for block in blocks.into_iter().rev() {
            unsafe { stack.deallocate(block) };
        }
        prop_assert_eq!(stack.used(), 0);
    }

    #[test]
    fn prop_out_of_order_free_keeps_capacity_reduced(sizes in prop::collection::vec(1usize..64, 2..32)) {
        let mut heap = HeapAllocator::new(4096);
        let blocks: Vec<_> = sizes.iter().map(|&size| heap.allocate(size)).collect();
        let used = heap.used();

        unsafe { heap.deallocate(blocks[0]) };
        prop_assert_eq!(heap.used(), used);

        heap.reset();
        prop_assert_eq!(heap.used(), 0);
    }

    #[test]
    fn prop_segregator_routes_by_size(sizes in prop::collection::vec(1usize..512, 1..64)) {
        let small = Counting::new(SystemAllocator::new());
        let large = Counting::new(SystemAllocator::new());
        let (small_calls, large_calls) = (small.allocations.clone(), large.allocations.clone());
        let mut segregator: SegregatorAllocator<_, _, 128> = SegregatorAllocator::new(small, large);

        let blocks: Vec<_> = sizes.iter().map(|&size| segregator.allocate(size)).collect();
        let expected_small = sizes.iter().filter(|&&size| size <= 128).count();
        prop_assert_eq!(small_calls.get(), expected_small);
        prop_assert_eq!(large_calls.get(), sizes.len() - expected_small);

        for block in blocks {
            unsafe { segregator.deallocate(block) };
        }
        prop_assert_eq!(segregator.small().deallocations.get(), expected_small);
        prop_assert_eq!(segregator.large().deallocations.get(), sizes.len() - expected_small);
    }

    #[test]
    fn prop_freelist_hands_back_parked_blocks(count in 1usize..16) {
        let mut freelist: FreelistAllocator<StackAllocator<4096>, 48> = FreelistAllocator::default();
        let blocks: Vec<_> = (0..count).map(|_| freelist.allocate(48)).collect();
        for block in &blocks {
            unsafe { freelist.deallocate(*block) };
        }
        prop_assert_eq!(freelist.free_len(), count);

        let used = freelist.inner().used();
        let mut again: Vec<_> = (0..count).map(|_| freelist.allocate(48).addr()).collect();
        let mut original: Vec<_> = blocks.iter().map(|b| b.addr()).collect();
        again.sort_unstable();
        original.sort_unstable();
        prop_assert_eq!(again, original);
        prop_assert_eq!(freelist.inner().used(), used);
    }
}
