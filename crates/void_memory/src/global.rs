//! The composed global allocator
//!
//! ```text
//! Fallback
//! ├── Segregator (<= 128 bytes | > 128 bytes)
//! │   ├── Freelist(112) over Stack(64 KiB)
//! │   └── Freelist(112) over Heap(configured capacity)
//! └── System
//! ```
//!
//! [`GlobalAllocator`] is an ordinary value that can be built and exercised
//! in isolation. The free functions [`allocate`] and [`deallocate`] route to
//! one instance per thread, created on first use and torn down when the
//! thread exits. The allocator model is single-threaded, so for a program
//! that only allocates from its main thread this is the process allocator.

use core::cell::{OnceCell, RefCell};
use std::panic::Location;

use crate::handle::AllocRef;
use crate::{
    Allocator, AllocationLedger, FallbackAllocator, FreelistAllocator, HeapAllocator, MemoryConfig, MemoryDescriptor,
    MemoryError, ReportFormat, Result, SegregatorAllocator, StackAllocator, StatsReport, SystemAllocator,
};

/// Capacity of the inline stack-backed leg
pub const GLOBAL_STACK_CAPACITY: usize = crate::kib(64);
/// Block size recycled by both freelists
pub const GLOBAL_BLOCK_SIZE: usize = 112;
/// Requests at or below this size go to the stack-backed leg
pub const GLOBAL_SEGREGATION_THRESHOLD: usize = 128;

type SmallLeg = FreelistAllocator<StackAllocator<GLOBAL_STACK_CAPACITY>, GLOBAL_BLOCK_SIZE>;
type LargeLeg = FreelistAllocator<HeapAllocator, GLOBAL_BLOCK_SIZE>;

/// Full policy chain behind the global allocator
pub type GlobalStrategy =
    FallbackAllocator<SegregatorAllocator<SmallLeg, LargeLeg, GLOBAL_SEGREGATION_THRESHOLD>, SystemAllocator>;

/// The composed allocator behind [`allocate`] and [`deallocate`]
#[derive(Debug)]
pub struct GlobalAllocator {
    strategy: GlobalStrategy,
}

impl GlobalAllocator {
    pub fn new(config: &MemoryConfig) -> Self {
        let strategy = FallbackAllocator::new(
            SegregatorAllocator::new(
                FreelistAllocator::new(StackAllocator::new()),
                FreelistAllocator::new(HeapAllocator::new(config.heap_capacity)),
            ),
            SystemAllocator::new(),
        );
        log::debug!(
            "Global allocator ready: {} byte stack, {} byte heap",
            GLOBAL_STACK_CAPACITY,
            config.heap_capacity
        );
        Self { strategy }
    }

    /// The policy chain, for inspection
    pub fn strategy(&self) -> &GlobalStrategy {
        &self.strategy
    }
}

impl Default for GlobalAllocator {
    fn default() -> Self {
        Self::new(&MemoryConfig::default())
    }
}

impl Allocator for GlobalAllocator {
    fn allocate(&mut self, size: usize) -> MemoryDescriptor {
        self.strategy.allocate(size)
    }

    unsafe fn deallocate(&mut self, descriptor: MemoryDescriptor) {
        self.strategy.deallocate(descriptor)
    }

    fn owns(&self, descriptor: &MemoryDescriptor) -> bool {
        self.strategy.owns(descriptor)
    }

    fn stats(&self) -> StatsReport {
        self.strategy.stats()
    }
}

thread_local! {
    static GLOBAL: OnceCell<RefCell<GlobalAllocator>> = const { OnceCell::new() };
    static LEDGER: RefCell<AllocationLedger> = RefCell::new(AllocationLedger::new());
}

fn with_global<R>(f: impl FnOnce(&mut GlobalAllocator) -> R) -> R {
    GLOBAL.with(|cell| {
        let global = cell.get_or_init(|| RefCell::new(GlobalAllocator::default()));
        f(&mut global.borrow_mut())
    })
}

/// Install `config` for this thread's global allocator
///
/// Fails with [`MemoryError::AlreadyInitialized`] once anything has been
/// allocated, since the composition cannot be rebuilt under live blocks.
pub fn configure(config: &MemoryConfig) -> Result<()> {
    config.validate()?;
    GLOBAL.with(|cell| {
        if cell.get().is_some() {
            return Err(MemoryError::AlreadyInitialized);
        }
        cell.set(RefCell::new(GlobalAllocator::new(config)))
            .map_err(|_| MemoryError::AlreadyInitialized)
    })
}

/// Whether the global allocator has been built on this thread
pub fn is_initialized() -> bool {
    GLOBAL.with(|cell| cell.get().is_some())
}

/// Allocate `size` bytes from the global allocator
///
/// Returns a null descriptor only if even the system heap refuses.
#[track_caller]
pub fn allocate(size: usize) -> MemoryDescriptor {
    record_call_site(Location::caller(), size);
    with_global(|global| global.allocate(size))
}

/// Return a block to the global allocator
///
/// # Safety
/// `descriptor` must come from [`allocate`] on this thread and must not be
/// used or deallocated again afterwards.
pub unsafe fn deallocate(descriptor: MemoryDescriptor) {
    with_global(|global| global.deallocate(descriptor))
}

/// Statistics tree of this thread's global allocator
pub fn stats_report() -> StatsReport {
    with_global(|global| global.stats())
}

/// Snapshot of the call-site ledger
///
/// Only populated when the crate is built with the `tracking` feature.
pub fn allocation_ledger() -> AllocationLedger {
    LEDGER.with(|ledger| ledger.borrow().clone())
}

#[cfg(feature = "tracking")]
fn record_call_site(location: &'static Location<'static>, size: usize) {
    LEDGER.with(|ledger| ledger.borrow_mut().record(location, size));
}

#[cfg(not(feature = "tracking"))]
#[inline(always)]
fn record_call_site(_location: &'static Location<'static>, _size: usize) {}

/// Log the global statistics report
pub fn dump_memory_usage(format: ReportFormat) {
    let report = stats_report();
    match format {
        ReportFormat::Table => log::info!("ALLOCATION STATISTICS\n{}", report),
        ReportFormat::Json => log::info!("ALLOCATION STATISTICS\n{}", report.to_json()),
    }
}

/// Log the call-site ledger
pub fn dump_alloc_info() {
    let ledger = allocation_ledger();
    if ledger.is_empty() {
        log::info!("No call-site allocations recorded");
        return;
    }
    log::info!("ALLOCATION CALL SITES\n{}", ledger);
}

/// Handle allocator that routes to the global free functions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

impl AllocRef for Global {
    #[track_caller]
    fn allocate(&self, size: usize) -> MemoryDescriptor {
        allocate(size)
    }

    unsafe fn deallocate(&self, descriptor: MemoryDescriptor) {
        deallocate(descriptor)
    }
}
