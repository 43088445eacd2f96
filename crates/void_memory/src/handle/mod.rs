//! Typed ownership handles over allocator descriptors
//!
//! - [`UniqueHandle`]: single owner, move-only
//! - [`SharedHandle`]: reference counted, counter co-allocated with the value
//!
//! Both allocate through an [`AllocRef`], which defaults to the global
//! allocator. Counts are plain integers; handles are neither `Send` nor
//! `Sync`.

mod shared;
mod unique;

pub use shared::{make_shared, make_shared_in, try_make_shared, try_make_shared_in, SharedHandle};
pub use unique::{make_unique, make_unique_in, try_make_unique, try_make_unique_in, UniqueHandle};

use core::alloc::Layout;
use core::cell::RefCell;
use core::ptr::NonNull;
use std::rc::Rc;

use crate::{Allocator, MemoryDescriptor};

/// Allocator access shared by handles
///
/// Handles keep their `AllocRef` so they can return memory on drop without
/// borrowing the allocator for their whole lifetime.
pub trait AllocRef {
    /// Allocate `size` bytes, or return a null descriptor
    fn allocate(&self, size: usize) -> MemoryDescriptor;

    /// Return a block
    ///
    /// # Safety
    /// Same contract as [`Allocator::deallocate`].
    unsafe fn deallocate(&self, descriptor: MemoryDescriptor);
}

impl<A: Allocator> AllocRef for &RefCell<A> {
    fn allocate(&self, size: usize) -> MemoryDescriptor {
        self.borrow_mut().allocate(size)
    }

    unsafe fn deallocate(&self, descriptor: MemoryDescriptor) {
        self.borrow_mut().deallocate(descriptor)
    }
}

impl<A: Allocator> AllocRef for Rc<RefCell<A>> {
    fn allocate(&self, size: usize) -> MemoryDescriptor {
        self.borrow_mut().allocate(size)
    }

    unsafe fn deallocate(&self, descriptor: MemoryDescriptor) {
        self.borrow_mut().deallocate(descriptor)
    }
}

/// Bytes to request so that `layout` fits at an aligned address anywhere
/// inside the block
///
/// Allocators hand out byte-granular blocks, so the slack covers the worst
/// misalignment.
pub(crate) fn padded_size(layout: Layout) -> usize {
    (layout.size() + layout.align() - 1).max(1)
}

/// First address inside `block` aligned for `align`
pub(crate) fn align_within(block: NonNull<u8>, align: usize) -> NonNull<u8> {
    let addr = block.as_ptr() as usize;
    let offset = crate::align_up(addr, align) - addr;
    // SAFETY: offset < align and the block was sized by `padded_size`
    unsafe { NonNull::new_unchecked(block.as_ptr().add(offset)) }
}
