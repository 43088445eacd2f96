//! Exclusive ownership handle

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use super::{align_within, padded_size, AllocRef};
use crate::{Global, MemoryDescriptor, MemoryError, Result};

/// Sole owner of one value living in allocator-provided memory
///
/// Dropping the handle (or overwriting it) destroys the value and returns the
/// block to the allocator that produced it. A default-constructed handle is
/// empty; dereferencing it panics.
pub struct UniqueHandle<T, R: AllocRef = Global> {
    value: Option<NonNull<T>>,
    descriptor: MemoryDescriptor,
    alloc: R,
    _owns: PhantomData<T>,
}

impl<T, R: AllocRef> UniqueHandle<T, R> {
    /// Whether the handle holds a value
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: the pointer is valid and uniquely owned while stored
        self.value.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: as above, and `&mut self` guarantees exclusivity
        self.value.map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    /// Block backing the value
    pub fn descriptor(&self) -> MemoryDescriptor {
        self.descriptor
    }

    /// Move the value out and release the block
    pub fn into_inner(mut self) -> Option<T> {
        let ptr = self.value.take()?;
        // SAFETY: the value is initialised and the handle no longer owns it
        let value = unsafe { ptr.as_ptr().read() };
        let descriptor = core::mem::take(&mut self.descriptor);
        // SAFETY: the block came from `self.alloc` and is now empty
        unsafe { self.alloc.deallocate(descriptor) };
        Some(value)
    }
}

impl<T, R: AllocRef + Default> Default for UniqueHandle<T, R> {
    fn default() -> Self {
        Self {
            value: None,
            descriptor: MemoryDescriptor::null(),
            alloc: R::default(),
            _owns: PhantomData,
        }
    }
}

impl<T, R: AllocRef> Deref for UniqueHandle<T, R> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("Dereferencing invalid UniqueHandle"),
        }
    }
}

impl<T, R: AllocRef> DerefMut for UniqueHandle<T, R> {
    #[track_caller]
    fn deref_mut(&mut self) -> &mut T {
        match self.get_mut() {
            Some(value) => value,
            None => panic!("Dereferencing invalid UniqueHandle"),
        }
    }
}

impl<T, R: AllocRef> Drop for UniqueHandle<T, R> {
    fn drop(&mut self) {
        if let Some(ptr) = self.value.take() {
            // SAFETY: the value is initialised and owned by this handle; the
            // block came from `self.alloc`
            unsafe {
                core::ptr::drop_in_place(ptr.as_ptr());
                self.alloc.deallocate(self.descriptor);
            }
        }
    }
}

impl<T: fmt::Debug, R: AllocRef> fmt::Debug for UniqueHandle<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("UniqueHandle").field(value).finish(),
            None => write!(f, "UniqueHandle(null)"),
        }
    }
}

/// Move `value` into memory from `alloc`
#[track_caller]
pub fn try_make_unique_in<T, R: AllocRef>(value: T, alloc: R) -> Result<UniqueHandle<T, R>> {
    let layout = Layout::new::<T>();
    let size = padded_size(layout);
    let descriptor = alloc.allocate(size);
    let Some(block) = descriptor.non_null() else {
        return Err(MemoryError::AllocationFailed { size });
    };

    let ptr = align_within(block, layout.align()).cast::<T>();
    // SAFETY: the block holds `size` bytes, enough for an aligned T
    unsafe { ptr.as_ptr().write(value) };

    Ok(UniqueHandle {
        value: Some(ptr),
        descriptor,
        alloc,
        _owns: PhantomData,
    })
}

/// Move `value` into memory from `alloc`, panicking if none is available
#[track_caller]
pub fn make_unique_in<T, R: AllocRef>(value: T, alloc: R) -> UniqueHandle<T, R> {
    match try_make_unique_in(value, alloc) {
        Ok(handle) => handle,
        Err(e) => panic!("{}", e),
    }
}

/// Move `value` into memory from the global allocator
#[track_caller]
pub fn try_make_unique<T>(value: T) -> Result<UniqueHandle<T>> {
    try_make_unique_in(value, Global)
}

/// Move `value` into memory from the global allocator, panicking if none is
/// available
#[track_caller]
pub fn make_unique<T>(value: T) -> UniqueHandle<T> {
    make_unique_in(value, Global)
}
