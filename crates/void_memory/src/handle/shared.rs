//! Reference-counted handle

use core::alloc::Layout;
use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

use super::{align_within, padded_size, AllocRef};
use crate::{Global, MemoryDescriptor, MemoryError, Result};

/// Counter and value share one allocation
#[repr(C)]
struct SharedBox<T> {
    refs: Cell<usize>,
    value: T,
}

/// Shared owner of one value living in allocator-provided memory
///
/// Cloning bumps the use count; the value is destroyed and its block returned
/// when the last handle goes away. Moving a handle (including
/// [`core::mem::take`]) transfers ownership without touching the count.
pub struct SharedHandle<T, R: AllocRef + Clone = Global> {
    inner: Option<NonNull<SharedBox<T>>>,
    descriptor: MemoryDescriptor,
    alloc: R,
    _owns: PhantomData<SharedBox<T>>,
}

impl<T, R: AllocRef + Clone> SharedHandle<T, R> {
    fn shared(&self) -> Option<&SharedBox<T>> {
        // SAFETY: the box stays alive while any handle points at it
        self.inner.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    /// Number of handles sharing the value; zero for an empty handle
    pub fn use_count(&self) -> usize {
        self.shared().map_or(0, |shared| shared.refs.get())
    }

    pub fn get(&self) -> Option<&T> {
        self.shared().map(|shared| &shared.value)
    }

    /// Mutable access, only while this is the sole handle
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.use_count() != 1 {
            return None;
        }
        // SAFETY: a count of one means no other handle can observe the value
        self.inner.map(|ptr| unsafe { &mut (*ptr.as_ptr()).value })
    }

    /// Whether both handles share the same value
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }

    /// Block backing the value and its counter
    pub fn descriptor(&self) -> MemoryDescriptor {
        self.descriptor
    }
}

impl<T, R: AllocRef + Clone> Clone for SharedHandle<T, R> {
    fn clone(&self) -> Self {
        if let Some(shared) = self.shared() {
            shared.refs.set(shared.refs.get() + 1);
        }
        Self {
            inner: self.inner,
            descriptor: self.descriptor,
            alloc: self.alloc.clone(),
            _owns: PhantomData,
        }
    }
}

impl<T, R: AllocRef + Clone + Default> Default for SharedHandle<T, R> {
    fn default() -> Self {
        Self {
            inner: None,
            descriptor: MemoryDescriptor::null(),
            alloc: R::default(),
            _owns: PhantomData,
        }
    }
}

impl<T, R: AllocRef + Clone> Deref for SharedHandle<T, R> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("Dereferencing invalid SharedHandle"),
        }
    }
}

impl<T, R: AllocRef + Clone> Drop for SharedHandle<T, R> {
    fn drop(&mut self) {
        let Some(ptr) = self.inner.take() else {
            return;
        };

        // SAFETY: the box is alive until the count reaches zero below
        let remaining = unsafe {
            let refs = &(*ptr.as_ptr()).refs;
            refs.set(refs.get() - 1);
            refs.get()
        };

        if remaining == 0 {
            // SAFETY: this was the last handle; the block came from `self.alloc`
            unsafe {
                core::ptr::drop_in_place(ptr.as_ptr());
                self.alloc.deallocate(self.descriptor);
            }
        }
    }
}

impl<T: fmt::Debug, R: AllocRef + Clone> fmt::Debug for SharedHandle<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f
                .debug_struct("SharedHandle")
                .field("value", value)
                .field("use_count", &self.use_count())
                .finish(),
            None => write!(f, "SharedHandle(null)"),
        }
    }
}

/// Move `value` into memory from `alloc` with a use count of one
#[track_caller]
pub fn try_make_shared_in<T, R: AllocRef + Clone>(value: T, alloc: R) -> Result<SharedHandle<T, R>> {
    let layout = Layout::new::<SharedBox<T>>();
    let size = padded_size(layout);
    let descriptor = alloc.allocate(size);
    let Some(block) = descriptor.non_null() else {
        return Err(MemoryError::AllocationFailed { size });
    };

    let ptr = align_within(block, layout.align()).cast::<SharedBox<T>>();
    // SAFETY: the block holds `size` bytes, enough for an aligned box
    unsafe {
        ptr.as_ptr().write(SharedBox {
            refs: Cell::new(1),
            value,
        })
    };

    Ok(SharedHandle {
        inner: Some(ptr),
        descriptor,
        alloc,
        _owns: PhantomData,
    })
}

/// Move `value` into memory from `alloc`, panicking if none is available
#[track_caller]
pub fn make_shared_in<T, R: AllocRef + Clone>(value: T, alloc: R) -> SharedHandle<T, R> {
    match try_make_shared_in(value, alloc) {
        Ok(handle) => handle,
        Err(e) => panic!("{}", e),
    }
}

/// Move `value` into memory from the global allocator
#[track_caller]
pub fn try_make_shared<T>(value: T) -> Result<SharedHandle<T>> {
    try_make_shared_in(value, Global)
}

/// Move `value` into memory from the global allocator, panicking if none is
/// available
#[track_caller]
pub fn make_shared<T>(value: T) -> SharedHandle<T> {
    make_shared_in(value, Global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NullAllocator, StackAllocator};
    use core::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_copy_and_move() {
        let first = make_shared(10i32);
        assert_eq!(first.use_count(), 1);

        let second = first.clone();
        assert_eq!(first.use_count(), 2);
        assert!(first.ptr_eq(&second));
        assert_eq!(*second, 10);

        let mut second = second;
        let third = core::mem::take(&mut second);
        assert!(!second.is_valid());
        assert_eq!(second.use_count(), 0);
        assert_eq!(third.use_count(), 2);
        assert_eq!(*third, 10);

        drop(first);
        assert_eq!(third.use_count(), 1);
    }

    #[test]
    fn test_last_handle_releases() {
        let stack = Rc::new(RefCell::new(StackAllocator::<128>::new()));
        let marker = Rc::new(());

        let a = make_shared_in(Rc::clone(&marker), Rc::clone(&stack));
        let b = a.clone();
        assert_eq!(Rc::strong_count(&marker), 2);

        drop(a);
        assert_eq!(Rc::strong_count(&marker), 2);
        assert!(stack.borrow().used() > 0);

        drop(b);
        assert_eq!(Rc::strong_count(&marker), 1);
        assert_eq!(stack.borrow().used(), 0);
    }

    #[test]
    fn test_get_mut_requires_sole_owner() {
        let mut a = make_shared(String::from("x"));
        a.get_mut().unwrap().push('y');

        let b = a.clone();
        assert!(a.get_mut().is_none());
        drop(b);
        assert_eq!(a.get_mut().map(|s| s.as_str()), Some("xy"));
    }

    #[test]
    #[should_panic(expected = "Dereferencing invalid SharedHandle")]
    fn test_deref_invalid_panics() {
        let handle: SharedHandle<u8> = SharedHandle::default();
        let _ = *handle;
    }

    #[test]
    fn test_clone_of_empty_stays_empty() {
        let empty: SharedHandle<u8> = SharedHandle::default();
        let copy = empty.clone();
        assert!(!copy.is_valid());
        assert!(copy.ptr_eq(&empty));
    }

    #[test]
    fn test_allocation_failure() {
        let null = Rc::new(RefCell::new(NullAllocator));
        assert!(matches!(
            try_make_shared_in(1u8, null),
            Err(MemoryError::AllocationFailed { .. })
        ));
    }
}
