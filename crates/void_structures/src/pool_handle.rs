//! Counted handle to a value in a [`MemPool`]

use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;

use crate::{FrameId, MemPool};

/// Shared reference to a value living in a [`MemPool`]
///
/// Cloning increments the frame's count and dropping decrements it; the
/// value is destroyed with the last handle. A default handle is empty and
/// panics on dereference.
pub struct PoolHandle<'p, T> {
    pool: Option<&'p MemPool>,
    frame: FrameId,
    _owns: PhantomData<T>,
}

impl<'p, T> PoolHandle<'p, T> {
    pub(crate) fn new(pool: &'p MemPool, frame: FrameId) -> Self {
        Self {
            pool: Some(pool),
            frame,
            _owns: PhantomData,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.pool.is_some()
    }

    /// Handles sharing the value; zero for an empty handle
    pub fn use_count(&self) -> u32 {
        self.pool.map_or(0, |pool| pool.live_ref_count(self.frame))
    }

    /// Frame holding the value
    pub fn frame(&self) -> Option<FrameId> {
        self.pool.map(|_| self.frame)
    }

    pub fn get(&self) -> Option<&T> {
        let pool = self.pool?;
        // SAFETY: the frame stays live while this handle holds a count
        Some(unsafe { &*pool.payload_ptr(self.frame).cast::<T>() })
    }

    /// Mutable access, only while this is the sole handle
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.use_count() != 1 {
            return None;
        }
        let pool = self.pool?;
        // SAFETY: no other handle can reach the value
        Some(unsafe { &mut *pool.payload_ptr(self.frame).cast::<T>() })
    }

    /// Whether both handles refer to the same frame of the same pool
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.pool, other.pool) {
            (Some(a), Some(b)) => core::ptr::eq(a, b) && self.frame == other.frame,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Clone for PoolHandle<'_, T> {
    fn clone(&self) -> Self {
        if let Some(pool) = self.pool {
            // SAFETY: the frame belongs to `pool` and is live
            unsafe { pool.increment(self.frame) };
        }
        Self {
            pool: self.pool,
            frame: self.frame,
            _owns: PhantomData,
        }
    }
}

impl<T> Drop for PoolHandle<'_, T> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            // SAFETY: the frame belongs to `pool` and this handle held a count
            unsafe { pool.decrement(self.frame) };
        }
    }
}

impl<T> Default for PoolHandle<'_, T> {
    fn default() -> Self {
        Self {
            pool: None,
            frame: FrameId::default(),
            _owns: PhantomData,
        }
    }
}

impl<T> Deref for PoolHandle<'_, T> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("Dereferencing invalid PoolHandle"),
        }
    }
}

impl<T> fmt::Debug for PoolHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pool {
            Some(_) => write!(f, "PoolHandle(frame {}, refs {})", self.frame.offset(), self.use_count()),
            None => write!(f, "PoolHandle(null)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_and_drop_track_count() {
        let pool = MemPool::new(256);
        let a = pool.allocate(String::from("pooled"));
        assert_eq!(a.use_count(), 1);

        let b = a.clone();
        assert_eq!(a.use_count(), 2);
        assert!(a.ptr_eq(&b));
        assert_eq!(b.as_str(), "pooled");

        drop(a);
        assert_eq!(b.use_count(), 1);
        assert_eq!(pool.stats().live_frames, 1);

        drop(b);
        assert_eq!(pool.stats().live_frames, 0);
    }

    #[test]
    fn test_take_moves_without_counting() {
        let pool = MemPool::new(256);
        let mut a = pool.allocate(10i32);
        let b = core::mem::take(&mut a);

        assert!(!a.is_valid());
        assert_eq!(a.use_count(), 0);
        assert_eq!(b.use_count(), 1);
        assert_eq!(*b, 10);
    }

    #[test]
    fn test_get_mut_requires_sole_owner() {
        let pool = MemPool::new(256);
        let mut a = pool.allocate(vec![1, 2]);
        a.get_mut().unwrap().push(3);

        let b = a.clone();
        assert!(a.get_mut().is_none());
        drop(b);
        assert_eq!(a.get_mut().map(|v| v.len()), Some(3));
    }

    #[test]
    fn test_default_is_invalid() {
        let handle: PoolHandle<'_, u32> = PoolHandle::default();
        assert!(!handle.is_valid());
        assert!(handle.get().is_none());
        assert!(handle.frame().is_none());
        assert!(handle.clone().ptr_eq(&handle));
    }

    #[test]
    #[should_panic(expected = "Dereferencing invalid PoolHandle")]
    fn test_deref_invalid_panics() {
        let handle: PoolHandle<'_, u32> = PoolHandle::default();
        let _ = *handle;
    }

    #[test]
    fn test_handles_from_different_pools_differ() {
        let first = MemPool::new(128);
        let second = MemPool::new(128);
        let a = first.allocate(1u8);
        let b = second.allocate(1u8);
        assert_eq!(a.frame(), b.frame());
        assert!(!a.ptr_eq(&b));
    }
}
