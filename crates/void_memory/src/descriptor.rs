//! Memory descriptors - the currency between allocators and their callers

use core::fmt;
use core::ptr::NonNull;

/// A block of memory identified by its start address and length
///
/// A descriptor is either null (no address, size 0) or points at `size`
/// bytes owned by whichever allocator produced it. It is a plain value: the
/// allocator contract, not the type system, makes sure each live block is
/// deallocated exactly once.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryDescriptor {
    ptr: Option<NonNull<u8>>,
    size: usize,
}

impl MemoryDescriptor {
    /// The failed/empty descriptor
    #[inline]
    pub const fn null() -> Self {
        Self { ptr: None, size: 0 }
    }

    /// Describe `size` bytes starting at `ptr`
    ///
    /// A zero size collapses to the null descriptor so that the "null iff
    /// size is 0" invariant holds for every descriptor in circulation.
    #[inline]
    pub fn new(ptr: NonNull<u8>, size: usize) -> Self {
        if size == 0 {
            return Self::null();
        }
        Self { ptr: Some(ptr), size }
    }

    /// Build from a raw pointer, null pointers producing the null descriptor
    #[inline]
    pub fn from_raw(ptr: *mut u8, size: usize) -> Self {
        match NonNull::new(ptr) {
            Some(ptr) => Self::new(ptr, size),
            None => Self::null(),
        }
    }

    /// Whether this describes no memory at all
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Start of the block, or a null pointer
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        match self.ptr {
            Some(ptr) => ptr.as_ptr(),
            None => core::ptr::null_mut(),
        }
    }

    /// Start of the block, if any
    #[inline]
    pub const fn non_null(&self) -> Option<NonNull<u8>> {
        self.ptr
    }

    /// Length of the block in bytes
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Address as an integer, 0 for null
    #[inline]
    pub fn addr(&self) -> usize {
        self.as_ptr() as usize
    }
}

impl Default for MemoryDescriptor {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for MemoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(ptr) => write!(f, "MemoryDescriptor({:p}, {} bytes)", ptr, self.size),
            None => write!(f, "MemoryDescriptor(null)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_null() {
        let d = MemoryDescriptor::default();
        assert!(d.is_null());
        assert!(d.as_ptr().is_null());
        assert_eq!(d.size(), 0);
    }

    #[test]
    fn test_descriptor_is_copyable() {
        let mut value = 10i32;
        let ptr = NonNull::from(&mut value).cast::<u8>();
        let d = MemoryDescriptor::new(ptr, core::mem::size_of::<i32>());

        let other = d;
        assert_eq!(other.as_ptr(), d.as_ptr());
        assert_eq!(other.size(), d.size());
        assert!(!other.is_null());
    }

    #[test]
    fn test_zero_size_collapses_to_null() {
        let mut byte = 0u8;
        let d = MemoryDescriptor::new(NonNull::from(&mut byte), 0);
        assert_eq!(d, MemoryDescriptor::null());
        assert!(MemoryDescriptor::from_raw(core::ptr::null_mut(), 16).is_null());
    }
}
