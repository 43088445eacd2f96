//! MemPool - reference-counted object arena
//!
//! One buffer is carved into frames, each a header followed by a payload:
//!
//! ```text
//! | hdr | payload | hdr | payload | ... | hdr (end) |
//!   \____ next ____/
//! ```
//!
//! Allocation is first-fit and splits the chosen frame when the remainder can
//! host another frame. When a frame's count drops to zero its value is
//! destroyed and the frame is coalesced with its free neighbours, so no two
//! free frames are ever adjacent.

use core::fmt;
use core::mem;
use core::ptr::NonNull;

use void_memory::{Allocator, MemoryConfig, MemoryDescriptor, SystemAllocator};

use crate::{PoolError, PoolHandle, Result};

/// Payload alignment guaranteed by every frame
pub const FRAME_ALIGN: usize = 8;

#[repr(C, align(8))]
struct FrameHeader {
    drop_fn: Option<unsafe fn(*mut u8)>,
    /// Offset of the following header; the end marker links to 0
    next: u32,
    refs: u32,
}

/// Bytes taken by each frame header
pub const HEADER_SIZE: usize = mem::size_of::<FrameHeader>();

const _: () = assert!(HEADER_SIZE % FRAME_ALIGN == 0);
const _: () = assert!(2 * HEADER_SIZE <= MemoryConfig::MIN_POOL_SIZE);

unsafe fn drop_value<T>(payload: *mut u8) {
    core::ptr::drop_in_place(payload.cast::<T>())
}

/// Position of a frame inside its pool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameId(u32);

impl FrameId {
    /// Byte offset of the frame header from the start of the buffer
    #[inline]
    pub const fn offset(self) -> usize {
        self.0 as usize
    }
}

/// Snapshot of one frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub id: FrameId,
    /// Bytes between this header and the next
    pub payload_size: usize,
    pub ref_count: u32,
}

impl FrameInfo {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.ref_count == 0
    }
}

/// Occupancy summary of a pool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffer size in bytes
    pub capacity: usize,
    pub frames: usize,
    pub live_frames: usize,
    pub free_frames: usize,
    /// Payload bytes across all free frames
    pub free_bytes: usize,
    pub largest_free_payload: usize,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes, {} frames ({} live, {} free), {} free bytes, largest free payload {}",
            self.capacity, self.frames, self.live_frames, self.free_frames, self.free_bytes, self.largest_free_payload
        )
    }
}

/// Fixed-size arena of reference-counted values
///
/// Values are placed with [`MemPool::allocate`] and live until the last
/// [`PoolHandle`] to them is dropped. Whatever is still alive when the pool
/// itself is dropped is destroyed then.
pub struct MemPool {
    base: NonNull<u8>,
    descriptor: MemoryDescriptor,
    /// Offset of the end marker header
    end: u32,
    backing: SystemAllocator,
}

impl MemPool {
    /// Create a pool of `size` bytes, panicking if it cannot be created
    pub fn new(size: usize) -> Self {
        match Self::try_new(size) {
            Ok(pool) => pool,
            Err(e) => panic!("{}", e),
        }
    }

    /// Create a pool sized by `config.pool_size`
    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        Self::try_new(config.pool_size)
    }

    /// Create a pool of `size` bytes, rounded down to the frame alignment
    pub fn try_new(size: usize) -> Result<Self> {
        let len = size & !(FRAME_ALIGN - 1);
        let min = 2 * HEADER_SIZE;
        if len < min {
            return Err(PoolError::TooSmall { size, min });
        }
        if len > u32::MAX as usize {
            return Err(PoolError::TooLarge { size });
        }

        let mut backing = SystemAllocator::new();
        let descriptor = backing.allocate(len);
        let Some(base) = descriptor.non_null() else {
            return Err(PoolError::OutOfMemory { size: len });
        };

        let end = (len - HEADER_SIZE) as u32;
        let pool = Self {
            base,
            descriptor,
            end,
            backing,
        };

        // SAFETY: both offsets are aligned header slots inside the buffer
        unsafe {
            pool.header(0).write(FrameHeader {
                drop_fn: None,
                next: end,
                refs: 0,
            });
            pool.header(end).write(FrameHeader {
                drop_fn: None,
                next: 0,
                refs: 0,
            });
        }

        log::debug!("MemPool reserved {} bytes ({} byte head frame)", len, len - min);
        Ok(pool)
    }

    /// Buffer size in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.descriptor.size()
    }

    /// Place `value` in the first free frame large enough for it
    ///
    /// # Panics
    /// If no free frame fits, or `T` needs more than [`FRAME_ALIGN`].
    #[track_caller]
    pub fn allocate<T: 'static>(&self, value: T) -> PoolHandle<'_, T> {
        match self.try_allocate(value) {
            Ok(handle) => handle,
            Err(e) => panic!("{}", e),
        }
    }

    /// Place `value` in the first free frame large enough for it
    pub fn try_allocate<T: 'static>(&self, value: T) -> Result<PoolHandle<'_, T>> {
        let align = mem::align_of::<T>();
        if align > FRAME_ALIGN {
            return Err(PoolError::UnsupportedAlignment {
                align,
                max: FRAME_ALIGN,
            });
        }

        let required = void_memory::align_up(HEADER_SIZE + mem::size_of::<T>(), FRAME_ALIGN);
        let Some(offset) = self.find_fit(required) else {
            return Err(PoolError::Exhausted {
                required,
                largest: self.stats().largest_free_payload,
            });
        };

        let next = self.next(offset);
        let span = (next - offset) as usize;
        if span - required > HEADER_SIZE {
            let split = offset + required as u32;
            // SAFETY: the split point is aligned and lies inside the free frame
            unsafe {
                self.header(split).write(FrameHeader {
                    drop_fn: None,
                    next,
                    refs: 0,
                })
            };
            self.set_next(offset, split);
            log::trace!("Split frame {} at {}", offset, split);
        }

        let drop_fn = if mem::needs_drop::<T>() {
            Some(drop_value::<T> as unsafe fn(*mut u8))
        } else {
            None
        };

        // SAFETY: the payload holds at least size_of::<T>() bytes aligned to
        // FRAME_ALIGN, and the frame is free
        unsafe {
            self.payload(offset).cast::<T>().write(value);
            let header = self.header(offset);
            (*header).drop_fn = drop_fn;
            (*header).refs = 1;
        }

        Ok(PoolHandle::new(self, FrameId(offset)))
    }

    /// Add a reference to a live frame
    ///
    /// # Safety
    /// `frame` must come from a handle of this pool.
    ///
    /// # Panics
    /// If the frame is free.
    pub unsafe fn increment(&self, frame: FrameId) {
        self.check_frame(frame);
        let header = self.header(frame.0);
        let refs = (*header).refs;
        assert!(refs > 0, "Incrementing free frame {}", frame.0);
        (*header).refs = match refs.checked_add(1) {
            Some(refs) => refs,
            None => panic!("Reference count overflow on frame {}", frame.0),
        };
    }

    /// Drop a reference; the last one destroys the value and frees the frame
    ///
    /// # Safety
    /// `frame` must come from a handle of this pool, and no reference to the
    /// value may outlive the final release.
    ///
    /// # Panics
    /// If the frame is free, or does not belong to the chain.
    pub unsafe fn decrement(&self, frame: FrameId) {
        self.check_frame(frame);
        let offset = frame.0;
        let header = self.header(offset);
        let refs = (*header).refs;
        assert!(refs > 0, "Decrementing free frame {}", offset);
        if refs > 1 {
            (*header).refs = refs - 1;
            return;
        }

        // Count stays at one while the value is destroyed: frames released by
        // its destructor must not merge into this one
        if let Some(drop_fn) = (*header).drop_fn.take() {
            drop_fn(self.payload(offset));
        }
        (*header).refs = 0;

        self.coalesce(offset);
    }

    /// Current count of a frame
    ///
    /// `None` when `frame` does not start a frame in the current chain, as
    /// happens to an id kept across a merge. Walks the chain.
    pub fn ref_count(&self, frame: FrameId) -> Option<u32> {
        self.frames().find(|info| info.id == frame).map(|info| info.ref_count)
    }

    /// Count of a frame known to be live, without walking the chain
    pub(crate) fn live_ref_count(&self, frame: FrameId) -> u32 {
        self.check_frame(frame);
        self.refs(frame.0)
    }

    /// Every frame in address order, end marker excluded
    pub fn frames(&self) -> Frames<'_> {
        Frames { pool: self, offset: 0 }
    }

    pub fn stats(&self) -> PoolStats {
        self.frames().fold(
            PoolStats {
                capacity: self.capacity(),
                ..PoolStats::default()
            },
            |mut stats, frame| {
                stats.frames += 1;
                if frame.is_free() {
                    stats.free_frames += 1;
                    stats.free_bytes += frame.payload_size;
                    stats.largest_free_payload = stats.largest_free_payload.max(frame.payload_size);
                } else {
                    stats.live_frames += 1;
                }
                stats
            },
        )
    }

    pub(crate) fn payload_ptr(&self, frame: FrameId) -> *mut u8 {
        self.payload(frame.0)
    }

    fn find_fit(&self, required: usize) -> Option<u32> {
        let mut offset = 0;
        while offset != self.end {
            let next = self.next(offset);
            if self.refs(offset) == 0 && (next - offset) as usize >= required {
                return Some(offset);
            }
            offset = next;
        }
        None
    }

    /// Merge a just-freed frame with the free frames around it
    fn coalesce(&self, offset: u32) {
        let next = self.next(offset);
        if next != self.end && self.refs(next) == 0 {
            self.set_next(offset, self.next(next));
            log::trace!("Frame {} absorbed frame {}", offset, next);
        }

        let mut prev = None;
        let mut cursor = 0;
        while cursor != offset {
            assert!(cursor < offset, "Frame {} is not part of this pool", offset);
            prev = Some(cursor);
            cursor = self.next(cursor);
        }

        if let Some(prev) = prev {
            if self.refs(prev) == 0 {
                self.set_next(prev, self.next(offset));
                log::trace!("Frame {} merged into frame {}", offset, prev);
            }
        }
    }

    fn check_frame(&self, frame: FrameId) {
        assert!(
            frame.0 < self.end && frame.offset() % FRAME_ALIGN == 0,
            "Frame {} is outside the pool",
            frame.0
        );
        debug_assert!(
            self.frames().any(|info| info.id == frame),
            "Frame {} is not a frame start",
            frame.0
        );
    }

    /// Header at `offset`
    ///
    /// Offsets come from the frame chain or from a checked [`FrameId`].
    fn header(&self, offset: u32) -> *mut FrameHeader {
        debug_assert!(offset <= self.end && offset as usize % FRAME_ALIGN == 0);
        // SAFETY: offset + HEADER_SIZE lies inside the buffer
        unsafe { self.base.as_ptr().add(offset as usize).cast() }
    }

    fn payload(&self, offset: u32) -> *mut u8 {
        // SAFETY: every frame header is followed by its payload
        unsafe { self.base.as_ptr().add(offset as usize + HEADER_SIZE) }
    }

    fn next(&self, offset: u32) -> u32 {
        // SAFETY: see `header`
        unsafe { (*self.header(offset)).next }
    }

    fn set_next(&self, offset: u32, next: u32) {
        // SAFETY: see `header`
        unsafe { (*self.header(offset)).next = next }
    }

    fn refs(&self, offset: u32) -> u32 {
        // SAFETY: see `header`
        unsafe { (*self.header(offset)).refs }
    }
}

impl Drop for MemPool {
    fn drop(&mut self) {
        let mut live = 0usize;
        let mut offset = 0;
        while offset != self.end {
            let header = self.header(offset);
            // SAFETY: live frames hold an initialised value; the pool is being
            // dropped so no handle can observe it
            unsafe {
                if (*header).refs > 0 {
                    live += 1;
                    if let Some(drop_fn) = (*header).drop_fn.take() {
                        drop_fn(self.payload(offset));
                    }
                    (*header).refs = 0;
                }
                offset = (*header).next;
            }
        }

        if live > 0 {
            log::warn!("MemPool dropped with {} live frame(s)", live);
        }

        let descriptor = mem::take(&mut self.descriptor);
        // SAFETY: the buffer came from `backing` and holds no values anymore
        unsafe { self.backing.deallocate(descriptor) };
        log::debug!("MemPool released {} bytes", descriptor.size());
    }
}

impl fmt::Debug for MemPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemPool")
            .field("capacity", &self.capacity())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Iterator over the frames of a [`MemPool`]
pub struct Frames<'p> {
    pool: &'p MemPool,
    offset: u32,
}

impl Iterator for Frames<'_> {
    type Item = FrameInfo;

    fn next(&mut self) -> Option<FrameInfo> {
        if self.offset == self.pool.end {
            return None;
        }
        let offset = self.offset;
        let next = self.pool.next(offset);
        self.offset = next;

        Some(FrameInfo {
            id: FrameId(offset),
            payload_size: (next - offset) as usize - HEADER_SIZE,
            ref_count: self.pool.refs(offset),
        })
    }
}
