//! The allocator capability consumed by `st-vec`
//!
//! A [`Storage`] produces and reclaims raw slots, and moves individual slots
//! between their two states: `raw` (allocated, uninitialized) and `live`
//! (holding a value). Construction and destruction are the only legal
//! transitions between those states.

use core::{
    alloc::Layout,
    fmt,
    ptr::{self, NonNull},
};

/// The error type of [`Storage::allocate`]
///
/// Allocation failures are propagated, never retried, and the caller's data
/// structure must remain in its prior valid state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The requested slot count does not fit in a single allocation
    CapacityOverflow,
    /// The underlying allocator could not produce the requested block
    Exhausted {
        /// The size of the failed request in bytes
        bytes: usize,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::CapacityOverflow => f.write_str("requested capacity overflows a single allocation"),
            AllocError::Exhausted { bytes } => {
                write!(f, "allocator could not produce a block of {bytes} bytes")
            }
        }
    }
}

impl core::error::Error for AllocError {}

/// A source of raw storage, counted in slots of some element type
///
/// # Safety
///
/// A successful `allocate::<T>(count)` must return a pointer to a single
/// live allocation with room and alignment for `count` values of `T`, and
/// that allocation must stay valid until it is passed back to
/// `deallocate::<T>` on the same storage with the same `count`.
pub unsafe trait Storage {
    /// Allocate storage for `count` values of `T`
    ///
    /// Every slot starts out raw. Failure is reported to the caller, never
    /// retried internally.
    fn allocate<T>(&self, count: usize) -> Result<NonNull<T>, AllocError>;

    /// Release storage previously produced by [`Storage::allocate`]
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate::<T>(count)` on this storage with the
    /// same `count`, every slot must be raw (destroyed or never constructed),
    /// and the allocation must not be used afterwards.
    unsafe fn deallocate<T>(&self, ptr: NonNull<T>, count: usize);

    /// Construct `value` into `slot`, transitioning it from raw to live
    ///
    /// # Safety
    ///
    /// `slot` must be valid for writes and currently raw.
    #[inline]
    unsafe fn construct<T>(&self, slot: *mut T, value: T) {
        // SAFETY: slot is valid for writes and uninitialized, per the caller
        unsafe { ptr::write(slot, value) }
    }

    /// Destroy the value in `slot`, transitioning it from live to raw
    ///
    /// # Safety
    ///
    /// `slot` must point at a live `T`, and the slot must be treated as raw
    /// afterwards.
    #[inline]
    unsafe fn destroy<T>(&self, slot: *mut T) {
        // SAFETY: slot holds a live T, per the caller
        unsafe { ptr::drop_in_place(slot) }
    }
}

/// The global allocator as a [`Storage`]
///
/// Zero-sized element types are rejected with a panic on the first
/// allocation: a slot of zero bytes has no storage to hand out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

// SAFETY: allocate forwards to the global allocator with the array layout of
// `count` slots, and deallocate releases with that same layout
unsafe impl Storage for Global {
    fn allocate<T>(&self, count: usize) -> Result<NonNull<T>, AllocError> {
        assert!(
            core::mem::size_of::<T>() != 0,
            "zero-sized element types have no storage to allocate"
        );

        let layout = Layout::array::<T>(count).map_err(|_| AllocError::CapacityOverflow)?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }

        // SAFETY: the layout has non-zero size
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(ptr.cast()).ok_or(AllocError::Exhausted {
            bytes: layout.size(),
        })
    }

    unsafe fn deallocate<T>(&self, ptr: NonNull<T>, count: usize) {
        // the layout fit when the block was allocated, so this cannot fail
        let Ok(layout) = Layout::array::<T>(count) else {
            return;
        };
        if layout.size() == 0 {
            return;
        }
        // SAFETY: ptr came from `alloc` with this exact layout
        unsafe { alloc::alloc::dealloc(ptr.as_ptr().cast(), layout) }
    }
}
