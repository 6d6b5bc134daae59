#![no_std]
#![forbid(
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks,
    unsafe_op_in_unsafe_fn,
    missing_docs,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::alloc_instead_of_core
)]

//! # st-shared
//!
//! [`SharedBox`] is an atomically reference-counted owning pointer: many
//! boxes may share one heap value, and the value is destroyed exactly once,
//! by whichever owner happens to be the last one standing.
//!
//! A box is either *empty* (no value, no bookkeeping) or *owning* (a value
//! pointer plus a shared control block). The control block lives on the heap
//! next to nothing else, holds the owner count, and knows how to destroy the
//! managed value and itself. Cloning a box bumps the count; dropping one
//! decrements it, and the decrement that observes no remaining owners runs
//! the one release.
//!
//! ```
//! use st_shared::SharedBox;
//!
//! let a = SharedBox::new(vec![1, 2, 3]);
//! let b = a.clone();
//!
//! assert_eq!(a.use_count(), 2);
//! assert!(SharedBox::ptr_eq(&a, &b));
//!
//! drop(a);
//! assert_eq!(b.get().unwrap(), &[1, 2, 3]);
//! assert_eq!(b.use_count(), 1);
//! ```
//!
//! The counter is the *only* synchronization a [`SharedBox`] provides:
//! concurrent clones and drops from any number of threads are race-free, but
//! mutating the pointed-to value still needs whatever locking the value
//! itself requires.
//!
//! There is no weak-reference support and no custom deleter: every box
//! releases its value the way [`Box`](alloc::boxed::Box) would.

extern crate alloc;

use alloc::boxed::Box;
use core::{fmt, marker::PhantomData, ptr::NonNull, sync::atomic::AtomicIsize};

use storage_types::RefCount;

/// The head of every control block, independent of the managed type
///
/// `Block<T>` is `#[repr(C)]` with this header first, so a pointer to the
/// block can be viewed as a pointer to the header and handed back to the
/// per-`T` release function when the last owner lets go.
#[repr(C)]
struct Header {
    /// Owners beyond the first; see [`RefCount`]
    shared: AtomicIsize,
    /// Destroys the managed value and frees the block holding this header
    ///
    /// Runs at most once, on the last owner's thread.
    release: unsafe fn(NonNull<Header>),
}

#[repr(C)]
struct Block<T> {
    header: Header,
    value: NonNull<T>,
}

impl<T> Block<T> {
    /// Allocate a control block claiming `value`, with one owner recorded
    fn alloc(value: NonNull<T>) -> NonNull<Header> {
        let block = Box::new(Block {
            header: Header {
                shared: RefCount::one(),
                release: release::<T>,
            },
            value,
        });
        // SAFETY: Box::into_raw never returns null
        let block = unsafe { NonNull::new_unchecked(Box::into_raw(block)) };
        block.cast::<Header>()
    }
}

/// Destroy the value managed by a `Block<T>`, then the block itself
///
/// # Safety
///
/// `header` must head a live `Block<T>` whose owner count has dropped to
/// zero, with no other reference to the block or the managed value remaining.
unsafe fn release<T>(header: NonNull<Header>) {
    // SAFETY: the header is the first field of a repr(C) Block<T>, and the
    // caller holds the sole remaining claim on it
    let block = unsafe { Box::from_raw(header.as_ptr().cast::<Block<T>>()) };
    // SAFETY: the block holds the sole claim on the managed allocation
    drop(unsafe { Box::from_raw(block.value.as_ptr()) });
}

/// An atomically reference-counted owning pointer
///
/// See the [crate docs](crate) for the ownership model. The empty state is
/// observable through [`get`](SharedBox::get) / [`is_empty`](SharedBox::is_empty);
/// dereferencing without checking is only available through the `unsafe`
/// [`get_unchecked`](SharedBox::get_unchecked), mirroring raw-pointer
/// discipline.
pub struct SharedBox<T> {
    inner: Option<Owned<T>>,
}

/// The owning half of a [`SharedBox`]: both pointers or neither
struct Owned<T> {
    value: NonNull<T>,
    ctrl: NonNull<Header>,
    marker: PhantomData<T>,
}

impl<T> Clone for Owned<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Owned<T> {}

// SAFETY: sending a box may move the last-owner destruction of T to another
// thread (T: Send), and clones on other threads observe &T (T: Sync)
unsafe impl<T: Send + Sync> Send for SharedBox<T> {}
// SAFETY: &SharedBox allows cloning, which shares T across threads exactly
// like sending a box does
unsafe impl<T: Send + Sync> Sync for SharedBox<T> {}

impl<T> SharedBox<T> {
    /// Create an empty box, owning nothing
    #[inline]
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    /// Move `value` to the heap and create its first owner
    pub fn new(value: T) -> Self {
        // SAFETY: a freshly leaked Box is a unique, never-adopted allocation
        unsafe { Self::from_raw(NonNull::from(Box::leak(Box::new(value)))) }
    }

    /// Adopt a caller-allocated heap value
    ///
    /// If allocating the control block unwinds, the adoptee is freed rather
    /// than leaked: it is held with unique ownership until the block exists.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Box::into_raw`] (or equivalent: global
    /// allocator, layout of `T`), must not be accessed or freed by the caller
    /// afterwards, and must be adopted by at most one box lineage, ever.
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        // SAFETY: ptr is a unique Box-compatible allocation, per the caller
        let hold = unsafe { Box::from_raw(ptr.as_ptr()) };
        let ctrl = Block::alloc(ptr);
        // the control block owns the value from here on
        core::mem::forget(hold);

        Self {
            inner: Some(Owned {
                value: ptr,
                ctrl,
                marker: PhantomData,
            }),
        }
    }

    /// Whether this box owns nothing
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// The managed value, or [`None`] for an empty box
    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: an owning box keeps the managed value alive
        self.inner.as_ref().map(|owned| unsafe { owned.value.as_ref() })
    }

    /// The managed value, without checking for emptiness
    ///
    /// # Safety
    ///
    /// The box must be owning, see [`is_empty`](SharedBox::is_empty).
    #[inline]
    pub unsafe fn get_unchecked(&self) -> &T {
        // SAFETY: the box is owning per the caller, so the value is live
        unsafe { self.inner.as_ref().unwrap_unchecked().value.as_ref() }
    }

    /// The managed pointer, or null for an empty box
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        match &self.inner {
            Some(owned) => owned.value.as_ptr(),
            None => core::ptr::null(),
        }
    }

    /// The number of boxes currently sharing this box's value
    ///
    /// Zero for an empty box. Under concurrent clones and drops the value is
    /// advisory: it was true at some instant, not necessarily now.
    pub fn use_count(&self) -> usize {
        match &self.inner {
            None => 0,
            Some(owned) => {
                // SAFETY: the control block outlives every owner, so it is
                // live while self still counts as one
                let header = unsafe { owned.ctrl.as_ref() };
                (header.shared.shared_owners() + 1) as usize
            }
        }
    }

    /// Whether this box is the only owner of its value
    ///
    /// False for an empty box. Advisory under concurrent mutation, like
    /// [`use_count`](SharedBox::use_count).
    pub fn is_unique(&self) -> bool {
        !self.is_empty() && self.use_count() == 1
    }

    /// Move ownership out, leaving this box empty
    ///
    /// The counter is untouched: ownership transfers, it is not shared.
    #[inline]
    pub fn take(&mut self) -> Self {
        Self {
            inner: self.inner.take(),
        }
    }

    /// Release this box's claim and return to the empty state
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    /// Release this box's claim and adopt `ptr` as a fresh lineage
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw`](SharedBox::from_raw).
    pub unsafe fn reset_raw(&mut self, ptr: NonNull<T>) {
        // SAFETY: contract forwarded to the caller
        *self = unsafe { Self::from_raw(ptr) };
    }

    /// Exchange the contents of two boxes without touching either counter
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.inner, &mut other.inner);
    }

    /// Whether two boxes share one control block (and therefore one value)
    ///
    /// Two empty boxes compare equal; an empty and an owning box do not.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        match (&this.inner, &other.inner) {
            (Some(a), Some(b)) => a.ctrl == b.ctrl,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Clone for SharedBox<T> {
    /// Share ownership: the clone points at the same value and block
    ///
    /// Cloning an empty box yields an empty box. Never fails.
    fn clone(&self) -> Self {
        if let Some(owned) = &self.inner {
            // SAFETY: the control block is live while self owns it
            let header = unsafe { owned.ctrl.as_ref() };
            header.shared.add_shared();
        }
        Self { inner: self.inner }
    }
}

impl<T> Drop for SharedBox<T> {
    fn drop(&mut self) {
        let Some(owned) = self.inner.take() else {
            return;
        };
        // SAFETY: the control block is live until the last owner releases it
        let header = unsafe { owned.ctrl.as_ref() };
        if header.shared.release_shared() {
            let release = header.release;
            // SAFETY: release_shared returned true, so this thread is the
            // single last owner and this is the one release point
            unsafe { release(owned.ctrl) }
        }
    }
}

impl<T> Default for SharedBox<T> {
    /// The empty box
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<T> for SharedBox<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("SharedBox").field(value).finish(),
            None => f.write_str("SharedBox(<empty>)"),
        }
    }
}
