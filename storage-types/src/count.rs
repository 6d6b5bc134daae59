//! The shared-ownership counter capability consumed by `st-shared`
//!
//! The counter stores the number of owners *beyond the first*, so a freshly
//! adopted value starts at zero. The last owner is the one whose decrement
//! observes that no extra owners remain, and only that owner may tear the
//! shared state down.

use core::sync::atomic::{
    AtomicIsize,
    Ordering::{AcqRel, Relaxed},
};

/// A counter coordinating shared ownership of one value
///
/// # Safety
///
/// For every counter created by [`one`](RefCount::one) and balanced by
/// matching [`add_shared`](RefCount::add_shared) /
/// [`release_shared`](RefCount::release_shared) calls,
/// `release_shared` must return `true` for exactly one caller: the one whose
/// decrement observes that no other owners remain. All other owners'
/// `release_shared` calls must happen-before the `true`-returning one, so
/// that caller observes every owner's final writes and may destroy the
/// shared state.
pub unsafe trait RefCount {
    /// A counter for a freshly adopted value: one owner, zero extra
    fn one() -> Self;

    /// Record one more owner
    ///
    /// The increment itself guards nothing, so relaxed ordering suffices;
    /// only the release path establishes ordering.
    fn add_shared(&self);

    /// Drop one owner, returning `true` iff the caller was the last
    fn release_shared(&self) -> bool;

    /// The current number of owners beyond the first
    ///
    /// Advisory only under concurrent mutation.
    fn shared_owners(&self) -> isize;
}

// SAFETY: the AcqRel decrement totally orders releases on this counter; only
// the decrement that observes zero extra owners returns true, and its acquire
// side synchronizes with every preceding release-side decrement
unsafe impl RefCount for AtomicIsize {
    #[inline]
    fn one() -> Self {
        AtomicIsize::new(0)
    }

    #[inline]
    fn add_shared(&self) {
        let old = self.fetch_add(1, Relaxed);
        if old > isize::MAX / 2 {
            // the count can only get this high through leaked owners; stop
            // before it wraps into a premature release
            owner_overflow();
        }
    }

    #[inline]
    fn release_shared(&self) -> bool {
        self.fetch_sub(1, AcqRel) == 0
    }

    #[inline]
    fn shared_owners(&self) -> isize {
        self.load(Relaxed)
    }
}

#[cold]
#[inline(never)]
fn owner_overflow() -> ! {
    panic!("shared owner count overflow")
}
