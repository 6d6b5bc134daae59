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

//! # st-vec
//!
//! [`StVec`] is a dynamic array over a pluggable [`Storage`] capability.
//!
//! The representation is three cursors over one contiguous allocation:
//! `begin` (null until the first allocation), `end` (one past the last live
//! element), and `storage_end` (one past the last allocated slot). Every slot
//! in `[begin, end)` holds a live value; every slot in `[end, storage_end)`
//! is raw storage. Construction and destruction, routed through the storage
//! capability, are the only transitions between the two states.
//!
//! ```
//! use st_vec::StVec;
//!
//! let mut vec = StVec::from([1, 2, 3, 4]);
//! assert_eq!(vec.len(), 4);
//! assert!(vec.capacity() >= 4);
//!
//! vec.push(5);
//! assert_eq!(vec.as_slice(), &[1, 2, 3, 4, 5]);
//! ```
//!
//! Growth doubles the capacity (or jumps straight to the requested amount if
//! doubling is not enough), which amortizes `push` to O(1). Reallocation
//! relocates elements by bitwise move, which cannot unwind, so a growing
//! operation either completes or leaves the vector exactly as it was.
//! Clone-based operations ([`resize`](StVec::resize),
//! [`extend_from_slice`](StVec::extend_from_slice), [`Clone`]) can unwind in
//! user code; each rolls back to the pre-call state without leaking.
//!
//! Any operation that grows the buffer invalidates every raw pointer
//! previously obtained from [`as_ptr`](StVec::as_ptr) (references are already
//! covered by the borrow checker). An `StVec` is single-owner and not
//! thread-safe: share one across threads only behind external mutual
//! exclusion.
//!
//! Zero-sized element types are not supported; the first allocation-requiring
//! operation on one panics (see [`Global`]).

use core::{
    cmp, fmt,
    iter::FusedIterator,
    marker::PhantomData,
    mem::{self, ManuallyDrop},
    ops,
    ptr::{self, NonNull},
    slice,
};

use storage_types::{AllocError, Global, Storage};

/// A dynamic array over a [`Storage`] capability
///
/// See the [crate docs](crate) for the representation and the growth and
/// panic-safety contracts.
pub struct StVec<T, S: Storage = Global> {
    /// Start of the allocation; null iff the vector has never allocated
    begin: *mut T,
    /// One past the last live element
    end: *mut T,
    /// One past the last allocated slot
    storage_end: *mut T,
    storage: S,
}

// SAFETY: the vector exclusively owns its buffer, so sending it just moves
// the T values (and the storage) to another thread
unsafe impl<T: Send, S: Storage + Send> Send for StVec<T, S> {}
// SAFETY: &StVec only ever hands out &T and &S
unsafe impl<T: Sync, S: Storage + Sync> Sync for StVec<T, S> {}

#[cold]
#[inline(never)]
fn out_of_bounds(index: usize, len: usize) -> ! {
    panic!("index out of bounds (index >= length), index: {index}, length: {len}")
}

#[cold]
#[inline(never)]
fn insert_out_of_bounds(index: usize, len: usize) -> ! {
    panic!("insertion index out of bounds (index > length), index: {index}, length: {len}")
}

#[cold]
#[inline(never)]
fn storage_failed(err: AllocError) -> ! {
    panic!("storage allocation failed: {err}")
}

impl<T> StVec<T> {
    /// Create an empty vector; no allocation until the first element
    #[inline]
    pub const fn new() -> Self {
        Self::new_in(Global)
    }

    /// Create an empty vector with room for at least `capacity` elements
    ///
    /// Panics on allocation failure, see
    /// [`try_with_capacity`](StVec::try_with_capacity).
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(vec) => vec,
            Err(err) => storage_failed(err),
        }
    }

    /// Create an empty vector with room for at least `capacity` elements,
    /// reporting allocation failure
    pub fn try_with_capacity(capacity: usize) -> Result<Self, AllocError> {
        let mut vec = Self::new();
        vec.ensure_capacity(capacity)?;
        Ok(vec)
    }

    /// Create a vector of `count` clones of `value`
    pub fn new_with(count: usize, value: T) -> Self
    where
        T: Clone,
    {
        let mut vec = Self::with_capacity(count);
        vec.resize(count, value);
        vec
    }
}

impl<T, S: Storage> StVec<T, S> {
    /// Create an empty vector drawing storage from `storage`
    #[inline]
    pub const fn new_in(storage: S) -> Self {
        Self {
            begin: ptr::null_mut(),
            end: ptr::null_mut(),
            storage_end: ptr::null_mut(),
            storage,
        }
    }

    /// The number of live elements
    #[inline]
    pub fn len(&self) -> usize {
        if self.begin.is_null() {
            return 0;
        }
        // the buffer exists, so size_of::<T>() is non-zero (Storage rejects
        // zero-sized element types at allocation)
        (self.end as usize - self.begin as usize) / mem::size_of::<T>()
    }

    /// Whether the vector holds no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.begin
    }

    /// The number of slots in the current allocation
    #[inline]
    pub fn capacity(&self) -> usize {
        if self.begin.is_null() {
            return 0;
        }
        (self.storage_end as usize - self.begin as usize) / mem::size_of::<T>()
    }

    /// The live elements as a slice
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        if self.begin.is_null() {
            return &[];
        }
        // SAFETY: [begin, end) holds len() live elements of one allocation
        unsafe { slice::from_raw_parts(self.begin, self.len()) }
    }

    /// The live elements as a mutable slice
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.begin.is_null() {
            return &mut [];
        }
        // SAFETY: [begin, end) holds len() live elements, exclusively ours
        unsafe { slice::from_raw_parts_mut(self.begin, self.len()) }
    }

    /// The start of the buffer; null until the first allocation
    ///
    /// Invalidated by any operation that grows the buffer.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.begin
    }

    /// The element at `index`, or [`None`] out of range
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// The element at `index`, mutably, or [`None`] out of range
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    /// The element at `index` without a bounds check
    ///
    /// # Safety
    ///
    /// `index` must be less than [`len`](StVec::len).
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        // SAFETY: index < len per the caller, so the slot is live
        unsafe { &*self.begin.add(index) }
    }

    /// The element at `index`, mutably, without a bounds check
    ///
    /// # Safety
    ///
    /// `index` must be less than [`len`](StVec::len).
    #[inline]
    pub unsafe fn get_unchecked_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: index < len per the caller, so the slot is live
        unsafe { &mut *self.begin.add(index) }
    }

    /// Make room for at least `additional` more elements
    ///
    /// Panics on allocation failure, see [`try_reserve`](StVec::try_reserve).
    pub fn reserve(&mut self, additional: usize) {
        if let Err(err) = self.try_reserve(additional) {
            storage_failed(err)
        }
    }

    /// Make room for at least `additional` more elements, reporting failure
    ///
    /// On failure the vector is untouched: same buffer, same contents.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let needed = self
            .len()
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        self.ensure_capacity(needed)
    }

    fn ensure_capacity(&mut self, needed: usize) -> Result<(), AllocError> {
        if self.capacity() >= needed {
            return Ok(());
        }
        self.grow_to(cmp::max(self.capacity().saturating_mul(2), needed))
    }

    /// Move to a fresh buffer of exactly `new_capacity` slots.
    ///
    /// Elements are relocated by bitwise move, which cannot unwind, so a
    /// failed allocation is the only exit that leaves the old buffer in
    /// place, and it leaves it untouched.
    #[cold]
    #[inline(never)]
    fn grow_to(&mut self, new_capacity: usize) -> Result<(), AllocError> {
        debug_assert!(new_capacity > self.capacity());

        let len = self.len();
        let old_capacity = self.capacity();
        let new_begin = self.storage.allocate::<T>(new_capacity)?;

        if !self.begin.is_null() {
            // SAFETY: both buffers are live and distinct, the new one has
            // room for len elements; the old slots become raw once their
            // bits are relocated
            unsafe { ptr::copy_nonoverlapping(self.begin, new_begin.as_ptr(), len) };
            // SAFETY: begin came from this storage with old_capacity slots,
            // all of them raw again after the relocation above
            unsafe {
                self.storage
                    .deallocate(NonNull::new_unchecked(self.begin), old_capacity)
            };
        }

        self.begin = new_begin.as_ptr();
        // SAFETY: len <= old capacity < new_capacity, so both cursors stay
        // inside the new allocation
        unsafe {
            self.end = new_begin.as_ptr().add(len);
            self.storage_end = new_begin.as_ptr().add(new_capacity);
        }
        Ok(())
    }

    /// Append `value`, growing if needed; amortized O(1)
    ///
    /// Panics on allocation failure; the vector is untouched in that case.
    pub fn push(&mut self, value: T) {
        self.reserve(1);
        // SAFETY: reserve guaranteed a raw slot at end
        unsafe {
            self.storage.construct(self.end, value);
            self.end = self.end.add(1);
        }
    }

    /// Append the value produced by `make`
    ///
    /// If `make` unwinds nothing is appended: the length only advances once
    /// the value fully exists.
    pub fn push_with(&mut self, make: impl FnOnce() -> T) {
        self.reserve(1);
        let value = make();
        // SAFETY: reserve guaranteed a raw slot at end
        unsafe {
            self.storage.construct(self.end, value);
            self.end = self.end.add(1);
        }
    }

    /// Remove and return the last element, or [`None`] if empty
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: the slot before end is live; retreating end first marks it
        // raw before the value is moved out
        unsafe {
            self.end = self.end.sub(1);
            Some(ptr::read(self.end))
        }
    }

    /// Insert `value` at `index`, shifting the tail up
    ///
    /// Panics if `index > len`. Growth triggered here invalidates all raw
    /// pointers previously derived from the buffer.
    pub fn insert(&mut self, index: usize, value: T) {
        let len = self.len();
        if index > len {
            insert_out_of_bounds(index, len)
        }
        self.reserve(1);
        // SAFETY: index <= len < capacity; the tail moves up one slot, the
        // gap at index is raw, and the new value makes it live
        unsafe {
            let slot = self.begin.add(index);
            ptr::copy(slot, slot.add(1), len - index);
            self.storage.construct(slot, value);
            self.end = self.end.add(1);
        }
    }

    /// Remove and return the element at `index`, shifting the tail down
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        let len = self.len();
        if index >= len {
            out_of_bounds(index, len)
        }
        // SAFETY: index < len; the value moves out, the tail slides down
        // over the raw gap, and end retreats past the now-raw last slot
        unsafe {
            let slot = self.begin.add(index);
            let value = ptr::read(slot);
            ptr::copy(slot.add(1), slot, len - index - 1);
            self.end = self.end.sub(1);
            value
        }
    }

    /// Destroy elements from the back until `len() <= new_len`
    pub fn truncate(&mut self, new_len: usize) {
        while self.len() > new_len {
            // SAFETY: the slot before end is live; end retreats before the
            // drop so a panicking Drop leaves only live slots counted
            unsafe {
                self.end = self.end.sub(1);
                self.storage.destroy(self.end);
            }
        }
    }

    /// Destroy every element; the allocation is kept
    #[inline]
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Grow or shrink to exactly `new_len` elements, filling with clones of
    /// `value`
    ///
    /// If a clone unwinds, the length is rolled back to its pre-call value
    /// and nothing leaks.
    pub fn resize(&mut self, new_len: usize, value: T)
    where
        T: Clone,
    {
        let len = self.len();
        if new_len <= len {
            return self.truncate(new_len);
        }
        self.reserve(new_len - len);

        let mut guard = TailGuard {
            vec: self,
            original_len: len,
        };
        for _ in len..new_len {
            let cloned = value.clone();
            // SAFETY: capacity for new_len was reserved above
            unsafe {
                guard.vec.storage.construct(guard.vec.end, cloned);
                guard.vec.end = guard.vec.end.add(1);
            }
        }
        mem::forget(guard);
    }

    /// Append clones of every element of `other`
    ///
    /// If a clone unwinds, the length is rolled back to its pre-call value
    /// and nothing leaks.
    pub fn extend_from_slice(&mut self, other: &[T])
    where
        T: Clone,
    {
        self.reserve(other.len());
        let len = self.len();

        let mut guard = TailGuard {
            vec: self,
            original_len: len,
        };
        for item in other {
            let cloned = item.clone();
            // SAFETY: capacity for other.len() more slots was reserved above
            unsafe {
                guard.vec.storage.construct(guard.vec.end, cloned);
                guard.vec.end = guard.vec.end.add(1);
            }
        }
        mem::forget(guard);
    }
}

/// Rolls a vector's length back to `original_len` on unwind.
///
/// Clone-based fills construct past `original_len` and defuse the guard on
/// success; an unwinding clone lands here and the constructed tail is
/// destroyed, restoring the exact pre-call state.
struct TailGuard<'a, T, S: Storage> {
    vec: &'a mut StVec<T, S>,
    original_len: usize,
}

impl<T, S: Storage> Drop for TailGuard<'_, T, S> {
    fn drop(&mut self) {
        self.vec.truncate(self.original_len);
    }
}

impl<T, S: Storage> Drop for StVec<T, S> {
    fn drop(&mut self) {
        self.clear();
        if !self.begin.is_null() {
            // SAFETY: every slot is raw after clear, and begin/capacity came
            // from this storage
            unsafe {
                self.storage
                    .deallocate(NonNull::new_unchecked(self.begin), self.capacity())
            }
        }
    }
}

impl<T> Default for StVec<T> {
    /// The empty vector
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: Storage> ops::Deref for StVec<T, S> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, S: Storage> ops::DerefMut for StVec<T, S> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T, S: Storage> ops::Index<usize> for StVec<T, S> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => out_of_bounds(index, self.len()),
        }
    }
}

impl<T, S: Storage> ops::IndexMut<usize> for StVec<T, S> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        let len = self.len();
        match self.get_mut(index) {
            Some(value) => value,
            None => out_of_bounds(index, len),
        }
    }
}

impl<T, S: Storage> ops::Index<ops::RangeFrom<usize>> for StVec<T, S> {
    type Output = [T];

    #[inline]
    fn index(&self, index: ops::RangeFrom<usize>) -> &[T] {
        &self.as_slice()[index]
    }
}

impl<T, S: Storage> ops::IndexMut<ops::RangeFrom<usize>> for StVec<T, S> {
    #[inline]
    fn index_mut(&mut self, index: ops::RangeFrom<usize>) -> &mut [T] {
        &mut self.as_mut_slice()[index]
    }
}

impl<T: Clone, S: Storage + Clone> Clone for StVec<T, S> {
    /// Deep copy: an independent buffer sized to the source's element count
    fn clone(&self) -> Self {
        let mut copy = Self::new_in(self.storage.clone());
        copy.extend_from_slice(self);
        copy
    }

    /// Destroy the target's contents and rebuild them from `source`
    ///
    /// Aliasing of target and source is statically impossible here, so the
    /// rebuild can start by tearing the old contents down.
    fn clone_from(&mut self, source: &Self) {
        self.clear();
        self.extend_from_slice(source);
    }
}

impl<T: fmt::Debug, S: Storage> fmt::Debug for StVec<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<T: PartialEq, S: Storage> PartialEq for StVec<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, S: Storage> Eq for StVec<T, S> {}

impl<T, S: Storage> Extend<T> for StVec<T, S> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (low, _) = iter.size_hint();
        self.reserve(low);
        for value in iter {
            self.push(value);
        }
    }
}

impl<T> FromIterator<T> for StVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut vec = Self::new();
        vec.extend(iter);
        vec
    }
}

impl<T, const N: usize> From<[T; N]> for StVec<T> {
    fn from(values: [T; N]) -> Self {
        let mut vec = Self::with_capacity(N);
        vec.extend(values);
        vec
    }
}

impl<'a, T, S: Storage> IntoIterator for &'a StVec<T, S> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T, S: Storage> IntoIterator for &'a mut StVec<T, S> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T, S: Storage> IntoIterator for StVec<T, S> {
    type Item = T;
    type IntoIter = IntoIter<T, S>;

    /// Consume the vector, yielding its elements in order
    fn into_iter(self) -> IntoIter<T, S> {
        let vec = ManuallyDrop::new(self);
        // SAFETY: vec is never dropped, so the storage has one owner: the
        // iterator
        let storage = unsafe { ptr::read(&vec.storage) };

        IntoIter {
            begin: vec.begin,
            capacity: vec.capacity(),
            front: vec.begin,
            back: vec.end,
            storage,
            marker: PhantomData,
        }
    }
}

/// A consuming iterator over an [`StVec`]
///
/// Remaining elements are destroyed and the buffer is freed when the
/// iterator is dropped.
pub struct IntoIter<T, S: Storage = Global> {
    /// The original allocation, kept for the final deallocate
    begin: *mut T,
    capacity: usize,
    /// Next element to yield from the front; `[front, back)` is live
    front: *mut T,
    /// One past the next element to yield from the back
    back: *mut T,
    storage: S,
    marker: PhantomData<T>,
}

// SAFETY: the iterator exclusively owns the remaining elements and buffer
unsafe impl<T: Send, S: Storage + Send> Send for IntoIter<T, S> {}
// SAFETY: &IntoIter hands out nothing that aliases the elements
unsafe impl<T: Sync, S: Storage + Sync> Sync for IntoIter<T, S> {}

impl<T, S: Storage> IntoIter<T, S> {
    fn remaining(&self) -> usize {
        if self.front == self.back {
            return 0;
        }
        (self.back as usize - self.front as usize) / mem::size_of::<T>()
    }
}

impl<T, S: Storage> Iterator for IntoIter<T, S> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.front == self.back {
            return None;
        }
        // SAFETY: front < back, so front points at a live element; advancing
        // first marks the slot raw
        unsafe {
            let value = ptr::read(self.front);
            self.front = self.front.add(1);
            Some(value)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl<T, S: Storage> DoubleEndedIterator for IntoIter<T, S> {
    fn next_back(&mut self) -> Option<T> {
        if self.front == self.back {
            return None;
        }
        // SAFETY: front < back, so the slot before back is live; retreating
        // first marks it raw
        unsafe {
            self.back = self.back.sub(1);
            Some(ptr::read(self.back))
        }
    }
}

impl<T, S: Storage> ExactSizeIterator for IntoIter<T, S> {}
impl<T, S: Storage> FusedIterator for IntoIter<T, S> {}

impl<T, S: Storage> Drop for IntoIter<T, S> {
    fn drop(&mut self) {
        while self.front != self.back {
            // SAFETY: [front, back) is live; advancing first keeps the range
            // consistent if a Drop panics
            unsafe {
                let slot = self.front;
                self.front = self.front.add(1);
                self.storage.destroy(slot);
            }
        }
        if !self.begin.is_null() {
            // SAFETY: all slots are raw, and begin/capacity came from this
            // storage
            unsafe {
                self.storage
                    .deallocate(NonNull::new_unchecked(self.begin), self.capacity)
            }
        }
    }
}
