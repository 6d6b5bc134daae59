//! Panic-safety around clone-based operations: a clone that unwinds must
//! leave the vector in its exact pre-call state, with constructions and
//! destructions balanced.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use st_vec::StVec;

struct Fuse {
    /// Clones allowed before the next one panics
    remaining_clones: AtomicUsize,
    constructed: AtomicUsize,
    dropped: AtomicUsize,
}

fn fuse(remaining_clones: usize) -> &'static Fuse {
    Box::leak(Box::new(Fuse {
        remaining_clones: AtomicUsize::new(remaining_clones),
        constructed: AtomicUsize::new(0),
        dropped: AtomicUsize::new(0),
    }))
}

impl Fuse {
    fn balanced(&self) -> bool {
        self.constructed.load(Relaxed) == self.dropped.load(Relaxed)
    }

    fn live(&self) -> usize {
        self.constructed.load(Relaxed) - self.dropped.load(Relaxed)
    }
}

struct Exploding {
    value: u32,
    fuse: &'static Fuse,
}

impl Exploding {
    fn new(value: u32, fuse: &'static Fuse) -> Self {
        fuse.constructed.fetch_add(1, Relaxed);
        Exploding { value, fuse }
    }
}

impl Clone for Exploding {
    fn clone(&self) -> Self {
        if self.fuse.remaining_clones.load(Relaxed) == 0 {
            panic!("clone fuse burned out");
        }
        self.fuse.remaining_clones.fetch_sub(1, Relaxed);
        Exploding::new(self.value, self.fuse)
    }
}

impl Drop for Exploding {
    fn drop(&mut self) {
        self.fuse.dropped.fetch_add(1, Relaxed);
    }
}

fn filled(len: usize, fuse: &'static Fuse) -> StVec<Exploding> {
    let mut vec = StVec::with_capacity(len);
    for i in 0..len {
        vec.push(Exploding::new(i as u32, fuse));
    }
    vec
}

fn assert_intact(vec: &StVec<Exploding>, len: usize, capacity: usize) {
    assert_eq!(vec.len(), len);
    assert_eq!(vec.capacity(), capacity);
    for (i, item) in vec.iter().enumerate() {
        assert_eq!(item.value, i as u32);
    }
}

#[test]
fn growth_never_clones() {
    // a zero-clone fuse: any clone would panic, so pushing across many
    // reallocations proves the growth path relocates by move
    let fuse = fuse(0);

    let mut vec = StVec::new();
    for i in 0..100 {
        vec.push(Exploding::new(i, fuse));
    }

    assert_eq!(vec.len(), 100);
    drop(vec);
    assert!(fuse.balanced());
}

#[test]
fn panicking_clone_leaves_source_untouched() {
    let fuse = fuse(usize::MAX);
    let vec = filled(8, fuse);
    let capacity = vec.capacity();

    fuse.remaining_clones.store(4, Relaxed);
    let result = catch_unwind(AssertUnwindSafe(|| vec.clone()));
    assert!(result.is_err());

    // the partial copy was torn down; only the source's 8 remain
    assert_eq!(fuse.live(), 8);
    assert_intact(&vec, 8, capacity);

    drop(vec);
    assert!(fuse.balanced());
}

#[test]
fn panicking_clone_rolls_resize_back() {
    let fuse = fuse(usize::MAX);
    let mut vec = filled(3, fuse);
    vec.reserve(13);
    let capacity = vec.capacity();

    fuse.remaining_clones.store(2, Relaxed);
    let template = Exploding::new(3, fuse);
    let result = catch_unwind(AssertUnwindSafe(|| vec.resize(16, template)));
    assert!(result.is_err());

    // exact pre-call state: same size, same capacity, same values
    assert_intact(&vec, 3, capacity);

    drop(vec);
    assert!(fuse.balanced());
}

#[test]
fn panicking_clone_rolls_extend_back() {
    let fuse = fuse(usize::MAX);
    let mut vec = filled(4, fuse);
    let capacity = vec.capacity();

    let source: Vec<Exploding> = (4..10).map(|i| Exploding::new(i, fuse)).collect();

    fuse.remaining_clones.store(3, Relaxed);
    let result = catch_unwind(AssertUnwindSafe(|| vec.extend_from_slice(&source)));
    assert!(result.is_err());

    assert_eq!(vec.capacity(), capacity.max(10));
    assert_eq!(vec.len(), 4);
    for (i, item) in vec.iter().enumerate() {
        assert_eq!(item.value, i as u32);
    }

    drop(vec);
    drop(source);
    assert!(fuse.balanced());
}

#[test]
fn panicking_value_factory_appends_nothing() {
    let fuse = fuse(0);
    let mut vec = filled(2, fuse);

    let result = catch_unwind(AssertUnwindSafe(|| {
        vec.push_with(|| panic!("factory failed"))
    }));
    assert!(result.is_err());

    // the length never advanced past the live elements
    assert_eq!(vec.len(), 2);
    drop(vec);
    assert!(fuse.balanced());
}
