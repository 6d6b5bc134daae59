use std::sync::atomic::AtomicIsize;
use std::thread;

use storage_types::{AllocError, Global, RefCount, Storage};

#[test]
fn allocate_construct_roundtrip() {
    let storage = Global;
    let ptr = storage.allocate::<u64>(8).unwrap();

    for i in 0..8 {
        unsafe { storage.construct(ptr.as_ptr().add(i), i as u64 * 3) };
    }
    for i in 0..8 {
        assert_eq!(unsafe { *ptr.as_ptr().add(i) }, i as u64 * 3);
    }
    for i in 0..8 {
        unsafe { storage.destroy(ptr.as_ptr().add(i)) };
    }
    unsafe { storage.deallocate(ptr, 8) };
}

#[test]
fn zero_count_allocation_is_dangling() {
    let storage = Global;
    let ptr = storage.allocate::<u64>(0).unwrap();
    unsafe { storage.deallocate(ptr, 0) };
}

#[test]
fn oversized_request_is_reported() {
    let storage = Global;
    assert_eq!(
        storage.allocate::<u64>(usize::MAX),
        Err(AllocError::CapacityOverflow)
    );
}

#[test]
#[should_panic = "zero-sized element types"]
fn zero_sized_elements_are_rejected() {
    let _ = Global.allocate::<()>(4);
}

#[test]
fn counter_tracks_extra_owners() {
    let count = <AtomicIsize as RefCount>::one();
    assert_eq!(count.shared_owners(), 0);

    count.add_shared();
    count.add_shared();
    assert_eq!(count.shared_owners(), 2);

    assert!(!count.release_shared());
    assert!(!count.release_shared());
    assert!(count.release_shared());
}

#[test]
fn exactly_one_release_wins_across_threads() {
    const OWNERS: usize = 64;

    let count = <AtomicIsize as RefCount>::one();
    for _ in 1..OWNERS {
        count.add_shared();
    }

    let wins: usize = thread::scope(|scope| {
        let handles: Vec<_> = (0..OWNERS)
            .map(|_| scope.spawn(|| count.release_shared()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum()
    });
    assert_eq!(wins, 1);
}
