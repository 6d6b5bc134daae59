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

//! # storage-types
//!
//! The capability traits shared by the `st-*` container crates:
//!
//! * [`Storage`] hands out raw, uninitialized slots and takes them back,
//!   with [`Global`] as the default implementation over the global allocator
//! * [`RefCount`] is the shared-ownership counter protocol used by
//!   `st-shared`, implemented for [`AtomicIsize`](core::sync::atomic::AtomicIsize)
//!
//! Both traits are contracts: the containers built on top of them rely on
//! their guarantees for memory safety, so implementing either is `unsafe`.

extern crate alloc;

pub mod count;
pub mod store;

pub use count::RefCount;
pub use store::{AllocError, Global, Storage};
