//! # Kernel synchronization primitives
//!
//! Two lock classes are used by the memory core:
//!
//! - [`SpinLock`]: non-suspending, for short metadata critical sections
//!   (allocator shards, page accounting, cache buckets).
//! - [`SleepLock`]: suspending, for block contents. Waiters park through a
//!   [`WaitQueue`] supplied by the embedder; [`SpinWait`] is the busy-waiting
//!   fallback for contexts without a scheduler.
//!
//! Both carry a static name for diagnostics.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod raw_lock;
mod sleep_lock;
mod spin_lock;
mod wait_queue;

pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use wait_queue::{SpinWait, WaitQueue};
