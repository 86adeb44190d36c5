//! # Block buffer cache
//!
//! Caches disk blocks in a fixed pool of [`BLOCK_SIZE`]-byte buffers so that
//! frequently used blocks are not re-read, and so that every cached block has
//! exactly one in-memory copy which at most one thread modifies at a time.
//!
//! ```text
//!     read(dev, n) ──► get ──► hit? ──yes──► refcnt+1 ──┐
//!                         │                             ├─► lock contents ─► Buf
//!                         └──no──► reuse idle slot ─────┘
//!                                  (local chain, else LRU of any chain)
//!
//!     drop(Buf)   ──► unlock contents ─► refcnt-1 ─► stamp release tick at 0
//! ```
//!
//! The disk driver, the tick source and the way blocked threads sleep are
//! supplied by the embedder through [`BlockDevice`], [`Clock`] and
//! [`WaitQueue`](kernel_sync::WaitQueue).
//!
//! # Example
//! ```
//! use kernel_bio::{BlockCache, BlockDevice, Direction, BLOCK_SIZE};
//! use kernel_sync::SpinWait;
//!
//! struct Zeroes;
//! impl BlockDevice for Zeroes {
//!     fn rw(&self, _dev: u32, _blockno: u32, data: &mut [u8; BLOCK_SIZE], dir: Direction) {
//!         if dir == Direction::Read {
//!             data.fill(0);
//!         }
//!     }
//! }
//!
//! let cache: BlockCache<_, _, SpinWait> = BlockCache::new(Zeroes, || 0_u64);
//! let mut b = cache.read(1, 33);
//! b[0] = 0xAA;
//! cache.write(&mut b);
//! cache.release(b);
//! assert_eq!(cache.refcnt(1, 33), Some(0));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod buf;
mod cache;
mod device;

pub use buf::Buf;
pub use cache::BlockCache;
pub use device::{BlockDevice, Clock, Direction};
pub use kernel_info::config::BLOCK_SIZE;
