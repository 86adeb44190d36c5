//! # Kernel Configuration and Boot Memory Interface
//!
//! This crate is the single source of truth for the fixed sizes that the
//! memory-management core is built around, and for the physical memory bounds
//! handed over at boot.
//!
//! ## Overview
//!
//! The page allocator (`kernel-alloc`) and the block cache (`kernel-bio`) are
//! sized at compile time. Keeping those numbers in one crate avoids drift
//! between the subsystems and the code that embeds them.
//!
//! ### Configuration ([`config`])
//! * **Page size**: 4 KiB physical pages
//! * **Block size**: 1 KiB disk blocks
//! * **Cache geometry**: bucket count and default buffer pool size
//! * **SMP**: the upper bound on cores (and thus allocator shards)
//! * **Junk fills**: byte patterns written into allocated and freed pages
//!
//! ### Memory Layout ([`memory`])
//! * **HHDM**: the fixed offset at which physical memory is visible to the kernel
//! * **Usable RAM**: [`MemoryBounds`](memory::MemoryBounds), the range the page
//!   allocator takes ownership of
//!
//! ```text
//! Physical Memory Layout:
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory / Kernel Image   │
//! start       ├─────────────────────────────────┤
//!             │  Page allocator metadata        │
//!             ├─────────────────────────────────┤ (page aligned)
//!             │    Managed pages                │
//!             │  (handed out by the allocator)  │
//! end         └─────────────────────────────────┘
//! ```
//!
//! All values are `const` and validated by compile-time assertions.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod memory;
