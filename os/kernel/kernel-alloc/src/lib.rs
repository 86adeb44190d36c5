//! # Physical Page Allocation
//!
//! This crate owns physical RAM at page granularity. It hands out 4 KiB pages,
//! lets several holders share one page, and gives holders a private copy when
//! they are about to write to a shared one.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  PageAllocator                      │
//! │    • allocate / free / reference                    │
//! │    • duplicate_on_write (copy-on-write)             │
//! └───────┬──────────────────────┬──────────────────────┘
//!         │                      │
//! ┌───────▼──────────────┐ ┌─────▼───────────────────────┐
//! │  Shards (per core)   │ │   Reference accounting      │
//! │  • LIFO free pools   │ │   • Free | Owned(n) per page│
//! │  • work stealing     │ │   • one atomic word, no lock│
//! └──────────────────────┘ └─────────────────────────────┘
//!         │
//! ┌───────▼─────────────────────────────────────────────┐
//! │                 Physical Mapper                     │
//! │    • junk fills, page copies through the HHDM       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Collaborators
//!
//! * [`PhysMapper`]: makes page contents reachable ([`HhdmPhysMapper`]).
//! * [`CurrentCpu`]: picks the shard to work on ([`SingleCpu`] for one core).
//! * [`MemoryBounds`](kernel_info::memory::MemoryBounds): the RAM to manage.
//!
//! ## Failure Model
//!
//! Running out of pages is an ordinary [`AllocError`]. Misuse by a kernel caller
//! (double free, referencing a free page, foreign or unaligned addresses) is a
//! bug and panics.
//!
//! ## Usage
//! ```rust,no_run
//! use kernel_alloc::{HhdmPhysMapper, PageAllocator, SingleCpu};
//! use kernel_info::memory::MemoryBounds;
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! // RAM above the kernel image, as reported by the boot loader
//! let ram = MemoryBounds::new(PhysicalAddress::new(0x0020_0000), PhysicalAddress::new(0x0820_0000));
//! let pages: PageAllocator<_, _, 1> =
//!     unsafe { PageAllocator::init(ram, HhdmPhysMapper::default(), SingleCpu) }.unwrap();
//!
//! let page = pages.allocate().unwrap();
//! pages.reference(page);                       // a second holder
//! let private = pages.duplicate_on_write(page).unwrap();
//! assert_ne!(private, page);
//! pages.free(page);
//! pages.free(private);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod cpu;
mod error;
mod page_alloc;
mod page_state;
pub mod phys_mapper;
mod shard;

pub use cpu::{CurrentCpu, SingleCpu};
pub use error::{AllocError, InitError};
pub use page_alloc::PageAllocator;
pub use page_state::PageState;
pub use phys_mapper::{HhdmPhysMapper, PhysMapper};
