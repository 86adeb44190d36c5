//! # Physical Memory Address Types
//!
//! Strongly typed wrappers for physical addresses and page bases used by the
//! page allocator and anything that hands pages around.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A raw 64-bit physical address (RAM or MMIO). |
//! | [`PhysicalPage<S>`] | The page-aligned base of a physical page of size `S`. |
//!
//! Page sizes are marker types implementing [`PageSize`]; the memory core only
//! deals in [`Size4K`].
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
//! let page = pa.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x0000_0010_2000_0000);
//! assert_eq!(pa.offset::<Size4K>(), 0x42);
//!
//! // Only aligned addresses convert losslessly.
//! assert!(PhysicalPage::<Size4K>::from_aligned(pa).is_none());
//! assert_eq!(PhysicalPage::<Size4K>::from_aligned(page.base()), Some(page));
//! ```
//!
//! The types are `#[repr(transparent)]`, `Copy`, `Ord` and `Hash`, and all
//! alignment helpers are `const fn`.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;
mod physical_page;

pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
