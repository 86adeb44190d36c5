use core::fmt::Debug;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// A page granularity known to the memory core.
///
/// Sealed; [`Size4K`] is the only implementor.
pub trait PageSize: sealed::Sealed + Copy + Ord + Hash + Debug {
    /// Bytes per page, a power of two.
    const SIZE: u64;
    /// Number of address bits inside a page.
    const SHIFT: u32 = Self::SIZE.trailing_zeros();
    /// Short label used when formatting pages, e.g. `4K`.
    const LABEL: &'static str;

    /// Mask selecting the in-page offset bits.
    const OFFSET_MASK: u64 = Self::SIZE - 1;
}

/// The 4 KiB base page.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;

impl sealed::Sealed for Size4K {}

impl PageSize for Size4K {
    const SIZE: u64 = 4096;
    const LABEL: &'static str = "4K";
}

const _: () = assert!(Size4K::SIZE.is_power_of_two() && Size4K::SHIFT == 12);
