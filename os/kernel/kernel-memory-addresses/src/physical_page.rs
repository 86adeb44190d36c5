use crate::{PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Physical memory page base for size `S`.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero (page aligned).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let first = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x8123));
/// let third = first.add(2);
/// assert_eq!(third.base().as_u64(), 0xA000);
/// assert_eq!(third.index_from(first), 2);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _phantom: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// Page that contains `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.align_down::<S>().as_u64(),
            _phantom: PhantomData,
        }
    }

    /// The page starting exactly at `pa`, or `None` if `pa` is not aligned.
    #[inline]
    #[must_use]
    pub const fn from_aligned(pa: PhysicalAddress) -> Option<Self> {
        if pa.is_aligned::<S>() {
            Some(Self::containing(pa))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// Combine with an in-page byte offset.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> PhysicalAddress {
        debug_assert!(offset < S::SIZE, "offset must be < page size");
        PhysicalAddress::new(self.base + offset)
    }

    /// The page `n` pages above this one.
    #[inline]
    #[must_use]
    pub const fn add(self, n: u64) -> Self {
        Self {
            base: self.base + (n << S::SHIFT),
            _phantom: PhantomData,
        }
    }

    /// Number of pages between `first` and `self`.
    ///
    /// `self` must not lie below `first`.
    #[inline]
    #[must_use]
    pub const fn index_from(self, first: Self) -> u64 {
        debug_assert!(self.base >= first.base);
        (self.base - first.base) >> S::SHIFT
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base(), S::LABEL)
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({})", S::LABEL, self.base())
    }
}
