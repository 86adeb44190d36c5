use crate::{PageSize, PhysicalPage};
use core::fmt;
use core::ops::Add;

/// An address in physical memory.
///
/// Never dereferenced as is; kernel code reaches the bytes through a mapper
/// that knows where physical memory is visible in the virtual address space.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x2000_0042);
/// assert_eq!(pa.page::<Size4K>().join(pa.offset::<Size4K>()), pa);
/// assert_eq!(pa.align_up::<Size4K>(), PhysicalAddress::new(0x2000_1000));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> PhysicalPage<S> {
        PhysicalPage::containing(self)
    }

    /// Position of this address inside its `S` page.
    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0 & S::OFFSET_MASK
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.offset::<S>() == 0
    }

    #[inline]
    #[must_use]
    pub const fn align_down<S: PageSize>(self) -> Self {
        Self(self.0 & !S::OFFSET_MASK)
    }

    /// Round up to an `S` boundary.
    ///
    /// Addresses in the last partial page of the address space round down to
    /// the last boundary instead of wrapping to zero.
    #[inline]
    #[must_use]
    pub const fn align_up<S: PageSize>(self) -> Self {
        if self.is_aligned::<S>() {
            return self;
        }
        match self.0.checked_add(S::SIZE) {
            Some(next) => Self(next).align_down::<S>(),
            None => self.align_down::<S>(),
        }
    }

    /// The address `bytes` above this one.
    ///
    /// # Panics
    /// On overflow past the end of the 64-bit address space.
    #[inline]
    #[must_use]
    pub const fn offset_by(self, bytes: u64) -> Self {
        match self.0.checked_add(bytes) {
            Some(raw) => Self(raw),
            None => panic!("physical address overflow"),
        }
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalAddress({self})")
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl<S: PageSize> From<PhysicalPage<S>> for PhysicalAddress {
    #[inline]
    fn from(page: PhysicalPage<S>) -> Self {
        page.base()
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;

    #[inline]
    fn add(self, bytes: u64) -> Self {
        self.offset_by(bytes)
    }
}
