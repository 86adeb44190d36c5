//! # Memory Layout

use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Usable physical RAM, `[start, end)`, as reported at boot.
///
/// `start` is typically the first byte after the kernel image. Neither bound
/// has to be page aligned; consumers round inwards.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryBounds {
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
}

impl MemoryBounds {
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self { start, end }
    }

    /// Length of the range in bytes; zero if the bounds are inverted.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.as_u64().saturating_sub(self.start.as_u64())
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of whole 4 KiB pages inside the range after rounding
    /// `start` up and `end` down.
    #[must_use]
    pub const fn whole_pages(&self) -> u64 {
        let first = self.start.align_up::<Size4K>().as_u64();
        let last = self.end.align_down::<Size4K>().as_u64();
        if last > first {
            (last - first) / Size4K::SIZE
        } else {
            0
        }
    }
}

const _: () = assert!(HHDM_BASE.is_multiple_of(Size4K::SIZE));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_pages_rounds_inwards() {
        let b = MemoryBounds::new(PhysicalAddress::new(0x1001), PhysicalAddress::new(0x5fff));
        assert_eq!(b.whole_pages(), 3);
        assert_eq!(b.len(), 0x4ffe);
    }

    #[test]
    fn inverted_bounds_are_empty() {
        let b = MemoryBounds::new(PhysicalAddress::new(0x8000), PhysicalAddress::new(0x1000));
        assert!(b.is_empty());
        assert_eq!(b.whole_pages(), 0);
    }
}
