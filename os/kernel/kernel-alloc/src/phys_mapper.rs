//! # Reaching physical pages from kernel code
//!
//! The allocator hands out physical addresses but still has to touch page
//! contents itself: junk-filling on allocate and free, and copying on
//! copy-on-write duplication. A [`PhysMapper`] turns a physical address into a
//! pointer that is valid in the current address space.
//!
//! - With a higher-half direct map (HHDM), every physical address is mapped at
//!   `HHDM_BASE + pa`; [`HhdmPhysMapper`] just adds the base.
//! - Hosted tests back "physical memory" with an ordinary heap arena and use
//!   [`HhdmPhysMapper::identity`].

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;

/// Physical-to-virtual translation for memory the kernel owns.
pub trait PhysMapper {
    /// Pointer to the first byte of `pa` in the current address space.
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;
}

/// [`PhysMapper`] for kernels with a higher-half direct map.
///
/// # Safety
/// - The HHDM mapping must be present and cover the referenced physical range.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HhdmPhysMapper {
    base: u64,
}

impl HhdmPhysMapper {
    #[must_use]
    pub const fn new(base: u64) -> Self {
        Self { base }
    }

    /// Physical addresses are virtual addresses (HHDM offset zero).
    #[must_use]
    pub const fn identity() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }
}

impl Default for HhdmPhysMapper {
    fn default() -> Self {
        Self::new(HHDM_BASE)
    }
}

impl PhysMapper for HhdmPhysMapper {
    #[allow(clippy::cast_possible_truncation)]
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        self.base.wrapping_add(pa.as_u64()) as usize as *mut u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hhdm_adds_base() {
        let m = HhdmPhysMapper::default();
        let p = m.phys_to_ptr(PhysicalAddress::new(0x1000));
        assert_eq!(p as usize as u64, HHDM_BASE + 0x1000);
    }

    #[test]
    fn identity_round_trips_heap_memory() {
        let mut word = 0u64;
        let pa = PhysicalAddress::new(core::ptr::from_mut(&mut word) as usize as u64);
        let m = HhdmPhysMapper::identity();
        unsafe {
            m.phys_to_ptr(pa).cast::<u64>().write(0xDEAD_BEEF);
        }
        assert_eq!(word, 0xDEAD_BEEF);
    }
}
