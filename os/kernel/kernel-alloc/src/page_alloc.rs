//! # Sharded, reference-counted physical page allocator
//!
//! Owns every whole 4 KiB page of the usable RAM range above its own metadata.
//!
//! ```text
//! bounds.start                                                  bounds.end
//! │  ┌──────────────┬──────────────┬───────────────────────────────┐  │
//! └─►│  state[n]    │ next link[n] │ page 0 │ page 1 │ … │ page n-1│◄─┘
//!    └──────────────┴──────────────┴───────────────────────────────┘
//!      accounting     shard chains   managed pages (page aligned)
//! ```
//!
//! ## Locking
//!
//! - One [`SpinLock`] per core guards that core's free pool ([`Shard`]).
//! - There is no global lock on the allocate/free path. Each page's
//!   [`PageState`](crate::PageState) is an atomic word changed only by
//!   compare-and-swap, so cores allocating from their own shards never wait
//!   on each other.
//! - A steal holds at most one shard lock at a time: it detaches from the
//!   victim, drops the victim's lock, and only then takes its own shard again.
//!
//! ## Ownership of free pages
//!
//! A freed page goes to the shard of the core that freed it, not back to the
//! core that allocated it. Pools that run dry are refilled lazily by stealing
//! half of another shard.

use crate::cpu::CurrentCpu;
use crate::error::{AllocError, InitError};
use crate::page_state::{RefTable, Released};
use crate::phys_mapper::PhysMapper;
use crate::shard::{NIL, Shard};
use core::sync::atomic::AtomicU32;
use kernel_info::config::{self, ALLOC_FILL, FREE_FILL, PAGE_SIZE};
use kernel_info::memory::MemoryBounds;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};
use kernel_sync::SpinLock;
use log::{debug, info, trace, warn};

/// Bytes of bookkeeping per managed page: a state word and a link.
const META_PER_PAGE: u64 = 2 * size_of::<AtomicU32>() as u64;

const _: () = assert!(PAGE_SIZE as u64 == Size4K::SIZE);

/// The physical page allocator.
///
/// `NCPU` is the number of shards and must cover every id that `C` can
/// report.
pub struct PageAllocator<M: PhysMapper, C: CurrentCpu, const NCPU: usize = { config::NCPU }> {
    first: PhysicalPage<Size4K>,
    npages: u32,
    metadata: MemoryBounds,
    refs: RefTable,
    links: &'static [AtomicU32],
    shards: [SpinLock<Shard>; NCPU],
    mapper: M,
    cpus: C,
}

impl<M: PhysMapper, C: CurrentCpu, const NCPU: usize> PageAllocator<M, C, NCPU> {
    /// Take ownership of the RAM in `bounds`.
    ///
    /// The metadata is carved from the start of the range; every whole page
    /// after it is put into shard 0.
    ///
    /// # Safety
    /// - `bounds` must describe RAM that is mapped through `mapper` and
    ///   writable.
    /// - Nothing else may use that RAM for the rest of the program.
    ///
    /// # Errors
    /// [`InitError`] if the range is inverted or too small for one page.
    pub unsafe fn init(bounds: MemoryBounds, mapper: M, cpus: C) -> Result<Self, InitError> {
        const { assert!(NCPU > 0) };

        if bounds.end < bounds.start {
            return Err(InitError::Inverted {
                start: bounds.start,
                end: bounds.end,
            });
        }

        let base = bounds.start.align_up::<Size4K>();
        let end = bounds.end.align_down::<Size4K>();
        let avail = bounds.whole_pages() * Size4K::SIZE;

        let mut n = (avail / (Size4K::SIZE + META_PER_PAGE)).min(u64::from(NIL));
        let first = loop {
            let first = (base + n * META_PER_PAGE).align_up::<Size4K>();
            if first.as_u64() + n * Size4K::SIZE <= end.as_u64() || n == 0 {
                break first;
            }
            n -= 1;
        };
        if n == 0 {
            return Err(InitError::TooSmall {
                bytes: bounds.len(),
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let npages = n as u32;
        let count = npages as usize;

        // SAFETY: The caller hands us exclusive, mapped RAM; both tables lie
        // between `base` and `first`, and 4 KiB alignment satisfies `AtomicU32`.
        let (states, links) = unsafe {
            let states_ptr = mapper.phys_to_ptr(base).cast::<AtomicU32>();
            let links_ptr = mapper
                .phys_to_ptr(base + n * size_of::<AtomicU32>() as u64)
                .cast::<AtomicU32>();
            for i in 0..count {
                states_ptr.add(i).write(AtomicU32::new(0));
                links_ptr.add(i).write(AtomicU32::new(NIL));
            }
            (
                core::slice::from_raw_parts(states_ptr, count),
                core::slice::from_raw_parts(links_ptr, count),
            )
        };

        let shards = core::array::from_fn(|cpu| {
            if cpu == 0 {
                SpinLock::named("kmem", Shard::with_range(links, npages))
            } else {
                SpinLock::named("kmem", Shard::empty())
            }
        });

        let first_page = PhysicalPage::<Size4K>::containing(first);
        info!(
            "kalloc: managing {npages} pages at {}..{} ({} bytes of metadata at {base}, {NCPU} shards)",
            first_page.base(),
            first_page.add(n).base(),
            first.as_u64() - base.as_u64(),
        );

        Ok(Self {
            first: first_page,
            npages,
            metadata: MemoryBounds::new(base, first),
            refs: RefTable::new(states),
            links,
            shards,
            mapper,
            cpus,
        })
    }

    /// Allocate one page with a reference count of 1.
    ///
    /// The page's contents are junk ([`ALLOC_FILL`]).
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] when every shard is empty.
    ///
    /// # Panics
    /// If a page taken from a free pool was not free (corrupted accounting).
    pub fn allocate(&self) -> Result<PhysicalPage<Size4K>, AllocError> {
        let me = self.current_shard();
        let idx = match self.pop_local(me) {
            Some(idx) => idx,
            None => self.steal_into(me).ok_or(AllocError::OutOfMemory)?,
        };
        let page = self.page_at(idx);
        // SAFETY: The page was just claimed; we are its only holder.
        unsafe { self.fill(page, ALLOC_FILL) };
        trace!("kalloc: cpu {me} allocated {page}");
        Ok(page)
    }

    /// Drop one reference to the page at `pa`.
    ///
    /// When the last reference goes, the page is overwritten with
    /// [`FREE_FILL`] and pushed onto the calling core's shard.
    ///
    /// # Panics
    /// - If `pa` is not page aligned or outside the managed range.
    /// - If the page is already free (double free).
    pub fn free(&self, pa: impl Into<PhysicalAddress>) {
        let (page, idx) = self.checked_index(pa.into(), "free");
        let me = self.current_shard();
        match self.refs.release(idx) {
            Ok(Released::Shared(rest)) => {
                trace!("kfree: {page} still has {rest} holders");
            }
            Ok(Released::Last) => {
                // SAFETY: No holder is left and the page is in no pool yet.
                unsafe { self.fill(page, FREE_FILL) };
                self.shards[me].lock().push(self.links, idx);
                trace!("kfree: {page} returned to shard {me}");
            }
            Err(_) => panic!("free: double free of page {page}"),
        }
    }

    /// Register one more holder of the page at `pa` without copying it.
    ///
    /// # Panics
    /// - If `pa` is not page aligned or outside the managed range.
    /// - If the page is free.
    pub fn reference(&self, pa: impl Into<PhysicalAddress>) {
        let (page, idx) = self.checked_index(pa.into(), "reference");
        match self.refs.share(idx) {
            Ok(n) => trace!("krefer: {page} now has {n} holders"),
            Err(_) => panic!("reference: page {page} is free"),
        }
    }

    /// Obtain a page the caller may write without affecting other holders.
    ///
    /// A page with a single holder is returned unchanged. Otherwise a fresh page
    /// is allocated (stealing if needed), the contents are copied, and the
    /// caller's reference to the original is dropped.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] if a copy was needed but no page is
    /// available. The original is left untouched in that case.
    ///
    /// # Panics
    /// - If `pa` is not page aligned or outside the managed range.
    /// - If the page is free.
    pub fn duplicate_on_write(
        &self,
        pa: impl Into<PhysicalAddress>,
    ) -> Result<PhysicalPage<Size4K>, AllocError> {
        let (page, idx) = self.checked_index(pa.into(), "duplicate_on_write");
        let state = self.refs.get(idx);
        match state.refcount() {
            0 => panic!("duplicate_on_write: page {page} is free"),
            1 => return Ok(page),
            _ => {}
        }

        let copy = self.allocate()?;
        // SAFETY: We hold a reference to `page`, so it stays allocated; `copy`
        // is exclusively ours. Distinct pages never overlap.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.mapper.phys_to_ptr(page.base()),
                self.mapper.phys_to_ptr(copy.base()),
                PAGE_SIZE,
            );
        }
        // Another holder may have dropped out meanwhile; `free` handles
        // the case where ours was the last reference.
        self.free(page);
        trace!("kcopy: {page} duplicated into {copy}");
        Ok(copy)
    }

    /// Current reference count of the page at `pa` (`0` when free).
    ///
    /// # Panics
    /// If `pa` is not page aligned or outside the managed range.
    pub fn refcount(&self, pa: impl Into<PhysicalAddress>) -> u32 {
        let (_, idx) = self.checked_index(pa.into(), "refcount");
        self.refs.get(idx).refcount()
    }

    /// Whether the page at `pa` sits in some shard's free pool.
    ///
    /// Walks every pool; meant for diagnostics and tests.
    ///
    /// # Panics
    /// If `pa` is not page aligned or outside the managed range.
    pub fn in_free_pool(&self, pa: impl Into<PhysicalAddress>) -> bool {
        let (_, idx) = self.checked_index(pa.into(), "in_free_pool");
        self.shards
            .iter()
            .any(|s| s.lock().contains(self.links, idx))
    }

    /// Total number of free pages over all shards.
    ///
    /// Shards are visited one after another, so the sum is only exact while
    /// no other core allocates or frees.
    pub fn free_pages(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Number of pages with at least one holder.
    ///
    /// Reads every page's state once; exact only while nothing changes.
    pub fn owned_pages(&self) -> usize {
        self.refs.owned()
    }

    /// Free pages currently held by `cpu`'s shard.
    ///
    /// # Panics
    /// If `cpu >= NCPU`.
    pub fn shard_len(&self, cpu: usize) -> usize {
        self.shards[cpu].lock().len()
    }

    #[must_use]
    pub const fn total_pages(&self) -> usize {
        self.npages as usize
    }

    /// The managed pages, `[start, end)`.
    #[must_use]
    pub const fn managed_range(&self) -> MemoryBounds {
        MemoryBounds::new(self.first.base(), self.first.add(self.npages as u64).base())
    }

    /// The region holding the allocator's own bookkeeping.
    #[must_use]
    pub const fn metadata_range(&self) -> MemoryBounds {
        self.metadata
    }

    fn current_shard(&self) -> usize {
        let cpu = self.cpus.cpu_id();
        assert!(cpu < NCPU, "kalloc: cpu id {cpu} exceeds {NCPU} shards");
        cpu
    }

    fn pop_local(&self, me: usize) -> Option<u32> {
        let mut shard = self.shards[me].lock();
        let idx = shard.pop(self.links)?;
        self.claim(idx);
        Some(idx)
    }

    /// Refill `me` from the other shards, then pop from it.
    fn steal_into(&self, me: usize) -> Option<u32> {
        for offset in 1..NCPU {
            let victim = (me + offset) % NCPU;
            let detached = self.shards[victim].lock().detach_half(self.links);
            let Some(chain) = detached else {
                continue;
            };
            debug!(
                "kalloc: cpu {me} stole {} pages from shard {victim}",
                chain.len()
            );

            let mut local = self.shards[me].lock();
            local.splice(self.links, chain);
            if let Some(idx) = local.pop(self.links) {
                self.claim(idx);
                return Some(idx);
            }
        }
        warn!("kalloc: out of memory on cpu {me}");
        None
    }

    fn claim(&self, idx: u32) {
        if let Err(state) = self.refs.claim(idx) {
            panic!(
                "allocate: page {} in a free pool has refcount {}",
                self.page_at(idx),
                state.refcount()
            );
        }
    }

    fn page_at(&self, idx: u32) -> PhysicalPage<Size4K> {
        debug_assert!(idx < self.npages);
        self.first.add(u64::from(idx))
    }

    fn checked_index(&self, pa: PhysicalAddress, op: &str) -> (PhysicalPage<Size4K>, u32) {
        let Some(page) = PhysicalPage::<Size4K>::from_aligned(pa) else {
            panic!("{op}: unaligned page address {pa}");
        };
        if page < self.first || page.index_from(self.first) >= u64::from(self.npages) {
            panic!("{op}: page {page} is outside the managed range");
        }
        #[allow(clippy::cast_possible_truncation)]
        let idx = page.index_from(self.first) as u32;
        (page, idx)
    }

    /// # Safety
    /// The caller must be the only one touching `page`.
    unsafe fn fill(&self, page: PhysicalPage<Size4K>, byte: u8) {
        // SAFETY: Managed pages are mapped; exclusivity is on the caller.
        unsafe {
            core::ptr::write_bytes(self.mapper.phys_to_ptr(page.base()), byte, PAGE_SIZE);
        }
    }
}
