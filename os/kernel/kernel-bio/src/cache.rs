//! # Hashed buffer cache
//!
//! ```text
//!  buckets (blockno % NBUCK)            slots (fixed pool of NBUF)
//! ┌──────────┐
//! │ 0  lock  │──► slot 4 ──► slot 0 ──► ∅
//! │ 1  lock  │──► slot 2 ──► ∅
//! │ …        │
//! │ 12 lock  │──► slot 1 ──► slot 3 ──► ∅
//! └──────────┘
//! ```
//!
//! ## Locking
//!
//! - A bucket lock guards its chain and the `refcnt`, `pins`, identity and
//!   `recency` fields of every slot on that chain.
//! - A slot's sleep lock guards the block data and the `valid` flag once the
//!   slot is held. It is only taken after the bucket lock has been dropped,
//!   and disk I/O only happens under it.
//! - The eviction lock serializes every move of a slot between chains. Its
//!   holder picks a victim without any bucket lock, then locks the target
//!   chain and the victim's chain only, and rechecks that the victim is still
//!   idle before unlinking it. Hits and releases on any other chain proceed
//!   meanwhile. Everyone else holds at most one bucket lock and never waits
//!   on anything while holding it.
//!
//! ## Replacement
//!
//! On a miss an idle slot already on the target chain is reused first (the
//! least recently released one). Only when the target chain has none does the
//! eviction path take the least recently released idle slot of any other
//! chain. Releasing a buffer only records a tick; nothing is reordered.

use crate::buf::Buf;
use crate::device::{BlockDevice, Clock, Direction};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use kernel_info::config::{self, BLOCK_SIZE};
use kernel_sync::{SleepLock, SpinLock, SpinLockGuard, WaitQueue};
use log::{debug, trace};

/// End-of-chain marker.
const NONE: usize = usize::MAX;

/// Device id of a slot that has never held a block.
const NO_DEV: u32 = u32::MAX;

pub(crate) struct Slot<W> {
    dev: AtomicU32,
    blockno: AtomicU32,
    refcnt: AtomicU32,
    pins: AtomicU32,
    valid: AtomicBool,
    recency: AtomicU64,
    next: AtomicUsize,
    pub(crate) data: SleepLock<[u8; BLOCK_SIZE], W>,
}

impl<W: WaitQueue> Slot<W> {
    fn new(waiters: W) -> Self {
        Self {
            dev: AtomicU32::new(NO_DEV),
            blockno: AtomicU32::new(0),
            refcnt: AtomicU32::new(0),
            pins: AtomicU32::new(0),
            valid: AtomicBool::new(false),
            recency: AtomicU64::new(0),
            next: AtomicUsize::new(NONE),
            data: SleepLock::named("buffer", [0; BLOCK_SIZE], waiters),
        }
    }

    fn is(&self, dev: u32, blockno: u32) -> bool {
        self.dev.load(Ordering::Relaxed) == dev && self.blockno.load(Ordering::Relaxed) == blockno
    }

    fn refcnt(&self) -> u32 {
        self.refcnt.load(Ordering::Relaxed)
    }

    fn recency(&self) -> u64 {
        self.recency.load(Ordering::Relaxed)
    }

    pub(crate) fn dev(&self) -> u32 {
        self.dev.load(Ordering::Relaxed)
    }

    pub(crate) fn blockno(&self) -> u32 {
        self.blockno.load(Ordering::Relaxed)
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }
}

/// Head of one hash chain.
struct Bucket {
    head: usize,
}

/// A fixed pool of `NBUF` block buffers hashed into `NBUCK` chains.
///
/// `D` performs the actual disk transfers, `K` ages idle buffers and `W`
/// suspends callers waiting for a busy block.
pub struct BlockCache<
    D,
    K,
    W,
    const NBUF: usize = { config::NBUF },
    const NBUCK: usize = { config::NBUCK },
> {
    device: D,
    clock: K,
    evict: SpinLock<()>,
    buckets: [SpinLock<Bucket>; NBUCK],
    pub(crate) slots: [Slot<W>; NBUF],
}

impl<D, K, W, const NBUF: usize, const NBUCK: usize> BlockCache<D, K, W, NBUF, NBUCK> {
    /// The disk driver the cache transfers through.
    #[inline]
    pub const fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub const fn clock(&self) -> &K {
        &self.clock
    }
}

impl<D, K, W, const NBUF: usize, const NBUCK: usize> BlockCache<D, K, W, NBUF, NBUCK>
where
    D: BlockDevice,
    K: Clock,
    W: WaitQueue + Default,
{
    /// Create a cache whose slots are all idle and empty.
    ///
    /// Every slot starts on the chain of block 0 and matches no real block.
    pub fn new(device: D, clock: K) -> Self {
        const {
            assert!(NBUF > 0);
            assert!(NBUCK > 0);
        };

        let slots: [Slot<W>; NBUF] = core::array::from_fn(|_| Slot::new(W::default()));
        for (i, slot) in slots.iter().enumerate() {
            let next = if i + 1 < NBUF { i + 1 } else { NONE };
            slot.next.store(next, Ordering::Relaxed);
        }

        let buckets = core::array::from_fn(|b| {
            let head = if b == 0 { 0 } else { NONE };
            SpinLock::named("bcache.bucket", Bucket { head })
        });

        Self {
            device,
            clock,
            evict: SpinLock::named("bcache", ()),
            buckets,
            slots,
        }
    }

    /// Return a locked buffer holding the current contents of the block.
    ///
    /// The first holder after the block entered the cache reads it from the
    /// device; later holders find it valid.
    ///
    /// # Panics
    /// If every buffer is held (see [`get`](Self::get)).
    pub fn read(&self, dev: u32, blockno: u32) -> Buf<'_, D, K, W, NBUF, NBUCK> {
        let mut buf = self.get(dev, blockno);
        let slot = &self.slots[buf.slot()];
        if !slot.is_valid() {
            trace!("bread: reading block {dev}/{blockno} into slot {}", buf.slot());
            self.device.rw(dev, blockno, &mut buf, Direction::Read);
            slot.valid.store(true, Ordering::Relaxed);
        }
        buf
    }

    /// Return a locked buffer for the block without reading it.
    ///
    /// If the block was not cached, the buffer is not valid and its data is
    /// whatever the slot held before.
    ///
    /// # Panics
    /// If the block is not cached and every buffer is held. The pool is sized
    /// to the maximum number of blocks held at once, so this is a caller bug.
    pub fn get(&self, dev: u32, blockno: u32) -> Buf<'_, D, K, W, NBUF, NBUCK> {
        let h = Self::bucket_of(blockno);
        {
            let bucket = self.buckets[h].lock();
            if let Some(i) = self.lookup(&bucket, dev, blockno) {
                self.slots[i].refcnt.fetch_add(1, Ordering::Relaxed);
                drop(bucket);
                trace!("bget: hit {dev}/{blockno} in slot {i}");
                return self.lock_slot(i);
            }
            if let Some(i) = self.least_recent_idle(&bucket) {
                self.assign(i, dev, blockno);
                drop(bucket);
                trace!("bget: reusing slot {i} of bucket {h} for {dev}/{blockno}");
                return self.lock_slot(i);
            }
        }
        let i = self.evict_into(h, dev, blockno);
        self.lock_slot(i)
    }

    /// Write the buffer's contents to disk.
    ///
    /// # Panics
    /// If the buffer's content lock is not held or the buffer belongs to
    /// another cache.
    pub fn write(&self, buf: &mut Buf<'_, D, K, W, NBUF, NBUCK>) {
        assert!(buf.is_from(self), "bwrite: buffer from another cache");
        assert!(buf.holds_content_lock(), "bwrite: buffer not locked");
        let (dev, blockno) = (buf.dev(), buf.blockno());
        trace!("bwrite: {dev}/{blockno}");
        self.device.rw(dev, blockno, buf, Direction::Write);
    }

    /// Give the buffer back. Equivalent to dropping it.
    ///
    /// # Panics
    /// If the buffer belongs to another cache.
    pub fn release(&self, buf: Buf<'_, D, K, W, NBUF, NBUCK>) {
        assert!(buf.is_from(self), "brelse: buffer from another cache");
        drop(buf);
    }

    /// Keep the block cached across a release without holding its contents.
    ///
    /// # Panics
    /// If the buffer belongs to another cache.
    pub fn pin(&self, buf: &Buf<'_, D, K, W, NBUF, NBUCK>) {
        assert!(buf.is_from(self), "bpin: buffer from another cache");
        let slot = &self.slots[buf.slot()];
        let _bucket = self.buckets[Self::bucket_of(slot.blockno())].lock();
        slot.refcnt.fetch_add(1, Ordering::Relaxed);
        slot.pins.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo one [`pin`](Self::pin).
    ///
    /// # Panics
    /// If the block has no pin to drop or the buffer belongs to another cache.
    pub fn unpin(&self, buf: &Buf<'_, D, K, W, NBUF, NBUCK>) {
        assert!(buf.is_from(self), "bunpin: buffer from another cache");
        let slot = &self.slots[buf.slot()];
        let _bucket = self.buckets[Self::bucket_of(slot.blockno())].lock();
        let Some(rest) = slot.pins.load(Ordering::Relaxed).checked_sub(1) else {
            panic!(
                "bunpin: block {}/{} is not pinned",
                slot.dev(),
                slot.blockno()
            );
        };
        slot.pins.store(rest, Ordering::Relaxed);
        slot.refcnt.fetch_sub(1, Ordering::Relaxed);
    }

    /// Holder count of a cached block, `None` if the block is not cached.
    pub fn refcnt(&self, dev: u32, blockno: u32) -> Option<u32> {
        let bucket = self.buckets[Self::bucket_of(blockno)].lock();
        self.lookup(&bucket, dev, blockno)
            .map(|i| self.slots[i].refcnt())
    }

    /// Number of buffers in the pool.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        NBUF
    }

    /// Drop one holder; called once the content lock is gone.
    pub(crate) fn unref(&self, i: usize) {
        let slot = &self.slots[i];
        let _bucket = self.buckets[Self::bucket_of(slot.blockno())].lock();
        let Some(rest) = slot.refcnt().checked_sub(1) else {
            panic!("brelse: slot {i} released more often than acquired");
        };
        slot.refcnt.store(rest, Ordering::Relaxed);
        if rest == 0 {
            slot.recency.store(self.clock.ticks(), Ordering::Relaxed);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn bucket_of(blockno: u32) -> usize {
        blockno as usize % NBUCK
    }

    fn lock_slot(&self, i: usize) -> Buf<'_, D, K, W, NBUF, NBUCK> {
        Buf::new(self, i, self.slots[i].data.lock())
    }

    fn chain<'a>(&'a self, bucket: &Bucket) -> impl Iterator<Item = usize> + 'a {
        let mut cur = bucket.head;
        core::iter::from_fn(move || {
            if cur == NONE {
                return None;
            }
            let i = cur;
            cur = self.slots[i].next.load(Ordering::Relaxed);
            Some(i)
        })
    }

    fn lookup(&self, bucket: &Bucket, dev: u32, blockno: u32) -> Option<usize> {
        self.chain(bucket).find(|&i| self.slots[i].is(dev, blockno))
    }

    fn least_recent_idle(&self, bucket: &Bucket) -> Option<usize> {
        self.chain(bucket)
            .filter(|&i| self.slots[i].refcnt() == 0)
            .min_by_key(|&i| self.slots[i].recency())
    }

    /// Give an idle slot a new identity. The caller holds the lock of the
    /// bucket the slot is (now) chained into.
    fn assign(&self, i: usize, dev: u32, blockno: u32) {
        let slot = &self.slots[i];
        debug_assert_eq!(slot.refcnt(), 0);
        debug_assert_eq!(slot.pins.load(Ordering::Relaxed), 0);
        slot.dev.store(dev, Ordering::Relaxed);
        slot.blockno.store(blockno, Ordering::Relaxed);
        slot.valid.store(false, Ordering::Relaxed);
        slot.refcnt.store(1, Ordering::Relaxed);
    }

    /// Miss with no idle slot on the target chain: move the least recently
    /// used idle slot of any other chain over.
    fn evict_into(&self, h: usize, dev: u32, blockno: u32) -> usize {
        let _evict = self.evict.lock();
        let mut target = self.buckets[h].lock();

        // Someone may have cached the block, or released a buffer on this
        // chain, while we waited for the eviction lock.
        if let Some(i) = self.lookup(&target, dev, blockno) {
            self.slots[i].refcnt.fetch_add(1, Ordering::Relaxed);
            return i;
        }
        if let Some(i) = self.least_recent_idle(&target) {
            self.assign(i, dev, blockno);
            return i;
        }

        let (b, i) = loop {
            let Some(i) = self
                .oldest_idle_elsewhere(h)
                .or_else(|| self.confirm_idle_elsewhere(h))
            else {
                panic!("bget: no buffers");
            };
            // Only eviction moves a slot between chains, so the victim's
            // chain cannot change under us. Its refcnt can.
            let b = Self::bucket_of(self.slots[i].blockno());
            let mut old = self.buckets[b].lock();
            if self.slots[i].refcnt() != 0 {
                trace!("bget: slot {i} was taken before it could be evicted");
                continue;
            }
            self.unlink(&mut old, i);
            break (b, i);
        };

        let slot = &self.slots[i];
        debug!(
            "bget: evicting slot {i} ({}/{}) from bucket {b} for {dev}/{blockno}",
            slot.dev(),
            slot.blockno()
        );
        slot.next.store(target.head, Ordering::Relaxed);
        target.head = i;
        self.assign(i, dev, blockno);
        i
    }

    /// Candidate victim for chain `h`, picked without any bucket lock. The
    /// caller holds the eviction lock and rechecks under the victim's bucket.
    fn oldest_idle_elsewhere(&self, h: usize) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.refcnt() == 0 && Self::bucket_of(slot.blockno()) != h)
            .min_by_key(|(_, slot)| slot.recency())
            .map(|(i, _)| i)
    }

    /// Scan again with every other chain locked in index order, so slots
    /// cannot turn busy and idle again behind the scan. Only used before
    /// declaring the pool exhausted.
    #[cold]
    fn confirm_idle_elsewhere(&self, h: usize) -> Option<usize> {
        let others: [Option<SpinLockGuard<'_, Bucket>>; NBUCK] =
            core::array::from_fn(|b| (b != h).then(|| self.buckets[b].lock()));
        others
            .iter()
            .flatten()
            .filter_map(|bucket| self.least_recent_idle(bucket))
            .min_by_key(|&i| self.slots[i].recency())
    }

    fn unlink(&self, bucket: &mut Bucket, i: usize) {
        let next = self.slots[i].next.load(Ordering::Relaxed);
        if bucket.head == i {
            bucket.head = next;
            return;
        }
        let mut cur = bucket.head;
        while cur != NONE {
            let link = &self.slots[cur].next;
            if link.load(Ordering::Relaxed) == i {
                link.store(next, Ordering::Relaxed);
                return;
            }
            cur = link.load(Ordering::Relaxed);
        }
        panic!("bget: slot {i} is not on its bucket's chain");
    }
}
