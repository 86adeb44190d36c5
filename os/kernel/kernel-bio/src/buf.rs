use crate::cache::BlockCache;
use crate::device::{BlockDevice, Clock};
use core::fmt;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use kernel_info::config::BLOCK_SIZE;
use kernel_sync::{SleepLockGuard, WaitQueue};

/// A held, locked block buffer.
///
/// The handle owns both a reference on its cache slot and the slot's content
/// lock. Dropping it releases the content lock first and then the reference,
/// after which the slot may be reused for another block.
pub struct Buf<'a, D, K, W, const NBUF: usize, const NBUCK: usize>
where
    D: BlockDevice,
    K: Clock,
    W: WaitQueue + Default,
{
    cache: &'a BlockCache<D, K, W, NBUF, NBUCK>,
    slot: usize,
    data: ManuallyDrop<SleepLockGuard<'a, [u8; BLOCK_SIZE], W>>,
}

impl<'a, D, K, W, const NBUF: usize, const NBUCK: usize> Buf<'a, D, K, W, NBUF, NBUCK>
where
    D: BlockDevice,
    K: Clock,
    W: WaitQueue + Default,
{
    pub(crate) const fn new(
        cache: &'a BlockCache<D, K, W, NBUF, NBUCK>,
        slot: usize,
        data: SleepLockGuard<'a, [u8; BLOCK_SIZE], W>,
    ) -> Self {
        Self {
            cache,
            slot,
            data: ManuallyDrop::new(data),
        }
    }

    #[inline]
    #[must_use]
    pub fn dev(&self) -> u32 {
        self.cache.slots[self.slot].dev()
    }

    #[inline]
    #[must_use]
    pub fn blockno(&self) -> u32 {
        self.cache.slots[self.slot].blockno()
    }

    /// Index of the cache slot backing this buffer.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Whether the data reflects the block's on-disk contents (or newer).
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.cache.slots[self.slot].is_valid()
    }

    pub(crate) fn is_from(&self, cache: &BlockCache<D, K, W, NBUF, NBUCK>) -> bool {
        core::ptr::eq(self.cache, cache)
    }

    pub(crate) fn holds_content_lock(&self) -> bool {
        let lock = self.data.lock();
        core::ptr::eq(lock, &self.cache.slots[self.slot].data) && lock.is_locked()
    }
}

impl<D, K, W, const NBUF: usize, const NBUCK: usize> Deref for Buf<'_, D, K, W, NBUF, NBUCK>
where
    D: BlockDevice,
    K: Clock,
    W: WaitQueue + Default,
{
    type Target = [u8; BLOCK_SIZE];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<D, K, W, const NBUF: usize, const NBUCK: usize> DerefMut for Buf<'_, D, K, W, NBUF, NBUCK>
where
    D: BlockDevice,
    K: Clock,
    W: WaitQueue + Default,
{
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<D, K, W, const NBUF: usize, const NBUCK: usize> Drop for Buf<'_, D, K, W, NBUF, NBUCK>
where
    D: BlockDevice,
    K: Clock,
    W: WaitQueue + Default,
{
    fn drop(&mut self) {
        // Safety: `data` is not used again after this.
        unsafe { ManuallyDrop::drop(&mut self.data) };
        self.cache.unref(self.slot);
    }
}

impl<D, K, W, const NBUF: usize, const NBUCK: usize> fmt::Debug for Buf<'_, D, K, W, NBUF, NBUCK>
where
    D: BlockDevice,
    K: Clock,
    W: WaitQueue + Default,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buf")
            .field("dev", &self.dev())
            .field("blockno", &self.blockno())
            .field("slot", &self.slot)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}
