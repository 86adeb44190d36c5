use kernel_info::config::BLOCK_SIZE;

/// Transfer direction of a block request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    /// Disk to memory.
    Read,
    /// Memory to disk.
    Write,
}

/// The disk driver, as seen by the cache.
///
/// Requests are synchronous: `rw` returns once the transfer has completed.
/// The caller holds the block's content lock for the whole call, so a driver
/// may put the calling thread to sleep while the device works.
pub trait BlockDevice {
    fn rw(&self, dev: u32, blockno: u32, data: &mut [u8; BLOCK_SIZE], dir: Direction);
}

/// Source of the monotonic tick count used to age idle buffers.
pub trait Clock {
    fn ticks(&self) -> u64;
}

impl<F> Clock for F
where
    F: Fn() -> u64,
{
    #[inline]
    fn ticks(&self) -> u64 {
        self()
    }
}
