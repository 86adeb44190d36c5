use kernel_memory_addresses::PhysicalAddress;

/// Recoverable allocation failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// Every shard's free pool is empty.
    #[error("out of physical memory")]
    OutOfMemory,
}

/// The boot-time memory bounds cannot be managed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum InitError {
    #[error("memory bounds are inverted: start {start} lies above end {end}")]
    Inverted {
        start: PhysicalAddress,
        end: PhysicalAddress,
    },
    #[error("{bytes} bytes of RAM cannot hold a single page plus its metadata")]
    TooSmall { bytes: u64 },
}
