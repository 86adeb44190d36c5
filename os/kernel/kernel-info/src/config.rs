//! # Compile-Time Configuration

/// Size of a physical page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Size of a disk block (and of a buffer cache slot) in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Number of hash buckets in the block cache.
///
/// A prime keeps sequential block numbers spread over all chains.
pub const NBUCK: usize = 13;

/// Maximum number of blocks any single file-system operation writes.
pub const MAX_OP_BLOCKS: usize = 10;

/// Default size of the block cache's buffer pool.
pub const NBUF: usize = MAX_OP_BLOCKS * 3;

/// Maximum number of cores; one allocator shard per core.
pub const NCPU: usize = 8;

/// Byte pattern written over a page when its last reference is dropped.
pub const FREE_FILL: u8 = 0x01;

/// Byte pattern written over a page when it is handed out.
pub const ALLOC_FILL: u8 = 0x05;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(BLOCK_SIZE <= PAGE_SIZE);
    assert!(NBUCK > 0);
    assert!(NBUF >= NBUCK);
    assert!(NCPU > 0);
    assert!(FREE_FILL != ALLOC_FILL);
};
