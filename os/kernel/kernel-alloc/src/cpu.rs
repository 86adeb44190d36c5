/// Identifies the core the caller runs on.
///
/// The answer selects the allocator shard to use. It only has to be stable
/// for the duration of one allocator call (the kernel disables interrupts
/// around the lookup); a stale answer costs locality, never correctness,
/// because every shard is locked before use.
pub trait CurrentCpu {
    fn cpu_id(&self) -> usize;
}

impl<F> CurrentCpu for F
where
    F: Fn() -> usize,
{
    #[inline]
    fn cpu_id(&self) -> usize {
        self()
    }
}

/// Uniprocessor systems and early boot: always core 0.
#[derive(Debug, Default, Copy, Clone)]
pub struct SingleCpu;

impl CurrentCpu for SingleCpu {
    #[inline]
    fn cpu_id(&self) -> usize {
        0
    }
}
