use core::hint::spin_loop;

/// The scheduler hook a [`SleepLock`](crate::SleepLock) suspends through.
///
/// The kernel backs this with its sleep/wakeup channel; hosted tests back it
/// with a condition variable.
///
/// # Contract
/// - [`wait_while`](WaitQueue::wait_while) must return only once `blocked()`
///   has evaluated to `false`. It may evaluate `blocked` any number of times.
/// - [`wake_all`](WaitQueue::wake_all) must synchronize with a waiter that has
///   already evaluated `blocked()` but not yet gone to sleep, so the wakeup is
///   not lost. Taking the same internal lock in both methods is enough.
pub trait WaitQueue {
    fn wait_while(&self, blocked: &mut dyn FnMut() -> bool);
    fn wake_all(&self);
}

/// A [`WaitQueue`] that never suspends and busy-waits instead.
///
/// Usable before the scheduler runs, when there is nothing to switch to.
#[derive(Debug, Default, Copy, Clone)]
pub struct SpinWait;

impl WaitQueue for SpinWait {
    #[inline]
    fn wait_while(&self, blocked: &mut dyn FnMut() -> bool) {
        while blocked() {
            spin_loop();
        }
    }

    #[inline]
    fn wake_all(&self) {}
}
