use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// The named lock word shared by [`SpinLock`](crate::SpinLock) and
/// [`SleepLock`](crate::SleepLock).
///
/// Acquiring is `Acquire`, releasing is `Release`; the data the word protects
/// lives next to it in the owning lock.
pub(crate) struct RawLock {
    held: AtomicBool,
    name: &'static str,
}

impl RawLock {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            held: AtomicBool::new(false),
            name,
        }
    }

    #[inline]
    pub(crate) const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub(crate) fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Test-and-test-and-set: contenders spin on a plain load and only retry
    /// the exchange once the word reads free.
    #[inline]
    pub(crate) fn spin_acquire(&self) {
        while self
            .held
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.held.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    #[inline]
    pub(crate) fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}
