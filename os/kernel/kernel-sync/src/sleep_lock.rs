use crate::WaitQueue;
use crate::raw_lock::RawLock;
use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

/// A mutual exclusion lock whose waiters are suspended instead of spinning.
///
/// Meant for long critical sections such as disk I/O on a cached block. The
/// holder may sleep while holding it; the lock itself never disables anything.
/// Waiting is unbounded, there is no timeout.
///
/// # Examples
/// ```
/// use kernel_sync::{SleepLock, SpinWait};
///
/// let l = SleepLock::named("buffer", [0u8; 4], SpinWait);
/// {
///     let mut g = l.lock();
///     g[0] = 7;
///     assert!(l.is_locked());
/// }
/// assert!(!l.is_locked());
/// assert_eq!(l.lock()[0], 7);
/// ```
pub struct SleepLock<T, W> {
    raw: RawLock,
    waiters: W,
    data: UnsafeCell<T>,
}

// SAFETY: The lock word hands `&mut T` to one thread at a time; the wait
// queue is only used through `&self`.
unsafe impl<T: Send, W: Sync> Sync for SleepLock<T, W> {}

impl<T, W: WaitQueue> SleepLock<T, W> {
    pub const fn named(name: &'static str, data: T, waiters: W) -> Self {
        Self {
            raw: RawLock::new(name),
            waiters,
            data: UnsafeCell::new(data),
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.raw.name()
    }

    /// Whether some guard is currently alive.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.raw.is_held()
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T, W>> {
        self.raw.try_acquire().then(|| SleepLockGuard { lock: self })
    }

    /// Acquire the lock, suspending through the wait queue while another
    /// holder has it.
    pub fn lock(&self) -> SleepLockGuard<'_, T, W> {
        loop {
            if let Some(g) = self.try_lock() {
                return g;
            }
            self.waiters
                .wait_while(&mut || self.raw.is_held());
        }
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T, W> fmt::Debug for SleepLock<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepLock")
            .field("name", &self.raw.name())
            .field("locked", &self.raw.is_held())
            .finish_non_exhaustive()
    }
}

pub struct SleepLockGuard<'a, T, W: WaitQueue> {
    lock: &'a SleepLock<T, W>,
}

impl<T, W: WaitQueue> SleepLockGuard<'_, T, W> {
    /// The lock this guard holds.
    #[inline]
    #[must_use]
    pub const fn lock(&self) -> &SleepLock<T, W> {
        self.lock
    }
}

impl<T, W: WaitQueue> Deref for SleepLockGuard<'_, T, W> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: The guard proves the lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, W: WaitQueue> DerefMut for SleepLockGuard<'_, T, W> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: Held, and not shared through `&mut self`.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T, W: WaitQueue> Drop for SleepLockGuard<'_, T, W> {
    fn drop(&mut self) {
        self.lock.raw.release();
        self.lock.waiters.wake_all();
    }
}
