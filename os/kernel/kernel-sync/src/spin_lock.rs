use crate::raw_lock::RawLock;
use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

/// A non-suspending mutual exclusion lock for short critical sections.
///
/// Contenders busy-wait. Nothing that may sleep (disk I/O, a
/// [`SleepLock`](crate::SleepLock)) is allowed while one is held.
///
/// The static name shows up in `Debug` output and panics of the users, so
/// "kmem" and "bcache.bucket" can be told apart in a hang.
///
/// # Examples
/// ```
/// use kernel_sync::SpinLock;
///
/// let free = SpinLock::named("kmem", 3_usize);
/// *free.lock() -= 1;
/// assert_eq!(*free.lock(), 2);
/// ```
pub struct SpinLock<T> {
    raw: RawLock,
    data: UnsafeCell<T>,
}

// SAFETY: The lock word hands `&mut T` to one thread at a time.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self::named("spinlock", data)
    }

    pub const fn named(name: &'static str, data: T) -> Self {
        Self {
            raw: RawLock::new(name),
            data: UnsafeCell::new(data),
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.raw.name()
    }

    /// Snapshot of whether a guard is alive. Diagnostics only.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.raw.is_held()
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.raw.try_acquire().then(|| SpinLockGuard { lock: self })
    }

    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.raw.spin_acquire();
        SpinLockGuard { lock: self }
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("name", &self.name())
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// Access to the data of a held [`SpinLock`]; unlocks on drop.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The guard proves the lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The guard proves the lock is held, and `&mut self` that it
        // is not shared.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release();
    }
}
