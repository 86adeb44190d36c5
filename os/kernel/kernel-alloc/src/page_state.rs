//! Per-page reference accounting.
//!
//! Every managed page is either [`PageState::Free`] (sitting in exactly one
//! shard's free pool) or [`PageState::Owned`] by `n >= 1` holders. The state
//! of each page is one atomic word (`0` is free, `n` is owned by `n`), so
//! cores touching different pages never contend. All transitions go through
//! [`RefTable`]; each one is a single compare-and-swap on that word.

use core::num::NonZeroU32;
use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PageState {
    Free,
    Owned(NonZeroU32),
}

impl PageState {
    #[inline]
    const fn from_raw(raw: u32) -> Self {
        match NonZeroU32::new(raw) {
            None => Self::Free,
            Some(n) => Self::Owned(n),
        }
    }

    /// The plain reference count (`0` for a free page).
    #[inline]
    #[must_use]
    pub const fn refcount(self) -> u32 {
        match self {
            Self::Free => 0,
            Self::Owned(n) => n.get(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

/// Outcome of dropping one reference.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Released {
    /// That was the last reference; the page is now free.
    Last,
    /// Other holders remain.
    Shared(NonZeroU32),
}

/// The page states, indexed by page number within the managed range.
pub(crate) struct RefTable {
    states: &'static [AtomicU32],
}

impl RefTable {
    pub(crate) const fn new(states: &'static [AtomicU32]) -> Self {
        Self { states }
    }

    #[inline]
    pub(crate) fn get(&self, idx: u32) -> PageState {
        PageState::from_raw(self.word(idx).load(Ordering::Acquire))
    }

    /// `Free → Owned(1)`. Returns the offending state otherwise.
    pub(crate) fn claim(&self, idx: u32) -> Result<(), PageState> {
        self.word(idx)
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(PageState::from_raw)
    }

    /// `Owned(n) → Owned(n + 1)`. Returns `Err` for a free page.
    ///
    /// # Panics
    /// If the count would overflow.
    pub(crate) fn share(&self, idx: u32) -> Result<NonZeroU32, PageState> {
        let prev = self
            .word(idx)
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                0 | u32::MAX => None,
                n => Some(n + 1),
            });
        match prev {
            Ok(n) => Ok(NonZeroU32::MIN.saturating_add(n)),
            Err(0) => Err(PageState::Free),
            Err(_) => panic!("reference: reference count of page #{idx} overflows"),
        }
    }

    /// `Owned(n) → Owned(n - 1)` or `Owned(1) → Free`. Returns `Err` for a
    /// free page.
    pub(crate) fn release(&self, idx: u32) -> Result<Released, PageState> {
        let prev = self
            .word(idx)
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match prev.map(|n| NonZeroU32::new(n - 1)) {
            Ok(None) => Ok(Released::Last),
            Ok(Some(rest)) => Ok(Released::Shared(rest)),
            Err(_) => Err(PageState::Free),
        }
    }

    /// Number of pages with at least one holder.
    pub(crate) fn owned(&self) -> usize {
        self.states
            .iter()
            .filter(|s| s.load(Ordering::Relaxed) != 0)
            .count()
    }

    #[inline]
    fn word(&self, idx: u32) -> &AtomicU32 {
        &self.states[idx as usize]
    }
}
