//! Per-core free pools.
//!
//! A shard is an intrusive LIFO stack of page indices. The `next` links live
//! in a table shared by all shards; a page's link is only touched by the shard
//! that currently holds the page, under that shard's lock, so relaxed atomics
//! are sufficient.

use core::sync::atomic::{AtomicU32, Ordering};

/// End-of-list marker.
pub(crate) const NIL: u32 = u32::MAX;

#[derive(Debug)]
pub(crate) struct Shard {
    head: u32,
    len: usize,
}

/// A detached run of linked pages, `head ..= tail`.
#[derive(Debug)]
pub(crate) struct Chain {
    head: u32,
    tail: u32,
    len: usize,
}

impl Chain {
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }
}

impl Shard {
    pub(crate) const fn empty() -> Self {
        Self { head: NIL, len: 0 }
    }

    /// A shard holding pages `0..n`, lowest index on top.
    pub(crate) fn with_range(links: &[AtomicU32], n: u32) -> Self {
        if n == 0 {
            return Self::empty();
        }
        for i in 0..n - 1 {
            links[i as usize].store(i + 1, Ordering::Relaxed);
        }
        links[(n - 1) as usize].store(NIL, Ordering::Relaxed);
        Self {
            head: 0,
            len: n as usize,
        }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn push(&mut self, links: &[AtomicU32], idx: u32) {
        links[idx as usize].store(self.head, Ordering::Relaxed);
        self.head = idx;
        self.len += 1;
    }

    pub(crate) fn pop(&mut self, links: &[AtomicU32]) -> Option<u32> {
        if self.head == NIL {
            debug_assert_eq!(self.len, 0);
            return None;
        }
        let idx = self.head;
        self.head = links[idx as usize].load(Ordering::Relaxed);
        self.len -= 1;
        Some(idx)
    }

    /// Detach the top half of the stack (rounded down, but at least one page
    /// so a single remaining page can still move).
    pub(crate) fn detach_half(&mut self, links: &[AtomicU32]) -> Option<Chain> {
        if self.is_empty() {
            return None;
        }
        let take = (self.len / 2).max(1);
        let head = self.head;
        let mut tail = head;
        for _ in 1..take {
            tail = links[tail as usize].load(Ordering::Relaxed);
        }
        self.head = links[tail as usize].load(Ordering::Relaxed);
        self.len -= take;
        links[tail as usize].store(NIL, Ordering::Relaxed);
        Some(Chain {
            head,
            tail,
            len: take,
        })
    }

    /// Put a detached chain on top of this stack.
    pub(crate) fn splice(&mut self, links: &[AtomicU32], chain: Chain) {
        links[chain.tail as usize].store(self.head, Ordering::Relaxed);
        self.head = chain.head;
        self.len += chain.len;
    }

    /// Walk the stack looking for `idx`. Diagnostic only, `O(len)`.
    pub(crate) fn contains(&self, links: &[AtomicU32], idx: u32) -> bool {
        let mut cur = self.head;
        while cur != NIL {
            if cur == idx {
                return true;
            }
            cur = links[cur as usize].load(Ordering::Relaxed);
        }
        false
    }
}
