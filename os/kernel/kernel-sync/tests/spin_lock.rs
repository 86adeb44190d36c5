use kernel_sync::SpinLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[test]
fn guard_gives_access_and_unlocks_on_drop() {
    let l = SpinLock::named("kmem", [0_u32; 4]);
    {
        let mut g = l.lock();
        g[2] = 7;
        assert!(l.is_locked());
    }
    assert!(!l.is_locked());
    assert_eq!(l.lock()[2], 7);
}

#[test]
fn try_lock_only_succeeds_when_free() {
    let l = SpinLock::new(5_u8);
    let held = l.lock();
    assert!(l.try_lock().is_none());
    // a failed attempt must not release the holder's lock
    assert!(l.is_locked());
    drop(held);

    let again = l.try_lock().expect("lock is free");
    assert_eq!(*again, 5);
}

#[test]
fn exclusive_access_needs_no_locking() {
    let mut l = SpinLock::new(Vec::from([1, 2]));
    l.get_mut().push(3);
    assert!(!l.is_locked());
    assert_eq!(l.into_inner(), [1, 2, 3]);
}

#[test]
fn name_and_state_show_in_debug_output() {
    let l = SpinLock::named("bcache.bucket", ());
    assert_eq!(l.name(), "bcache.bucket");
    assert_eq!(SpinLock::new(()).name(), "spinlock");

    let g = l.lock();
    let shown = format!("{l:?}");
    assert!(shown.contains("bcache.bucket"), "{shown}");
    assert!(shown.contains("locked: true"), "{shown}");
    drop(g);
    assert!(format!("{l:?}").contains("locked: false"));
}

#[test]
fn unwinding_through_a_guard_releases_the_lock() {
    let l = SpinLock::new(0_u32);
    let res = catch_unwind(AssertUnwindSafe(|| {
        let mut g = l.lock();
        *g = 9;
        panic!("inside the critical section");
    }));
    assert!(res.is_err());
    assert!(!l.is_locked());
    assert_eq!(*l.lock(), 9);
}

#[test]
fn contenders_never_overlap() {
    const THREADS: usize = 8;
    const ITERS: usize = 4_000;

    let l = SpinLock::named("counter", 0_usize);
    let inside = AtomicBool::new(false);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                start.wait();
                for _ in 0..ITERS {
                    let mut g = l.lock();
                    assert!(!inside.swap(true, Ordering::SeqCst), "two holders");
                    *g += 1;
                    inside.store(false, Ordering::SeqCst);
                    drop(g);
                    thread::yield_now();
                }
            });
        }
    });

    assert_eq!(l.into_inner(), THREADS * ITERS);
}
