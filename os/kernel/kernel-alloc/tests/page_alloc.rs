use kernel_alloc::{AllocError, HhdmPhysMapper, InitError, PageAllocator, SingleCpu};
use kernel_info::config::{ALLOC_FILL, FREE_FILL, PAGE_SIZE};
use kernel_info::memory::MemoryBounds;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use std::alloc::{Layout, alloc_zeroed};
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Barrier;
use std::thread;

/// Leak a page-aligned heap arena that stands in for physical RAM.
fn ram(bytes: usize) -> MemoryBounds {
    let layout = Layout::from_size_align(bytes, PAGE_SIZE).unwrap();
    let ptr = unsafe { alloc_zeroed(layout) };
    assert!(!ptr.is_null());
    let start = ptr as usize as u64;
    MemoryBounds::new(
        PhysicalAddress::new(start),
        PhysicalAddress::new(start + bytes as u64),
    )
}

thread_local! {
    static CPU: Cell<usize> = const { Cell::new(0) };
}

fn on_cpu(id: usize) {
    CPU.with(|c| c.set(id));
}

fn current_cpu() -> usize {
    CPU.with(Cell::get)
}

type Smp<const N: usize> = PageAllocator<HhdmPhysMapper, fn() -> usize, N>;

fn single_core(pages: usize) -> PageAllocator<HhdmPhysMapper, SingleCpu, 1> {
    // one extra page holds the metadata
    let bounds = ram((pages + 1) * PAGE_SIZE);
    unsafe { PageAllocator::init(bounds, HhdmPhysMapper::identity(), SingleCpu) }.unwrap()
}

fn smp<const N: usize>(pages: usize) -> Smp<N> {
    let bounds = ram((pages + 1) * PAGE_SIZE);
    unsafe { PageAllocator::init(bounds, HhdmPhysMapper::identity(), current_cpu as fn() -> usize) }
        .unwrap()
}

fn bytes(page: PhysicalPage<Size4K>) -> &'static [u8; PAGE_SIZE] {
    unsafe { &*(page.base().as_u64() as usize as *const [u8; PAGE_SIZE]) }
}

fn bytes_mut(page: PhysicalPage<Size4K>) -> &'static mut [u8; PAGE_SIZE] {
    unsafe { &mut *(page.base().as_u64() as usize as *mut [u8; PAGE_SIZE]) }
}

/// Every managed page is either pooled or owned, never both, never neither.
fn assert_accounting<M, C, const N: usize>(a: &PageAllocator<M, C, N>)
where
    M: kernel_alloc::PhysMapper,
    C: kernel_alloc::CurrentCpu,
{
    let first = PhysicalPage::<Size4K>::containing(a.managed_range().start);
    for i in 0..a.total_pages() as u64 {
        let page = first.add(i);
        let pooled = a.in_free_pool(page);
        let owned = a.refcount(page) >= 1;
        assert!(pooled ^ owned, "{page}: pooled={pooled} owned={owned}");
    }
    assert_eq!(a.free_pages() + a.owned_pages(), a.total_pages());
}

#[test]
fn four_pages_then_exhaustion_then_one_more() {
    let a = single_core(4);
    assert_eq!(a.total_pages(), 4);
    assert_eq!(a.free_pages(), 4);

    let pages: Vec<_> = (0..4).map(|_| a.allocate().unwrap()).collect();
    assert_eq!(a.allocate(), Err(AllocError::OutOfMemory));

    a.free(pages[2]);
    let again = a.allocate().unwrap();
    assert_eq!(again, pages[2]);
    assert_eq!(a.allocate(), Err(AllocError::OutOfMemory));
    assert_accounting(&a);
}

#[test]
fn pages_come_out_in_address_order_and_are_distinct() {
    let a = single_core(8);
    let pages: Vec<_> = (0..8).map(|_| a.allocate().unwrap()).collect();
    for w in pages.windows(2) {
        assert_eq!(w[1], w[0].add(1));
    }
    assert!(a.managed_range().start.as_u64() >= a.metadata_range().end.as_u64());
    assert_eq!(
        PhysicalPage::<Size4K>::containing(a.managed_range().start),
        pages[0]
    );
}

#[test]
fn allocate_then_free_restores_free_count() {
    let a = single_core(16);
    let before = a.free_pages();
    let p = a.allocate().unwrap();
    assert_eq!(a.free_pages(), before - 1);
    assert_eq!(a.refcount(p), 1);
    a.free(p);
    assert_eq!(a.free_pages(), before);
    assert_eq!(a.refcount(p), 0);
    assert!(a.in_free_pool(p));
}

#[test]
fn junk_fills_on_allocate_and_free() {
    let a = single_core(2);
    let p = a.allocate().unwrap();
    assert!(bytes(p).iter().all(|&b| b == ALLOC_FILL));

    bytes_mut(p).fill(0xAB);
    a.free(p);
    assert!(bytes(p).iter().all(|&b| b == FREE_FILL));
}

#[test]
fn shared_page_survives_until_last_free() {
    let a = single_core(4);
    let p = a.allocate().unwrap();
    a.reference(p);
    a.reference(p);
    assert_eq!(a.refcount(p), 3);

    a.free(p);
    a.free(p);
    assert_eq!(a.refcount(p), 1);
    assert!(!a.in_free_pool(p));

    a.free(p);
    assert!(a.in_free_pool(p));
    assert_accounting(&a);
}

#[test]
fn duplicate_on_write_keeps_sole_owner_in_place() {
    let a = single_core(4);
    let p = a.allocate().unwrap();
    let free_before = a.free_pages();
    assert_eq!(a.duplicate_on_write(p), Ok(p));
    assert_eq!(a.refcount(p), 1);
    assert_eq!(a.free_pages(), free_before);
}

#[test]
fn duplicate_on_write_copies_shared_page() {
    let a = single_core(4);
    let p = a.allocate().unwrap();
    for (i, b) in bytes_mut(p).iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    a.reference(p);

    let copy = a.duplicate_on_write(p).unwrap();
    assert_ne!(copy, p);
    assert_eq!(bytes(copy), bytes(p));
    assert_eq!(a.refcount(p), 1);
    assert_eq!(a.refcount(copy), 1);

    // the copy is private
    bytes_mut(copy)[0] = 0xFF;
    assert_eq!(bytes(p)[0], 0);
    assert_accounting(&a);
}

#[test]
fn duplicate_on_write_reports_exhaustion_and_keeps_original() {
    let a = single_core(1);
    let p = a.allocate().unwrap();
    a.reference(p);
    assert_eq!(a.duplicate_on_write(p), Err(AllocError::OutOfMemory));
    assert_eq!(a.refcount(p), 2);
}

#[test]
#[should_panic(expected = "double free")]
fn double_free_is_fatal() {
    let a = single_core(2);
    let p = a.allocate().unwrap();
    a.free(p);
    a.free(p);
}

#[test]
#[should_panic(expected = "reference: page")]
fn referencing_a_free_page_is_fatal() {
    let a = single_core(2);
    let p = a.allocate().unwrap();
    a.free(p);
    a.reference(p);
}

#[test]
#[should_panic(expected = "duplicate_on_write: page")]
fn duplicating_a_free_page_is_fatal() {
    let a = single_core(2);
    let first = PhysicalPage::<Size4K>::containing(a.managed_range().start);
    let _ = a.duplicate_on_write(first);
}

#[test]
#[should_panic(expected = "unaligned")]
fn unaligned_free_is_fatal() {
    let a = single_core(2);
    let p = a.allocate().unwrap();
    a.free(p.base() + 8);
}

#[test]
#[should_panic(expected = "outside the managed range")]
fn foreign_free_is_fatal() {
    let a = single_core(2);
    a.free(a.managed_range().end);
}

#[test]
#[should_panic(expected = "outside the managed range")]
fn freeing_metadata_is_fatal() {
    let a = single_core(2);
    a.free(a.metadata_range().start);
}

#[test]
fn init_rejects_unusable_bounds() {
    let inverted = MemoryBounds::new(PhysicalAddress::new(0x9000), PhysicalAddress::new(0x1000));
    let r = unsafe { PageAllocator::<_, _, 1>::init(inverted, HhdmPhysMapper::identity(), SingleCpu) };
    assert!(matches!(r, Err(InitError::Inverted { .. })));

    // one page is not enough: the metadata needs room too
    let tiny = ram(PAGE_SIZE);
    let r = unsafe { PageAllocator::<_, _, 1>::init(tiny, HhdmPhysMapper::identity(), SingleCpu) };
    assert_eq!(
        r.err(),
        Some(InitError::TooSmall {
            bytes: PAGE_SIZE as u64
        })
    );
}

#[test]
fn unaligned_bounds_are_rounded_inwards() {
    let bounds = ram(6 * PAGE_SIZE);
    let skewed = MemoryBounds::new(bounds.start + 100, bounds.end);
    let a = unsafe { PageAllocator::<_, _, 1>::init(skewed, HhdmPhysMapper::identity(), SingleCpu) }
        .unwrap();
    // first page lost to alignment, second to metadata
    assert_eq!(a.total_pages(), 4);
    assert_eq!(a.managed_range().end, bounds.end);
}

#[test]
fn boot_places_everything_in_shard_zero() {
    on_cpu(0);
    let a = smp::<4>(12);
    assert_eq!(a.shard_len(0), 12);
    for cpu in 1..4 {
        assert_eq!(a.shard_len(cpu), 0);
    }
}

#[test]
fn empty_shard_steals_half_from_a_victim() {
    let a = smp::<4>(12);
    on_cpu(2);
    let p = a.allocate().unwrap();
    // six pages moved, one of them handed out
    assert_eq!(a.shard_len(0), 6);
    assert_eq!(a.shard_len(2), 5);
    assert_eq!(a.free_pages(), 11);

    // the next allocation is served locally
    let q = a.allocate().unwrap();
    assert_eq!(a.shard_len(0), 6);
    assert_eq!(a.shard_len(2), 4);
    assert_ne!(p, q);
    assert_accounting(&a);
    on_cpu(0);
}

#[test]
fn a_single_remaining_page_can_be_stolen() {
    let a = smp::<2>(1);
    on_cpu(1);
    let p = a.allocate().unwrap();
    assert_eq!(a.free_pages(), 0);
    assert_eq!(a.allocate(), Err(AllocError::OutOfMemory));

    // freed on cpu 1, so cpu 0 has to steal it back
    a.free(p);
    assert_eq!(a.shard_len(1), 1);
    on_cpu(0);
    assert_eq!(a.allocate(), Ok(p));
}

#[test]
fn pages_go_to_the_freeing_core() {
    let a = smp::<2>(4);
    on_cpu(0);
    let p = a.allocate().unwrap();
    on_cpu(1);
    a.free(p);
    assert_eq!(a.shard_len(0), 3);
    assert_eq!(a.shard_len(1), 1);
    on_cpu(0);
}

#[test]
#[should_panic(expected = "exceeds")]
fn unknown_cpu_id_is_fatal() {
    let a = smp::<2>(4);
    on_cpu(7);
    let _ = a.allocate();
}

#[test]
fn free_on_unknown_cpu_leaves_the_page_owned() {
    let a = smp::<2>(4);
    on_cpu(0);
    let p = a.allocate().unwrap();

    on_cpu(7);
    let res = catch_unwind(AssertUnwindSafe(|| a.free(p)));
    assert!(res.is_err());

    // the bad call changed nothing: still owned, in no pool
    on_cpu(0);
    assert_eq!(a.refcount(p), 1);
    assert!(!a.in_free_pool(p));
    assert_accounting(&a);
    a.free(p);
    assert_accounting(&a);
}

#[test]
fn concurrent_cores_conserve_pages() {
    const CPUS: usize = 4;
    const ROUNDS: usize = 2_000;

    let a = smp::<CPUS>(64);
    let start = Barrier::new(CPUS);

    thread::scope(|s| {
        for cpu in 0..CPUS {
            let a = &a;
            let start = &start;
            s.spawn(move || {
                on_cpu(cpu);
                start.wait();
                let mut held = Vec::new();
                for round in 0..ROUNDS {
                    match a.allocate() {
                        Ok(p) => {
                            // stamp the page; nobody else may see it
                            bytes_mut(p)[0] = cpu as u8;
                            held.push(p);
                        }
                        Err(AllocError::OutOfMemory) => {}
                    }
                    if round % 3 == 0 || held.len() > 8 {
                        if let Some(p) = held.pop() {
                            assert_eq!(bytes(p)[0], cpu as u8, "page shared between cores");
                            a.free(p);
                        }
                    }
                }
                for p in held {
                    a.free(p);
                }
            });
        }
    });

    assert_eq!(a.free_pages(), a.total_pages());
    assert_eq!(a.owned_pages(), 0);
    assert_accounting(&a);
}

#[test]
fn concurrent_sharing_and_copy_on_write() {
    const CPUS: usize = 4;

    let a = smp::<CPUS>(32);
    on_cpu(0);
    let shared = a.allocate().unwrap();
    bytes_mut(shared).fill(0x42);
    for _ in 1..CPUS {
        a.reference(shared);
    }
    let start = Barrier::new(CPUS);

    let copies: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..CPUS)
            .map(|cpu| {
                let a = &a;
                let start = &start;
                s.spawn(move || {
                    on_cpu(cpu);
                    start.wait();
                    let private = a.duplicate_on_write(shared).unwrap();
                    assert!(bytes(private).iter().all(|&b| b == 0x42));
                    private
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // exactly one holder may have kept the original in place
    let in_place = copies.iter().filter(|&&p| p == shared).count();
    assert!(in_place <= 1);
    for &p in &copies {
        assert_eq!(a.refcount(p), 1);
    }
    if in_place == 0 {
        assert!(a.in_free_pool(shared));
    }
    for p in copies {
        a.free(p);
    }
    assert_eq!(a.free_pages(), a.total_pages());
    assert_accounting(&a);
}
