/*!
 * Segregated Free List Tests
 * Class selection, page reuse and full reset once idle
 */

use kma::{
    AllocationStrategy, FreeListAllocator, KmaConfig, KmaError, SimulatedPageProvider,
};
use pretty_assertions::assert_eq;

fn setup() -> (FreeListAllocator, SimulatedPageProvider) {
    let config = KmaConfig::default();
    (
        FreeListAllocator::new(&config),
        SimulatedPageProvider::from_config(&config),
    )
}

#[test]
fn test_small_requests_pick_smallest_class() {
    let (mut allocator, mut provider) = setup();
    assert!(!allocator.is_initialized());

    let a = allocator.allocate(&mut provider, 10).unwrap();
    let b = allocator.allocate(&mut provider, 40).unwrap();

    assert_eq!(allocator.size_class_of(a), Some(32));
    assert_eq!(allocator.size_class_of(b), Some(64));
    assert!(allocator.is_initialized());
    assert_eq!(allocator.pages_in_use(), 2);
    // Bookkeeping page plus one page per class
    assert_eq!(provider.live_pages(), 3);
    assert_eq!(allocator.free_buffers(32), 8192 / 32 - 1);
    assert_eq!(allocator.free_buffers(64), 8192 / 64 - 1);
    allocator.check_invariants().unwrap();

    allocator.release(&mut provider, a, 10).unwrap();
    assert_eq!(allocator.pages_in_use(), 1);
    allocator.release(&mut provider, b, 40).unwrap();

    assert!(!allocator.is_initialized());
    assert_eq!(allocator.pages_in_use(), 0);
    assert_eq!(provider.live_pages(), 0);
    let stats = provider.stats();
    assert_eq!(stats.acquired, stats.released);
    allocator.check_invariants().unwrap();
}

#[test]
fn test_header_pushes_to_next_class() {
    let (mut allocator, mut provider) = setup();
    let exact = allocator.allocate(&mut provider, 24).unwrap();
    let over = allocator.allocate(&mut provider, 25).unwrap();
    assert_eq!(allocator.size_class_of(exact), Some(32));
    assert_eq!(allocator.size_class_of(over), Some(64));

    let whole = allocator.allocate(&mut provider, 8192 - 8).unwrap();
    assert_eq!(allocator.size_class_of(whole), Some(8192));
    assert_eq!(allocator.free_buffers(8192), 0);

    assert_eq!(
        allocator.allocate(&mut provider, 8192 - 7),
        Err(KmaError::RequestTooLarge {
            requested: 8192 - 7,
            max: 8192 - 8
        })
    );
}

#[test]
fn test_freed_buffer_is_reused_first() {
    let (mut allocator, mut provider) = setup();
    let a = allocator.allocate(&mut provider, 100).unwrap();
    let b = allocator.allocate(&mut provider, 100).unwrap();
    assert_eq!(b - a, 128);

    allocator.release(&mut provider, a, 100).unwrap();
    let c = allocator.allocate(&mut provider, 120).unwrap();
    assert_eq!(c, a);
    assert_eq!(provider.stats().acquired, 2);
}

#[test]
fn test_filling_a_class_takes_another_page() {
    let (mut allocator, mut provider) = setup();
    let per_page = 8192 / 1024;
    let addresses: Vec<_> = (0..=per_page)
        .map(|_| allocator.allocate(&mut provider, 1000).unwrap())
        .collect();

    assert_eq!(allocator.pages_in_use(), 2);
    allocator.check_invariants().unwrap();

    // Emptying the second page returns it while the first stays full
    allocator
        .release(&mut provider, addresses[per_page], 1000)
        .unwrap();
    assert_eq!(allocator.pages_in_use(), 1);
    assert_eq!(allocator.free_buffers(1024), 0);

    for address in &addresses[..per_page] {
        allocator.release(&mut provider, *address, 1000).unwrap();
    }
    assert!(!allocator.is_initialized());
    assert_eq!(provider.live_pages(), 0);
}

#[test]
fn test_rejects_foreign_and_mismatched_releases() {
    let (mut allocator, mut provider) = setup();
    let a = allocator.allocate(&mut provider, 50).unwrap();

    assert_eq!(
        allocator.release(&mut provider, a, 49),
        Err(KmaError::SizeMismatch {
            address: a,
            expected: 50,
            actual: 49
        })
    );
    assert_eq!(
        allocator.release(&mut provider, a + 64, 50),
        Err(KmaError::UnknownAddress(a + 64))
    );
    assert_eq!(allocator.allocation_size(a), Some(50));
    allocator.check_invariants().unwrap();
}

#[test]
fn test_stats_balance() {
    let (mut allocator, mut provider) = setup();
    for size in [1, 100, 1000, 4000] {
        allocator.allocate(&mut provider, size).unwrap();
    }

    let stats = allocator.stats();
    assert_eq!(stats.pages_in_use, 5);
    assert_eq!(stats.requested_bytes, 5101);
    assert_eq!(
        stats.free_bytes + stats.granted_bytes + stats.overhead_bytes,
        stats.page_bytes
    );
}
