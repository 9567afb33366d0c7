/*!
 * Buddy Allocator Tests
 * Page chain behavior and the buddy counter invariant
 */

use kma::{
    AllocationStrategy, BuddyAllocator, KmaConfig, KmaError, PageProvider, SimulatedPageProvider,
};
use pretty_assertions::assert_eq;

fn setup(min_block: usize) -> (BuddyAllocator, SimulatedPageProvider) {
    let config = KmaConfig::default().with_min_block_size(min_block);
    (
        BuddyAllocator::new(&config),
        SimulatedPageProvider::from_config(&config),
    )
}

#[test]
fn test_three_small_allocations_share_one_page() {
    let (mut buddy, mut provider) = setup(64);
    assert_eq!(buddy.header_size(), 520);

    let a = buddy.allocate(&mut provider, 100).unwrap();
    let b = buddy.allocate(&mut provider, 100).unwrap();
    let c = buddy.allocate(&mut provider, 100).unwrap();

    assert_eq!(provider.stats().acquired, 1);
    assert_eq!(buddy.resident_pages(), 1);
    assert!(a < b && b < c);
    assert!(b - a >= 100 && c - b >= 100);
    buddy.check_invariants().unwrap();

    buddy.release(&mut provider, b, 100).unwrap();
    buddy.release(&mut provider, a, 100).unwrap();
    buddy.check_invariants().unwrap();
    assert_eq!(buddy.resident_pages(), 1);

    buddy.release(&mut provider, c, 100).unwrap();
    assert_eq!(buddy.resident_pages(), 0);

    let stats = provider.stats();
    assert_eq!(stats.acquired, stats.released);
    assert_eq!(provider.live_pages(), 0);
}

#[test]
fn test_full_page_spills_to_new_page() {
    let (mut buddy, mut provider) = setup(32);
    let capacity = buddy.page_capacity();

    let whole = buddy.allocate(&mut provider, capacity).unwrap();
    assert!(!buddy.is_large_allocation(whole));
    let small = buddy.allocate(&mut provider, 64).unwrap();

    assert_eq!(buddy.resident_pages(), 2);
    assert_eq!(buddy.root_counters()[0], 0);
    buddy.check_invariants().unwrap();

    buddy.release(&mut provider, whole, capacity).unwrap();
    buddy.release(&mut provider, small, 64).unwrap();
    assert_eq!(provider.live_pages(), 0);
}

#[test]
fn test_large_allocation_gets_dedicated_page() {
    let (mut buddy, mut provider) = setup(32);
    let size = buddy.page_capacity() + 1;

    let address = buddy.allocate(&mut provider, size).unwrap();
    assert!(buddy.is_large_allocation(address));
    assert_eq!(buddy.allocation_size(address), Some(size));
    assert!(buddy.root_counters().is_empty());

    let max = buddy.max_allocation();
    assert_eq!(
        buddy.allocate(&mut provider, max + 1),
        Err(KmaError::RequestTooLarge {
            requested: max + 1,
            max
        })
    );

    buddy.release(&mut provider, address, size).unwrap();
    assert_eq!(provider.live_pages(), 0);
}

#[test]
fn test_bad_release_changes_nothing() {
    let (mut buddy, mut provider) = setup(32);
    let a = buddy.allocate(&mut provider, 200).unwrap();
    let before = buddy.stats();

    assert_eq!(
        buddy.release(&mut provider, a, 201),
        Err(KmaError::SizeMismatch {
            address: a,
            expected: 200,
            actual: 201
        })
    );
    assert_eq!(
        buddy.release(&mut provider, a + 8, 200),
        Err(KmaError::UnknownAddress(a + 8))
    );
    assert_eq!(
        buddy.release(&mut provider, 0x42, 200),
        Err(KmaError::UnknownAddress(0x42))
    );
    assert_eq!(buddy.stats(), before);
    buddy.check_invariants().unwrap();

    buddy.release(&mut provider, a, 200).unwrap();
    assert_eq!(
        buddy.release(&mut provider, a, 200),
        Err(KmaError::UnknownAddress(a))
    );
}

#[test]
fn test_stats_balance() {
    let (mut buddy, mut provider) = setup(32);
    let sizes = [1, 31, 32, 100, 500, 1000, 3000];
    let addresses: Vec<_> = sizes
        .iter()
        .map(|&s| buddy.allocate(&mut provider, s).unwrap())
        .collect();

    let stats = buddy.stats();
    assert_eq!(stats.live_allocations, sizes.len());
    assert_eq!(stats.requested_bytes, sizes.iter().sum::<usize>());
    assert!(stats.granted_bytes >= stats.requested_bytes);
    assert_eq!(
        stats.free_bytes + stats.granted_bytes + stats.overhead_bytes,
        stats.page_bytes
    );
    assert_eq!(stats.page_bytes, provider.live_pages() * provider.page_size());

    for (address, size) in addresses.into_iter().zip(sizes) {
        buddy.release(&mut provider, address, size).unwrap();
    }
    assert_eq!(provider.live_pages(), 0);
}
