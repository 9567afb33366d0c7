/*!
 * Resource Map Tests
 * First-fit placement, address ordering and head page lifetime
 */

use kma::core::limits::{MAP_PAGE_HEADER, SIMULATED_BASE_ADDRESS};
use kma::{
    AllocationStrategy, KmaConfig, KmaError, ResourceMapAllocator, SimulatedPageProvider,
};
use pretty_assertions::assert_eq;

const BASE: usize = SIMULATED_BASE_ADDRESS;

fn setup(config: KmaConfig) -> (ResourceMapAllocator, SimulatedPageProvider) {
    (
        ResourceMapAllocator::new(&config),
        SimulatedPageProvider::from_config(&config),
    )
}

#[test]
fn test_two_allocations_leave_one_free_block() {
    let (mut map, mut provider) = setup(KmaConfig::default());

    let a = map.allocate(&mut provider, 100).unwrap();
    let b = map.allocate(&mut provider, 200).unwrap();

    assert_eq!(a, BASE + MAP_PAGE_HEADER);
    assert_eq!(b, a + 104);
    assert_eq!(map.resident_pages(), 1);
    assert_eq!(map.head_page(), Some(BASE));
    assert_eq!(map.block_count(BASE), Some(2));
    assert_eq!(map.free_blocks(), vec![(b + 200, 8192 - (b + 200 - BASE))]);
    map.check_invariants().unwrap();

    map.release(&mut provider, a, 100).unwrap();
    assert_eq!(map.free_blocks().len(), 2);
    map.release(&mut provider, b, 200).unwrap();

    assert_eq!(map.resident_pages(), 0);
    assert_eq!(map.head_page(), None);
    assert!(map.free_blocks().is_empty());
    assert_eq!(provider.live_pages(), 0);
}

#[test]
fn test_granted_sizes() {
    assert_eq!(ResourceMapAllocator::granted_size(1), 32);
    assert_eq!(ResourceMapAllocator::granted_size(32), 32);
    assert_eq!(ResourceMapAllocator::granted_size(33), 40);
    assert_eq!(ResourceMapAllocator::granted_size(100), 104);
}

#[test]
fn test_first_fit_reuses_lowest_hole() {
    let (mut map, mut provider) = setup(KmaConfig::default());
    let a = map.allocate(&mut provider, 64).unwrap();
    let b = map.allocate(&mut provider, 64).unwrap();
    let c = map.allocate(&mut provider, 64).unwrap();

    map.release(&mut provider, a, 64).unwrap();
    map.release(&mut provider, b, 64).unwrap();

    // Uncoalesced holes: a 96-byte request skips both 64-byte blocks
    let d = map.allocate(&mut provider, 96).unwrap();
    assert!(d > c);
    let e = map.allocate(&mut provider, 40).unwrap();
    assert_eq!(e, a);

    let blocks = map.free_blocks();
    assert!(blocks.windows(2).all(|w| w[0].0 < w[1].0));
    map.check_invariants().unwrap();
}

#[test]
fn test_small_remainder_is_not_split() {
    let (mut map, mut provider) = setup(KmaConfig::default());
    let a = map.allocate(&mut provider, 64).unwrap();
    let _guard = map.allocate(&mut provider, 64).unwrap();
    map.release(&mut provider, a, 64).unwrap();

    // 64-byte hole, 40 granted, 24 left over: whole hole handed out
    let b = map.allocate(&mut provider, 40).unwrap();
    assert_eq!(b, a);
    assert_eq!(map.stats().granted_bytes, 128);
    map.check_invariants().unwrap();
    map.release(&mut provider, b, 40).unwrap();
    map.check_invariants().unwrap();
}

#[test]
fn test_head_page_released_last() {
    let (mut map, mut provider) = setup(KmaConfig::default());
    let big = map.max_allocation();

    let first = map.allocate(&mut provider, big).unwrap();
    let second = map.allocate(&mut provider, big).unwrap();
    let head = map.head_page().unwrap();
    assert_eq!(map.resident_pages(), 2);

    // Emptying the head keeps it resident while another page is in use
    map.release(&mut provider, first, big).unwrap();
    assert_eq!(map.resident_pages(), 2);
    assert_eq!(map.head_page(), Some(head));
    assert_eq!(map.block_count(head), Some(0));
    map.check_invariants().unwrap();

    map.release(&mut provider, second, big).unwrap();
    assert_eq!(map.resident_pages(), 0);
    assert_eq!(provider.live_pages(), 0);
}

#[test]
fn test_coalescing_merges_neighbours() {
    let (mut map, mut provider) = setup(KmaConfig::default().with_coalescing(true));
    let a = map.allocate(&mut provider, 64).unwrap();
    let b = map.allocate(&mut provider, 64).unwrap();
    let _c = map.allocate(&mut provider, 64).unwrap();

    map.release(&mut provider, a, 64).unwrap();
    map.release(&mut provider, b, 64).unwrap();
    assert_eq!(map.free_blocks()[0], (a, 128));

    // The merged hole now fits a request the split holes could not
    let d = map.allocate(&mut provider, 120).unwrap();
    assert_eq!(d, a);
    map.check_invariants().unwrap();
}

#[test]
fn test_bad_release_is_rejected() {
    let (mut map, mut provider) = setup(KmaConfig::default());
    let a = map.allocate(&mut provider, 100).unwrap();
    assert_eq!(
        map.release(&mut provider, a, 104),
        Err(KmaError::SizeMismatch {
            address: a,
            expected: 100,
            actual: 104
        })
    );
    assert_eq!(
        map.release(&mut provider, a + 104, 32),
        Err(KmaError::UnknownAddress(a + 104))
    );
    assert_eq!(map.allocate(&mut provider, 0), Err(KmaError::ZeroSize));
    map.check_invariants().unwrap();
}

#[test]
fn test_provider_limit_surfaces_exhaustion() {
    let (mut map, mut provider) = setup(KmaConfig::default().with_page_limit(1));
    let big = map.max_allocation();
    let kept = map.allocate(&mut provider, big).unwrap();
    assert!(matches!(
        map.allocate(&mut provider, 64),
        Err(KmaError::ProviderExhausted { .. })
    ));
    map.check_invariants().unwrap();
    map.release(&mut provider, kept, big).unwrap();
    assert_eq!(provider.live_pages(), 0);
}
