/*!
 * Property Tests
 * Random request sequences against every strategy
 */

use kma::{Kma, KmaConfig, StrategyKind};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    /// Release the live allocation at this index, modulo the live count
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => prop_oneof![1usize..=256, 1usize..=2048, 1usize..=8100].prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

fn configs() -> impl Strategy<Value = KmaConfig> {
    (
        prop_oneof![Just(4096usize), Just(8192), Just(16384)],
        prop_oneof![Just(32usize), Just(64)],
        any::<bool>(),
    )
        .prop_map(|(page, min, coalesce)| {
            KmaConfig::default()
                .with_page_size(page)
                .with_min_block_size(min)
                .with_coalescing(coalesce)
        })
}

fn assert_disjoint(live: &BTreeMap<usize, usize>) -> Result<(), TestCaseError> {
    let mut previous_end = 0;
    for (&address, &size) in live {
        prop_assert!(address >= previous_end, "0x{:x} overlaps previous block", address);
        previous_end = address + size;
    }
    Ok(())
}

fn run(kind: StrategyKind, config: &KmaConfig, ops: &[Op]) -> Result<(), TestCaseError> {
    let mut kma = Kma::simulated(kind, config).unwrap();
    let mut live: BTreeMap<usize, usize> = BTreeMap::new();

    for op in ops {
        match *op {
            Op::Alloc(size) => {
                if size > kma.max_allocation() {
                    prop_assert!(kma.allocate(size).is_err());
                    continue;
                }
                let address = kma.allocate(size).unwrap();
                prop_assert!(live.insert(address, size).is_none());
            }
            Op::Free(index) => {
                if live.is_empty() {
                    continue;
                }
                let (&address, &size) = live.iter().nth(index % live.len()).unwrap();
                kma.release(address, size).unwrap();
                live.remove(&address);
            }
        }

        assert_disjoint(&live)?;
        prop_assert_eq!(kma.check_invariants(), Ok(()));

        let stats = kma.stats();
        prop_assert_eq!(stats.live_allocations, live.len());
        prop_assert_eq!(stats.requested_bytes, live.values().sum::<usize>());
        prop_assert_eq!(
            stats.free_bytes + stats.granted_bytes + stats.overhead_bytes,
            stats.page_bytes
        );
        prop_assert_eq!(stats.page_bytes, kma.provider().live_pages() * config.page_size);
    }

    for (address, size) in live {
        kma.release(address, size).unwrap();
    }
    prop_assert_eq!(kma.check_invariants(), Ok(()));
    prop_assert_eq!(kma.provider().live_pages(), 0);
    let provider = kma.provider().stats();
    prop_assert_eq!(provider.acquired, provider.released);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_buddy_properties(config in configs(), ops in prop::collection::vec(op(), 1..200)) {
        run(StrategyKind::Buddy, &config, &ops)?;
    }

    #[test]
    fn test_free_list_properties(config in configs(), ops in prop::collection::vec(op(), 1..200)) {
        run(StrategyKind::FreeList, &config, &ops)?;
    }

    #[test]
    fn test_resource_map_properties(config in configs(), ops in prop::collection::vec(op(), 1..200)) {
        run(StrategyKind::ResourceMap, &config, &ops)?;
    }
}
