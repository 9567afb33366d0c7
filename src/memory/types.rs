/*!
 * Memory Types
 * Common types shared by the allocation strategies
 */

use super::buddy::BuddyAllocator;
use super::free_list::FreeListAllocator;
use super::resource_map::ResourceMapAllocator;
use super::traits::AllocationStrategy;
use crate::core::{Address, KmaConfig, KmaError, KmaResult, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Available allocation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Buddy,
    FreeList,
    ResourceMap,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Buddy,
        StrategyKind::FreeList,
        StrategyKind::ResourceMap,
    ];

    /// Build a fresh, empty strategy for `config`
    pub fn build(self, config: &KmaConfig) -> Box<dyn AllocationStrategy> {
        match self {
            StrategyKind::Buddy => Box::new(BuddyAllocator::new(config)),
            StrategyKind::FreeList => Box::new(FreeListAllocator::new(config)),
            StrategyKind::ResourceMap => Box::new(ResourceMapAllocator::new(config)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Buddy => "buddy",
            StrategyKind::FreeList => "free-list",
            StrategyKind::ResourceMap => "resource-map",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = KmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buddy" | "bud" => Ok(StrategyKind::Buddy),
            "free-list" | "freelist" | "p2fl" => Ok(StrategyKind::FreeList),
            "resource-map" | "resourcemap" | "rm" => Ok(StrategyKind::ResourceMap),
            other => Err(KmaError::InvalidConfig(format!(
                "unknown strategy '{}' (expected buddy, free-list or resource-map)",
                other
            ))),
        }
    }
}

/// Point-in-time accounting of a strategy
///
/// `free_bytes + granted_bytes + overhead_bytes == page_bytes` holds for
/// every strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorStats {
    pub strategy: StrategyKind,
    pub pages_in_use: usize,
    pub page_bytes: Size,
    pub live_allocations: usize,
    /// Bytes clients asked for
    pub requested_bytes: Size,
    /// Bytes actually reserved for clients, including rounding
    pub granted_bytes: Size,
    /// Bytes available to future requests
    pub free_bytes: Size,
    /// Headers and bookkeeping pages
    pub overhead_bytes: Size,
}

impl AllocatorStats {
    pub fn empty(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            pages_in_use: 0,
            page_bytes: 0,
            live_allocations: 0,
            requested_bytes: 0,
            granted_bytes: 0,
            free_bytes: 0,
            overhead_bytes: 0,
        }
    }

    /// Fraction of held page bytes that clients asked for
    pub fn utilization(&self) -> f64 {
        if self.page_bytes == 0 {
            return 0.0;
        }
        self.requested_bytes as f64 / self.page_bytes as f64
    }

    /// Bytes held from the provider but not requested by any client
    pub fn wasted_bytes(&self) -> Size {
        self.page_bytes - self.requested_bytes
    }
}

/// One live allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub requested: Size,
    pub granted: Size,
}

/// Live allocations of one page, keyed by client address
///
/// Release goes through [`LiveTable::check`] before any state changes, so a
/// bad release leaves the allocator untouched.
#[derive(Debug, Default, Clone)]
pub struct LiveTable {
    entries: BTreeMap<Address, Allocation>,
}

impl LiveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, allocation: Allocation) {
        self.entries.insert(address, allocation);
    }

    /// Verify that `address` is live and was allocated with `size`
    pub fn check(&self, address: Address, size: Size) -> KmaResult<Allocation> {
        match self.entries.get(&address) {
            None => Err(KmaError::UnknownAddress(address)),
            Some(a) if a.requested != size => Err(KmaError::SizeMismatch {
                address,
                expected: a.requested,
                actual: size,
            }),
            Some(a) => Ok(*a),
        }
    }

    pub fn remove(&mut self, address: Address) -> Option<Allocation> {
        self.entries.remove(&address)
    }

    pub fn get(&self, address: Address) -> Option<&Allocation> {
        self.entries.get(&address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Address, Allocation)> + '_ {
        self.entries.iter().map(|(a, alloc)| (*a, *alloc))
    }

    pub fn requested_bytes(&self) -> Size {
        self.entries.values().map(|a| a.requested).sum()
    }

    pub fn granted_bytes(&self) -> Size {
        self.entries.values().map(|a| a.granted).sum()
    }
}

/// Base address of the page in `pages` whose range holds `address`
pub(crate) fn owning_page<T>(
    pages: &BTreeMap<Address, T>,
    address: Address,
    page_size: Size,
) -> Option<Address> {
    pages
        .range(..=address)
        .next_back()
        .map(|(base, _)| *base)
        .filter(|base| address < base + page_size)
}

/// Reject empty and oversized requests
pub(crate) fn check_request(size: Size, max: Size) -> KmaResult<()> {
    if size == 0 {
        return Err(KmaError::ZeroSize);
    }
    if size > max {
        return Err(KmaError::RequestTooLarge {
            requested: size,
            max,
        });
    }
    Ok(())
}
