/*!
 * Memory Traits
 * The contract every allocation strategy implements
 */

use super::types::{AllocatorStats, StrategyKind};
use crate::core::{Address, KmaResult, Size};
use crate::page::PageProvider;
use std::fmt::Debug;

/// Allocation strategy interface
///
/// A strategy owns the pages it has acquired and all bookkeeping for them.
/// The provider is passed in on every call so one strategy value never
/// outlives or aliases the provider it draws from.
pub trait AllocationStrategy: Debug + Send {
    fn kind(&self) -> StrategyKind;

    /// Largest request this strategy can serve
    fn max_allocation(&self) -> Size;

    /// Allocate `size` bytes, acquiring pages from `provider` as needed
    fn allocate(&mut self, provider: &mut dyn PageProvider, size: Size) -> KmaResult<Address>;

    /// Release an allocation; `size` must equal the size it was allocated with
    fn release(
        &mut self,
        provider: &mut dyn PageProvider,
        address: Address,
        size: Size,
    ) -> KmaResult<()>;

    /// Requested size of a live allocation
    fn allocation_size(&self, address: Address) -> Option<Size>;

    fn stats(&self) -> AllocatorStats;

    /// Recompute internal structures from scratch and compare with the live state
    fn check_invariants(&self) -> KmaResult<()>;
}
