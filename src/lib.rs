/*!
 * KMA Library
 * Page-backed heap allocator with pluggable allocation strategies
 */

pub mod core;
pub mod memory;
pub mod monitoring;
pub mod page;
pub mod replay;

// Re-exports
pub use crate::core::{Address, KmaConfig, KmaError, KmaResult, PageId, Size};
pub use memory::{
    AllocationStrategy, AllocatorStats, BuddyAllocator, FreeListAllocator, Kma,
    ResourceMapAllocator, StrategyKind, UsageTracking,
};
pub use monitoring::init_tracing;
pub use page::{Page, PageProvider, ProviderStats, SimulatedPageProvider};
pub use replay::{replay, ReplayOptions, ReplayReport, Trace, TraceOp};
