/*!
 * Memory Module
 *
 * Three interchangeable allocation strategies behind [`AllocationStrategy`]:
 *
 * - **Buddy**: per-page implicit tree of longest-free-run counters,
 *   power-of-two blocks, dedicated pages for oversized requests
 * - **Free list**: segregated power-of-two size classes, pages cut into
 *   equal buffers
 * - **Resource map**: one address-ordered free list, first-fit
 *
 * [`Kma`] selects one of them at construction time.
 */

pub mod buddy;
pub mod free_list;
pub mod manager;
pub mod resource_map;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use buddy::BuddyAllocator;
pub use free_list::FreeListAllocator;
pub use manager::{Kma, UsageTracking};
pub use resource_map::ResourceMapAllocator;
pub use traits::AllocationStrategy;
pub use types::{Allocation, AllocatorStats, LiveTable, StrategyKind};
