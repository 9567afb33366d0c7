/*!
 * Allocator Limits and Constants
 *
 * Centralized location for page geometry and per-strategy header sizes.
 * Header sizes model the bytes each strategy reserves inside a page, so
 * capacity accounting matches an allocator that keeps its metadata in-page.
 */

use super::types::{Size, WORD};

// =============================================================================
// PAGE GEOMETRY
// =============================================================================

/// Default page size handed out by the provider (8KB)
pub const DEFAULT_PAGE_SIZE: Size = 8 * 1024;

/// Default smallest block any strategy carves (32 bytes)
pub const DEFAULT_MIN_BLOCK_SIZE: Size = 32;

/// Largest supported page size; buddy counters are 16-bit
pub const MAX_PAGE_SIZE: Size = 64 * 1024;

/// A page must hold at least this many minimum blocks
pub const MIN_BLOCKS_PER_PAGE: Size = 4;

// =============================================================================
// BUDDY
// =============================================================================

/// Bytes of a buddy page header before the counter array (chain link + large flag, padded)
pub const BUDDY_HEADER_PREFIX: Size = WORD + 2;

/// Bytes reserved at the start of a page dedicated to one large allocation
pub const LARGE_PAGE_HEADER: Size = 2 * WORD;

// =============================================================================
// SEGREGATED FREE LIST
// =============================================================================

/// Per-buffer header: one link word, back-reference to the class while allocated
pub const BUFFER_HEADER_SIZE: Size = WORD;

// =============================================================================
// RESOURCE MAP
// =============================================================================

/// Resource map page header (self, chain link, first free, page count, block count)
pub const MAP_PAGE_HEADER: Size = 4 * WORD;

/// Free block node (next, prev, page, size); also the minimum split remainder
pub const FREE_NODE_SIZE: Size = 4 * WORD;

// =============================================================================
// SIMULATED PROVIDER
// =============================================================================

/// First base address handed out by the simulated provider
pub const SIMULATED_BASE_ADDRESS: usize = 0x1000_0000;

/// Distance between consecutive simulated pages, in pages
/// Keeps pages non-contiguous so no strategy can rely on adjacency
pub const SIMULATED_PAGE_STRIDE: Size = 2;
