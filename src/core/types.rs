/*!
 * Core Types
 * Common types used across the allocator
 */

/// Address type for memory operations
pub type Address = usize;

/// Size type for memory operations
pub type Size = usize;

/// Provider-assigned page identifier
pub type PageId = u64;

/// Machine word, the unit of in-page link fields
pub const WORD: Size = std::mem::size_of::<usize>();
