/*!
 * Core Module
 * Fundamental allocator types, configuration and error handling
 */

pub mod bits;
pub mod config;
pub mod errors;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use config::KmaConfig;
pub use errors::*;
pub use types::*;
