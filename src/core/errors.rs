/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{Address, PageId, Size};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Allocator operation result
pub type KmaResult<T> = Result<T, KmaError>;

/// Allocator errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum KmaError {
    #[error("Zero-sized allocation requested")]
    #[diagnostic(
        code(kma::zero_size),
        help("Every allocation must request at least one byte.")
    )]
    ZeroSize,

    #[error("Request of {requested} bytes exceeds the {max} byte limit of this strategy")]
    #[diagnostic(
        code(kma::request_too_large),
        help("Split the request or pick a strategy with a larger single-allocation capacity.")
    )]
    RequestTooLarge { requested: Size, max: Size },

    #[error("Page provider exhausted with {live_pages} pages live")]
    #[diagnostic(
        code(kma::provider_exhausted),
        help("Release memory or raise the provider page limit.")
    )]
    ProviderExhausted { live_pages: usize },

    #[error("Address 0x{0:x} is not a live allocation")]
    #[diagnostic(
        code(kma::unknown_address),
        help("Only addresses returned by allocate may be released, and only once.")
    )]
    UnknownAddress(Address),

    #[error("Release of 0x{address:x} with size {actual}, allocated with size {expected}")]
    #[diagnostic(
        code(kma::size_mismatch),
        help("Pass release the same size that was given to allocate.")
    )]
    SizeMismatch {
        address: Address,
        expected: Size,
        actual: Size,
    },

    #[error("Page {0} is not owned by the caller")]
    #[diagnostic(
        code(kma::page_not_owned),
        help("A page may be released exactly once, to the provider that issued it.")
    )]
    PageNotOwned(PageId),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(kma::invalid_config))]
    InvalidConfig(String),

    #[error("Allocator state corrupted: {0}")]
    #[diagnostic(
        code(kma::corruption),
        help("An internal invariant was violated. This is a bug in the allocator.")
    )]
    Corruption(String),

    #[error("Trace line {line}: {reason}")]
    #[diagnostic(code(kma::trace))]
    Trace { line: usize, reason: String },
}

impl KmaError {
    /// Precondition violations are caller bugs; everything else is allocator or provider state
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            KmaError::ZeroSize
                | KmaError::RequestTooLarge { .. }
                | KmaError::UnknownAddress(_)
                | KmaError::SizeMismatch { .. }
        )
    }
}
