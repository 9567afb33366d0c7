/*!
 * Page Module
 *
 * The page abstraction every strategy is built on. A provider hands out
 * fixed-size pages and takes them back; allocators never touch anything
 * outside the byte ranges of pages they currently own.
 */

mod simulated;

pub use simulated::{ProviderStats, SimulatedPageProvider};

use crate::core::{Address, KmaResult, PageId, Size};

/// A fixed-size page obtained from a provider
///
/// Deliberately not `Clone`: whoever holds the value owns the page, and
/// handing it back to the provider consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Page {
    id: PageId,
    base: Address,
    size: Size,
}

impl Page {
    pub fn new(id: PageId, base: Address, size: Size) -> Self {
        Self { id, base, size }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// One past the last byte of the page
    pub fn end(&self) -> Address {
        self.base + self.size
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.base && address < self.end()
    }
}

/// Source of pages for an allocator
#[cfg_attr(test, mockall::automock)]
pub trait PageProvider {
    /// Size of every page this provider hands out
    fn page_size(&self) -> Size;

    /// Acquire a fresh page
    fn acquire_page(&mut self) -> KmaResult<Page>;

    /// Return a page; must be called exactly once per acquired page
    fn release_page(&mut self, page: Page) -> KmaResult<()>;
}
