/*!
 * Buddy Allocator
 *
 * Each page carries a [`BuddyTree`] of longest-free-run counters. Requests
 * round up to a power of two and descend the tree of the first page whose
 * root can hold them. Requests too big for a page's tree get a dedicated
 * "large" page of their own.
 *
 * Pages form a chain in acquisition order. A page goes back to the provider
 * as soon as its root shows the whole capacity free again.
 */

mod tree;

pub use tree::{BuddyTree, Placement};

use super::traits::AllocationStrategy;
use super::types::{check_request, Allocation, AllocatorStats, LiveTable, StrategyKind};
use crate::core::limits::LARGE_PAGE_HEADER;
use crate::core::{Address, KmaConfig, KmaError, KmaResult, Size};
use crate::page::{Page, PageProvider};
use tracing::{debug, trace};

#[derive(Debug)]
enum PageLayout {
    Blocks(BuddyTree),
    /// One allocation spanning the page past a small header
    Large,
}

#[derive(Debug)]
struct BuddyPage {
    page: Page,
    layout: PageLayout,
    live: LiveTable,
}

impl BuddyPage {
    fn is_large(&self) -> bool {
        matches!(self.layout, PageLayout::Large)
    }

    fn header_bytes(&self, header: Size) -> Size {
        match self.layout {
            PageLayout::Blocks(_) => header,
            PageLayout::Large => LARGE_PAGE_HEADER,
        }
    }
}

/// Buddy-system allocator
#[derive(Debug)]
pub struct BuddyAllocator {
    chain: Vec<BuddyPage>,
    page_size: Size,
    min_block: Size,
    header: Size,
}

impl BuddyAllocator {
    pub fn new(config: &KmaConfig) -> Self {
        Self {
            chain: Vec::new(),
            page_size: config.page_size,
            min_block: config.min_block_size,
            header: config.buddy_header_size(),
        }
    }

    /// Bytes of a fresh page available to blocks
    pub fn page_capacity(&self) -> Size {
        self.page_size - self.header
    }

    pub fn header_size(&self) -> Size {
        self.header
    }

    /// Pages in the chain, in acquisition order
    pub fn resident_pages(&self) -> usize {
        self.chain.len()
    }

    /// Root counter of every block page, in chain order; large pages are skipped
    pub fn root_counters(&self) -> Vec<Size> {
        self.chain
            .iter()
            .filter_map(|p| match &p.layout {
                PageLayout::Blocks(tree) => Some(tree.root()),
                PageLayout::Large => None,
            })
            .collect()
    }

    pub fn is_large_allocation(&self, address: Address) -> bool {
        self.find_page(address)
            .is_some_and(|i| self.chain[i].is_large())
    }

    fn find_page(&self, address: Address) -> Option<usize> {
        self.chain.iter().position(|p| p.page.contains(address))
    }

    fn allocate_large(&mut self, provider: &mut dyn PageProvider, size: Size) -> KmaResult<Address> {
        let page = provider.acquire_page()?;
        let address = page.base() + LARGE_PAGE_HEADER;
        let mut live = LiveTable::new();
        live.insert(
            address,
            Allocation {
                requested: size,
                granted: self.page_size - LARGE_PAGE_HEADER,
            },
        );
        debug!(page = page.id(), size, "large allocation on dedicated page");
        self.chain.push(BuddyPage {
            page,
            layout: PageLayout::Large,
            live,
        });
        Ok(address)
    }

    /// Place `size` in the first block page whose root can hold it
    fn place(&mut self, size: Size) -> KmaResult<Option<(usize, Placement)>> {
        for (i, entry) in self.chain.iter_mut().enumerate() {
            if let PageLayout::Blocks(tree) = &mut entry.layout {
                if let Some(placement) = tree.allocate(size)? {
                    return Ok(Some((i, placement)));
                }
            }
        }
        Ok(None)
    }

    fn release_page(&mut self, provider: &mut dyn PageProvider, index: usize) -> KmaResult<()> {
        let entry = self.chain.remove(index);
        debug!(page = entry.page.id(), "buddy page empty, returning to provider");
        provider.release_page(entry.page)
    }
}

impl AllocationStrategy for BuddyAllocator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Buddy
    }

    fn max_allocation(&self) -> Size {
        self.page_size - LARGE_PAGE_HEADER
    }

    fn allocate(&mut self, provider: &mut dyn PageProvider, size: Size) -> KmaResult<Address> {
        check_request(size, self.max_allocation())?;
        if size > self.page_capacity() {
            return self.allocate_large(provider, size);
        }

        let (index, placement) = match self.place(size)? {
            Some(found) => found,
            None => {
                let page = provider.acquire_page()?;
                let mut tree = BuddyTree::new(self.page_size, self.min_block, self.header);
                let placement = tree.allocate(size)?.ok_or_else(|| {
                    KmaError::Corruption(format!("fresh buddy page cannot hold {} bytes", size))
                })?;
                debug!(page = page.id(), "buddy page added to chain");
                self.chain.push(BuddyPage {
                    page,
                    layout: PageLayout::Blocks(tree),
                    live: LiveTable::new(),
                });
                (self.chain.len() - 1, placement)
            }
        };

        let entry = &mut self.chain[index];
        let address = entry.page.base() + placement.offset;
        entry.live.insert(
            address,
            Allocation {
                requested: size,
                granted: placement.granted,
            },
        );
        trace!(
            size,
            granted = placement.granted,
            address = format_args!("0x{:x}", address),
            "buddy allocate"
        );
        Ok(address)
    }

    fn release(
        &mut self,
        provider: &mut dyn PageProvider,
        address: Address,
        size: Size,
    ) -> KmaResult<()> {
        let index = self
            .find_page(address)
            .ok_or(KmaError::UnknownAddress(address))?;
        let entry = &mut self.chain[index];
        entry.live.check(address, size)?;

        let emptied = match &mut entry.layout {
            PageLayout::Large => true,
            PageLayout::Blocks(tree) => {
                let offset = address - entry.page.base();
                let block = tree.block_size_for(size);
                tree.release(offset, block)?;
                tree.is_empty()
            }
        };
        entry.live.remove(address);
        trace!(size, address = format_args!("0x{:x}", address), "buddy release");

        if emptied {
            self.release_page(provider, index)?;
        }
        Ok(())
    }

    fn allocation_size(&self, address: Address) -> Option<Size> {
        let index = self.find_page(address)?;
        self.chain[index].live.get(address).map(|a| a.requested)
    }

    fn stats(&self) -> AllocatorStats {
        let mut stats = AllocatorStats::empty(StrategyKind::Buddy);
        for entry in &self.chain {
            let header = entry.header_bytes(self.header);
            let granted = entry.live.granted_bytes();
            stats.pages_in_use += 1;
            stats.page_bytes += self.page_size;
            stats.live_allocations += entry.live.len();
            stats.requested_bytes += entry.live.requested_bytes();
            stats.granted_bytes += granted;
            stats.overhead_bytes += header;
            stats.free_bytes += self.page_size - header - granted;
        }
        stats
    }

    fn check_invariants(&self) -> KmaResult<()> {
        for entry in &self.chain {
            let id = entry.page.id();
            match &entry.layout {
                PageLayout::Large => {
                    if entry.live.len() != 1 {
                        return Err(KmaError::Corruption(format!(
                            "large page {} holds {} allocations",
                            id,
                            entry.live.len()
                        )));
                    }
                }
                PageLayout::Blocks(tree) => {
                    let blocks = entry
                        .live
                        .iter()
                        .map(|(address, a)| (address - entry.page.base(), tree.block_size_for(a.requested)));
                    if tree.counters() != tree.expected(blocks).as_slice() {
                        return Err(KmaError::Corruption(format!(
                            "buddy counters of page {} disagree with its live blocks",
                            id
                        )));
                    }
                    if tree.is_empty() != entry.live.is_empty() {
                        return Err(KmaError::Corruption(format!(
                            "page {} root {} of {} with {} live blocks",
                            id,
                            tree.root(),
                            tree.capacity(),
                            entry.live.len()
                        )));
                    }
                    if entry.live.is_empty() {
                        return Err(KmaError::Corruption(format!(
                            "empty page {} was not returned to the provider",
                            id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
