/*!
 * Resource Map Allocator
 *
 * One address-ordered list of free blocks spanning every page, searched
 * first-fit. Each page counts the allocations it hosts; a page whose count
 * drops to zero has its free blocks unlinked and goes back to the provider.
 * The first page acquired is the head and holds the chain, so it is only
 * released after every other page.
 *
 * Freed blocks are reinserted in address order without merging unless
 * `coalesce_free_blocks` is set.
 */

use super::traits::AllocationStrategy;
use super::types::{
    check_request, owning_page, Allocation, AllocatorStats, LiveTable, StrategyKind,
};
use crate::core::bits::align_up;
use crate::core::limits::{FREE_NODE_SIZE, MAP_PAGE_HEADER};
use crate::core::{Address, KmaConfig, KmaError, KmaResult, Size, WORD};
use crate::page::{Page, PageProvider};
use std::collections::BTreeMap;
use tracing::{debug, trace};

#[derive(Debug)]
struct MapPage {
    page: Page,
    block_count: usize,
    live: LiveTable,
}

/// Address-ordered first-fit allocator
#[derive(Debug)]
pub struct ResourceMapAllocator {
    page_size: Size,
    coalesce: bool,
    pages: BTreeMap<Address, MapPage>,
    head: Option<Address>,
    /// Free blocks: address -> size
    free: BTreeMap<Address, Size>,
}

impl ResourceMapAllocator {
    pub fn new(config: &KmaConfig) -> Self {
        Self {
            page_size: config.page_size,
            coalesce: config.coalesce_free_blocks,
            pages: BTreeMap::new(),
            head: None,
            free: BTreeMap::new(),
        }
    }

    /// Bytes actually reserved for a request of `size`
    pub fn granted_size(size: Size) -> Size {
        align_up(size.max(FREE_NODE_SIZE), WORD)
    }

    /// Free blocks as `(address, size)`, in address order
    pub fn free_blocks(&self) -> Vec<(Address, Size)> {
        self.free.iter().map(|(a, s)| (*a, *s)).collect()
    }

    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    /// Base of the bookkeeping page, if any
    pub fn head_page(&self) -> Option<Address> {
        self.head
    }

    /// Live allocations hosted by the page at `base`
    pub fn block_count(&self, base: Address) -> Option<usize> {
        self.pages.get(&base).map(|p| p.block_count)
    }

    fn first_fit(&self, granted: Size) -> Option<(Address, Size)> {
        self.free
            .iter()
            .find(|(_, size)| **size >= granted)
            .map(|(a, s)| (*a, *s))
    }

    fn add_page(&mut self, provider: &mut dyn PageProvider) -> KmaResult<()> {
        let page = provider.acquire_page()?;
        let base = page.base();
        self.free
            .insert(base + MAP_PAGE_HEADER, self.page_size - MAP_PAGE_HEADER);
        debug!(
            page = page.id(),
            head = self.head.is_none(),
            "resource map page added"
        );
        self.head.get_or_insert(base);
        self.pages.insert(
            base,
            MapPage {
                page,
                block_count: 0,
                live: LiveTable::new(),
            },
        );
        Ok(())
    }

    /// Insert a free block, merging with neighbours in the same page when enabled
    fn insert_free(&mut self, base: Address, mut address: Address, mut size: Size) {
        if self.coalesce {
            let end = base + self.page_size;
            if let Some(next) = self.free.get(&(address + size)).copied() {
                if address + size < end {
                    self.free.remove(&(address + size));
                    size += next;
                }
            }
            if let Some((&prev, &prev_size)) = self.free.range(..address).next_back() {
                if prev >= base && prev + prev_size == address {
                    self.free.remove(&prev);
                    address = prev;
                    size += prev_size;
                }
            }
        }
        self.free.insert(address, size);
    }

    /// Unlink the free blocks of the page at `base` and give it back
    fn drop_page(&mut self, provider: &mut dyn PageProvider, base: Address) -> KmaResult<()> {
        let inside: Vec<Address> = self
            .free
            .range(base..base + self.page_size)
            .map(|(a, _)| *a)
            .collect();
        for address in inside {
            self.free.remove(&address);
        }

        let entry = self
            .pages
            .remove(&base)
            .ok_or_else(|| KmaError::Corruption(format!("no page at 0x{:x}", base)))?;
        if self.head == Some(base) {
            self.head = None;
        }
        debug!(page = entry.page.id(), "resource map page released");
        provider.release_page(entry.page)
    }

    /// Release the page at `base` if empty, holding the head back until it is alone
    fn reclaim(&mut self, provider: &mut dyn PageProvider, base: Address) -> KmaResult<()> {
        let is_head = self.head == Some(base);
        if is_head && self.pages.len() > 1 {
            return Ok(());
        }
        self.drop_page(provider, base)?;

        if let Some(head) = self.head {
            let head_idle = self.pages.get(&head).is_some_and(|p| p.block_count == 0);
            if self.pages.len() == 1 && head_idle {
                self.drop_page(provider, head)?;
            }
        }
        Ok(())
    }
}

impl AllocationStrategy for ResourceMapAllocator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ResourceMap
    }

    fn max_allocation(&self) -> Size {
        self.page_size - MAP_PAGE_HEADER
    }

    fn allocate(&mut self, provider: &mut dyn PageProvider, size: Size) -> KmaResult<Address> {
        check_request(size, self.max_allocation())?;
        let wanted = Self::granted_size(size);

        let (address, block) = loop {
            if let Some(found) = self.first_fit(wanted) {
                break found;
            }
            self.add_page(provider)?;
        };

        self.free.remove(&address);
        let granted = if block - wanted < FREE_NODE_SIZE {
            block
        } else {
            self.free.insert(address + wanted, block - wanted);
            wanted
        };

        let base = owning_page(&self.pages, address, self.page_size)
            .ok_or_else(|| KmaError::Corruption(format!("free block 0x{:x} has no page", address)))?;
        let entry = self
            .pages
            .get_mut(&base)
            .ok_or_else(|| KmaError::Corruption(format!("no page at 0x{:x}", base)))?;
        entry.block_count += 1;
        entry.live.insert(
            address,
            Allocation {
                requested: size,
                granted,
            },
        );
        trace!(size, granted, address = format_args!("0x{:x}", address), "resource map allocate");
        Ok(address)
    }

    fn release(
        &mut self,
        provider: &mut dyn PageProvider,
        address: Address,
        size: Size,
    ) -> KmaResult<()> {
        let base = owning_page(&self.pages, address, self.page_size)
            .ok_or(KmaError::UnknownAddress(address))?;
        let entry = self
            .pages
            .get_mut(&base)
            .ok_or(KmaError::UnknownAddress(address))?;
        let allocation = entry.live.check(address, size)?;

        entry.live.remove(address);
        entry.block_count -= 1;
        let emptied = entry.block_count == 0;

        self.insert_free(base, address, allocation.granted);
        trace!(size, address = format_args!("0x{:x}", address), "resource map release");

        if emptied {
            self.reclaim(provider, base)?;
        }
        Ok(())
    }

    fn allocation_size(&self, address: Address) -> Option<Size> {
        let base = owning_page(&self.pages, address, self.page_size)?;
        self.pages[&base].live.get(address).map(|a| a.requested)
    }

    fn stats(&self) -> AllocatorStats {
        let mut stats = AllocatorStats::empty(StrategyKind::ResourceMap);
        stats.pages_in_use = self.pages.len();
        stats.page_bytes = self.pages.len() * self.page_size;
        stats.overhead_bytes = self.pages.len() * MAP_PAGE_HEADER;
        stats.free_bytes = self.free.values().sum();
        for entry in self.pages.values() {
            stats.live_allocations += entry.live.len();
            stats.requested_bytes += entry.live.requested_bytes();
            stats.granted_bytes += entry.live.granted_bytes();
        }
        stats
    }

    fn check_invariants(&self) -> KmaResult<()> {
        if self.pages.is_empty() != self.head.is_none()
            || (self.pages.is_empty() && !self.free.is_empty())
        {
            return Err(KmaError::Corruption("head page out of sync with page set".into()));
        }
        if let Some(head) = self.head {
            if !self.pages.contains_key(&head) {
                return Err(KmaError::Corruption(format!("head 0x{:x} is not resident", head)));
            }
        }

        let mut previous_end = 0;
        let mut free_per_page: BTreeMap<Address, Size> = BTreeMap::new();
        for (&address, &size) in &self.free {
            let base = owning_page(&self.pages, address, self.page_size).ok_or_else(|| {
                KmaError::Corruption(format!("free block 0x{:x} outside every page", address))
            })?;
            let fits = address >= base + MAP_PAGE_HEADER && address + size <= base + self.page_size;
            if address < previous_end || size < FREE_NODE_SIZE || !fits {
                return Err(KmaError::Corruption(format!(
                    "free block 0x{:x}+{} overlaps or escapes its page",
                    address, size
                )));
            }
            previous_end = address + size;
            *free_per_page.entry(base).or_default() += size;
        }

        for (&base, entry) in &self.pages {
            if entry.block_count != entry.live.len() {
                return Err(KmaError::Corruption(format!(
                    "page 0x{:x} counts {} blocks but holds {}",
                    base,
                    entry.block_count,
                    entry.live.len()
                )));
            }
            if entry.block_count == 0 && (self.head != Some(base) || self.pages.len() == 1) {
                return Err(KmaError::Corruption(format!(
                    "empty page 0x{:x} was not returned to the provider",
                    base
                )));
            }
            let free = free_per_page.get(&base).copied().unwrap_or(0);
            if MAP_PAGE_HEADER + free + entry.live.granted_bytes() != self.page_size {
                return Err(KmaError::Corruption(format!(
                    "page 0x{:x} accounts for {} of {} bytes",
                    base,
                    MAP_PAGE_HEADER + free + entry.live.granted_bytes(),
                    self.page_size
                )));
            }
            for (address, allocation) in entry.live.iter() {
                let overlaps_free = self
                    .free
                    .range(..address + allocation.granted)
                    .next_back()
                    .is_some_and(|(a, s)| a + s > address);
                if overlaps_free {
                    return Err(KmaError::Corruption(format!(
                        "live block 0x{:x} overlaps a free block",
                        address
                    )));
                }
            }
        }
        Ok(())
    }
}
