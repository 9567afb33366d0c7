/*!
 * Segregated Free List
 *
 * Power-of-two size classes from the minimum block up to a whole page. Each
 * data page is cut into equal buffers of one class; free buffers sit on their
 * class's list. Every buffer starts with a one-word header, which is why a
 * request of `n` bytes needs a class of at least `n + WORD`.
 *
 * The class headers and the in-use page counter live on a bookkeeping page
 * acquired with the first allocation and returned with the last data page.
 */

use super::traits::AllocationStrategy;
use super::types::{
    check_request, owning_page, Allocation, AllocatorStats, LiveTable, StrategyKind,
};
use crate::core::limits::BUFFER_HEADER_SIZE;
use crate::core::{Address, KmaConfig, KmaError, KmaResult, Size};
use crate::page::{Page, PageProvider};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// A free buffer on a class list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeBuffer {
    /// Start of the buffer header
    address: Address,
    /// Base of the page the buffer was cut from
    page: Address,
}

/// Free list of one size class
#[derive(Debug)]
struct SizeClass {
    size: Size,
    /// Top of the stack is the list head
    free: Vec<FreeBuffer>,
}

/// Allocator-wide state, present only while any data page is in use
#[derive(Debug)]
struct Bookkeeping {
    page: Page,
    pages_in_use: usize,
    classes: Vec<SizeClass>,
}

/// Data page cut into buffers of one class
#[derive(Debug)]
struct SlabPage {
    page: Page,
    class: usize,
    live: LiveTable,
}

/// Power-of-two segregated free-list allocator
#[derive(Debug)]
pub struct FreeListAllocator {
    page_size: Size,
    class_sizes: Vec<Size>,
    state: Option<Bookkeeping>,
    pages: BTreeMap<Address, SlabPage>,
}

impl FreeListAllocator {
    pub fn new(config: &KmaConfig) -> Self {
        let class_sizes = std::iter::successors(Some(config.min_block_size), |s| Some(s * 2))
            .take_while(|s| *s <= config.page_size)
            .collect();
        Self {
            page_size: config.page_size,
            class_sizes,
            state: None,
            pages: BTreeMap::new(),
        }
    }

    /// Class sizes, smallest first
    pub fn class_sizes(&self) -> &[Size] {
        &self.class_sizes
    }

    /// Whether the bookkeeping page is held
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Data pages currently cut into buffers
    pub fn pages_in_use(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.pages_in_use)
    }

    /// Class size serving the live allocation at `address`
    pub fn size_class_of(&self, address: Address) -> Option<Size> {
        let base = owning_page(&self.pages, address, self.page_size)?;
        let slab = &self.pages[&base];
        slab.live.get(address)?;
        Some(self.class_sizes[slab.class])
    }

    /// Free buffers on the list of class `size`
    pub fn free_buffers(&self, size: Size) -> usize {
        let Some(state) = &self.state else { return 0 };
        state
            .classes
            .iter()
            .find(|c| c.size == size)
            .map_or(0, |c| c.free.len())
    }

    /// Index of the smallest class holding `size` plus the buffer header
    fn class_for(&self, size: Size) -> Option<usize> {
        self.class_sizes
            .iter()
            .position(|c| *c >= size + BUFFER_HEADER_SIZE)
    }

    fn buffers_per_page(&self, class: usize) -> usize {
        self.page_size / self.class_sizes[class]
    }

    fn init(&mut self, provider: &mut dyn PageProvider) -> KmaResult<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let page = provider.acquire_page()?;
        debug!(page = page.id(), "free-list bookkeeping page acquired");
        self.state = Some(Bookkeeping {
            page,
            pages_in_use: 0,
            classes: self
                .class_sizes
                .iter()
                .map(|&size| SizeClass {
                    size,
                    free: Vec::new(),
                })
                .collect(),
        });
        Ok(())
    }

    /// Return the bookkeeping page once no data page is left
    fn teardown_if_idle(&mut self, provider: &mut dyn PageProvider) -> KmaResult<()> {
        if self.state.as_ref().is_some_and(|s| s.pages_in_use == 0) {
            if let Some(state) = self.state.take() {
                debug!(page = state.page.id(), "free-list idle, bookkeeping page released");
                provider.release_page(state.page)?;
            }
        }
        Ok(())
    }

    /// Cut a fresh page into buffers of `class` and put them on its list
    fn refill(&mut self, provider: &mut dyn PageProvider, class: usize) -> KmaResult<()> {
        let page = provider.acquire_page()?;
        let size = self.class_sizes[class];
        let base = page.base();
        let count = self.buffers_per_page(class);
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| KmaError::Corruption("refill before initialization".into()))?;

        // Highest address first so the page base ends up on top
        let list = &mut state.classes[class].free;
        list.extend((0..count).rev().map(|i| FreeBuffer {
            address: base + i * size,
            page: base,
        }));
        state.pages_in_use += 1;

        debug!(page = page.id(), class = size, count, "page cut into buffers");
        self.pages.insert(
            base,
            SlabPage {
                page,
                class,
                live: LiveTable::new(),
            },
        );
        Ok(())
    }

    fn pop_buffer(&mut self, class: usize) -> Option<FreeBuffer> {
        self.state.as_mut()?.classes[class].free.pop()
    }

    /// Unlink every buffer of `base` from `class` and give the page back
    fn release_slab(
        &mut self,
        provider: &mut dyn PageProvider,
        class: usize,
        base: Address,
    ) -> KmaResult<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| KmaError::Corruption("release without bookkeeping".into()))?;
        state.classes[class].free.retain(|b| b.page != base);
        state.pages_in_use -= 1;

        let slab = self
            .pages
            .remove(&base)
            .ok_or_else(|| KmaError::Corruption(format!("no page at 0x{:x}", base)))?;
        debug!(page = slab.page.id(), class = self.class_sizes[class], "all buffers free, page released");
        provider.release_page(slab.page)
    }
}

impl AllocationStrategy for FreeListAllocator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FreeList
    }

    fn max_allocation(&self) -> Size {
        self.page_size - BUFFER_HEADER_SIZE
    }

    fn allocate(&mut self, provider: &mut dyn PageProvider, size: Size) -> KmaResult<Address> {
        check_request(size, self.max_allocation())?;
        let class = self.class_for(size).ok_or(KmaError::RequestTooLarge {
            requested: size,
            max: self.max_allocation(),
        })?;

        self.init(provider)?;
        let buffer = match self.pop_buffer(class) {
            Some(buffer) => buffer,
            None => {
                if let Err(e) = self.refill(provider, class) {
                    self.teardown_if_idle(provider)?;
                    return Err(e);
                }
                self.pop_buffer(class).ok_or_else(|| {
                    KmaError::Corruption("fresh page produced no buffers".into())
                })?
            }
        };

        let address = buffer.address + BUFFER_HEADER_SIZE;
        let class_size = self.class_sizes[class];
        let slab = self
            .pages
            .get_mut(&buffer.page)
            .ok_or_else(|| KmaError::Corruption(format!("buffer 0x{:x} has no page", buffer.address)))?;
        slab.live.insert(
            address,
            Allocation {
                requested: size,
                granted: class_size - BUFFER_HEADER_SIZE,
            },
        );
        trace!(size, class = class_size, address = format_args!("0x{:x}", address), "free-list allocate");
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
        let per_page = {
            let slab = &self.pages[&base];
            slab.live.check(address, size)?;
            self.buffers_per_page(slab.class)
        };

        let slab = self
            .pages
            .get_mut(&base)
            .ok_or(KmaError::UnknownAddress(address))?;
        slab.live.remove(address);
        let class = slab.class;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| KmaError::Corruption("live buffer without bookkeeping".into()))?;
        let list = &mut state.classes[class].free;
        list.push(FreeBuffer {
            address: address - BUFFER_HEADER_SIZE,
            page: base,
        });
        trace!(size, address = format_args!("0x{:x}", address), "free-list release");

        let free_in_page = list.iter().filter(|b| b.page == base).count();
        if free_in_page == per_page {
            self.release_slab(provider, class, base)?;
            self.teardown_if_idle(provider)?;
        }
        Ok(())
    }

    fn allocation_size(&self, address: Address) -> Option<Size> {
        let base = owning_page(&self.pages, address, self.page_size)?;
        self.pages[&base].live.get(address).map(|a| a.requested)
    }

    fn stats(&self) -> AllocatorStats {
        let mut stats = AllocatorStats::empty(StrategyKind::FreeList);
        let Some(state) = &self.state else {
            return stats;
        };

        stats.pages_in_use = 1 + self.pages.len();
        stats.page_bytes = stats.pages_in_use * self.page_size;
        stats.overhead_bytes = self.page_size;
        for slab in self.pages.values() {
            stats.live_allocations += slab.live.len();
            stats.requested_bytes += slab.live.requested_bytes();
            stats.granted_bytes += slab.live.granted_bytes();
            stats.overhead_bytes += slab.live.len() * BUFFER_HEADER_SIZE;
        }
        stats.free_bytes = state
            .classes
            .iter()
            .map(|c| c.free.len() * c.size)
            .sum();
        stats
    }

    fn check_invariants(&self) -> KmaResult<()> {
        let Some(state) = &self.state else {
            if self.pages.is_empty() {
                return Ok(());
            }
            return Err(KmaError::Corruption(
                "data pages held without bookkeeping".into(),
            ));
        };

        if state.pages_in_use != self.pages.len() || state.pages_in_use == 0 {
            return Err(KmaError::Corruption(format!(
                "in-use counter {} but {} data pages",
                state.pages_in_use,
                self.pages.len()
            )));
        }

        let mut seen = BTreeSet::new();
        for (index, class) in state.classes.iter().enumerate() {
            for buffer in &class.free {
                let slab = self.pages.get(&buffer.page).filter(|s| s.class == index);
                let aligned = (buffer.address - buffer.page) % class.size == 0;
                if slab.is_none() || !aligned || !seen.insert(buffer.address) {
                    return Err(KmaError::Corruption(format!(
                        "bad free buffer 0x{:x} on class {}",
                        buffer.address, class.size
                    )));
                }
            }
        }

        for (base, slab) in &self.pages {
            let class = &state.classes[slab.class];
            let free = class.free.iter().filter(|b| b.page == *base).count();
            if slab.live.is_empty() || free + slab.live.len() != self.buffers_per_page(slab.class) {
                return Err(KmaError::Corruption(format!(
                    "page 0x{:x}: {} free + {} live buffers of {}",
                    base,
                    free,
                    slab.live.len(),
                    class.size
                )));
            }
            for (address, allocation) in slab.live.iter() {
                if self.class_for(allocation.requested) != Some(slab.class)
                    || seen.contains(&(address - BUFFER_HEADER_SIZE))
                {
                    return Err(KmaError::Corruption(format!(
                        "live buffer 0x{:x} in wrong class or also free",
                        address
                    )));
                }
            }
        }
        Ok(())
    }
}
