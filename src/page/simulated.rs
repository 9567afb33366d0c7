/*!
 * Simulated Page Provider
 * Hands out address ranges without backing memory, with accounting
 */

use super::{Page, PageProvider};
use crate::core::limits::{SIMULATED_BASE_ADDRESS, SIMULATED_PAGE_STRIDE};
use crate::core::{Address, KmaConfig, KmaError, KmaResult, PageId, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Provider accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub acquired: u64,
    pub released: u64,
    pub live: usize,
    pub peak_live: usize,
}

/// Page provider over a simulated address space
///
/// Pages are spaced `SIMULATED_PAGE_STRIDE` pages apart so two pages are
/// never adjacent. Released ids are never reused.
#[derive(Debug)]
pub struct SimulatedPageProvider {
    page_size: Size,
    page_limit: Option<usize>,
    next_id: PageId,
    live: BTreeMap<PageId, Address>,
    stats: ProviderStats,
}

impl SimulatedPageProvider {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            page_limit: None,
            next_id: 0,
            live: BTreeMap::new(),
            stats: ProviderStats::default(),
        }
    }

    pub fn from_config(config: &KmaConfig) -> Self {
        let provider = Self::new(config.page_size);
        match config.page_limit {
            Some(limit) => provider.with_page_limit(limit),
            None => provider,
        }
    }

    /// Cap the number of simultaneously live pages
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit);
        self
    }

    pub fn stats(&self) -> ProviderStats {
        self.stats
    }

    pub fn live_pages(&self) -> usize {
        self.live.len()
    }

    fn base_for(&self, id: PageId) -> Address {
        SIMULATED_BASE_ADDRESS + id as usize * self.page_size * SIMULATED_PAGE_STRIDE
    }
}

impl PageProvider for SimulatedPageProvider {
    fn page_size(&self) -> Size {
        self.page_size
    }

    fn acquire_page(&mut self) -> KmaResult<Page> {
        if self.page_limit.is_some_and(|limit| self.live.len() >= limit) {
            return Err(KmaError::ProviderExhausted {
                live_pages: self.live.len(),
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        let base = self.base_for(id);
        self.live.insert(id, base);

        self.stats.acquired += 1;
        self.stats.live = self.live.len();
        self.stats.peak_live = self.stats.peak_live.max(self.stats.live);

        debug!(page = id, base = format_args!("0x{:x}", base), "page acquired");
        Ok(Page::new(id, base, self.page_size))
    }

    fn release_page(&mut self, page: Page) -> KmaResult<()> {
        match self.live.get(&page.id()) {
            Some(&base) if base == page.base() && page.size() == self.page_size => {
                self.live.remove(&page.id());
                self.stats.released += 1;
                self.stats.live = self.live.len();
                debug!(page = page.id(), "page released");
                Ok(())
            }
            _ => Err(KmaError::PageNotOwned(page.id())),
        }
    }
}
