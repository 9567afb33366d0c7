/*!
 * Allocator Facade
 *
 * `Kma` pairs one allocation strategy with the page provider it draws from,
 * and keeps client-side usage counters on top of the strategy's own stats.
 */

use super::traits::AllocationStrategy;
use super::types::{AllocatorStats, StrategyKind};
use crate::core::{Address, KmaConfig, KmaError, KmaResult, Size};
use crate::page::{PageProvider, SimulatedPageProvider};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Request counters seen by the facade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTracking {
    pub allocations: u64,
    pub releases: u64,
    pub failed_allocations: u64,
    pub rejected_releases: u64,
    pub current_bytes: Size,
    pub peak_bytes: Size,
}

/// Allocator instance: a strategy plus its page provider
#[derive(Debug)]
pub struct Kma<P: PageProvider> {
    provider: P,
    strategy: Box<dyn AllocationStrategy>,
    usage: UsageTracking,
}

impl<P: PageProvider> Kma<P> {
    /// Build an allocator using `kind`; the provider's page size must match `config`
    pub fn new(kind: StrategyKind, config: &KmaConfig, provider: P) -> KmaResult<Self> {
        config.validate()?;
        if provider.page_size() != config.page_size {
            return Err(KmaError::InvalidConfig(format!(
                "provider pages are {} bytes, configuration expects {}",
                provider.page_size(),
                config.page_size
            )));
        }
        info!(
            strategy = %kind,
            page_size = config.page_size,
            min_block = config.min_block_size,
            "allocator initialized"
        );
        Ok(Self::with_strategy(kind.build(config), provider))
    }

    /// Wrap an already constructed strategy
    pub fn with_strategy(strategy: Box<dyn AllocationStrategy>, provider: P) -> Self {
        Self {
            provider,
            strategy,
            usage: UsageTracking::default(),
        }
    }

    pub fn allocate(&mut self, size: Size) -> KmaResult<Address> {
        match self.strategy.allocate(&mut self.provider, size) {
            Ok(address) => {
                self.usage.allocations += 1;
                self.usage.current_bytes += size;
                self.usage.peak_bytes = self.usage.peak_bytes.max(self.usage.current_bytes);
                Ok(address)
            }
            Err(e) => {
                self.usage.failed_allocations += 1;
                warn!(size, strategy = %self.strategy.kind(), error = %e, "allocation failed");
                Err(e)
            }
        }
    }

    pub fn release(&mut self, address: Address, size: Size) -> KmaResult<()> {
        match self.strategy.release(&mut self.provider, address, size) {
            Ok(()) => {
                self.usage.releases += 1;
                self.usage.current_bytes -= size;
                Ok(())
            }
            Err(e) => {
                if e.is_caller_error() {
                    self.usage.rejected_releases += 1;
                    warn!(address = format_args!("0x{:x}", address), size, error = %e, "release rejected");
                } else {
                    error!(address = format_args!("0x{:x}", address), error = %e, "release failed");
                }
                Err(e)
            }
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn max_allocation(&self) -> Size {
        self.strategy.max_allocation()
    }

    /// Requested size of the live allocation at `address`
    pub fn allocation_size(&self, address: Address) -> Option<Size> {
        self.strategy.allocation_size(address)
    }

    pub fn stats(&self) -> AllocatorStats {
        self.strategy.stats()
    }

    pub fn usage(&self) -> UsageTracking {
        self.usage
    }

    pub fn check_invariants(&self) -> KmaResult<()> {
        self.strategy.check_invariants().map_err(|e| {
            error!(strategy = %self.strategy.kind(), error = %e, "invariant check failed");
            e
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn strategy(&self) -> &dyn AllocationStrategy {
        self.strategy.as_ref()
    }

    pub fn into_provider(self) -> P {
        self.provider
    }
}

impl Kma<SimulatedPageProvider> {
    /// Allocator over a fresh simulated provider built from `config`
    pub fn simulated(kind: StrategyKind, config: &KmaConfig) -> KmaResult<Self> {
        Self::new(kind, config, SimulatedPageProvider::from_config(config))
    }
}
