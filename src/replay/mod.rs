/*!
 * Trace Replay
 *
 * Drives an allocator over a simulated provider with a request trace and
 * reports page usage. Allocations still live when the trace ends are
 * released, so `leaked_pages` counts pages the strategy failed to hand back.
 */

mod trace;

pub use trace::{RequestId, Trace, TraceOp};

use crate::core::{Address, KmaConfig, KmaResult, Size};
use crate::memory::{Kma, StrategyKind};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayOptions {
    /// Run the strategy's invariant check after every request
    pub check_invariants: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub strategy: StrategyKind,
    pub page_size: Size,
    pub ops: usize,
    pub allocations: u64,
    pub releases: u64,
    /// Allocation requests the strategy refused
    pub failures: u64,
    pub peak_pages: usize,
    pub peak_requested_bytes: Size,
    /// Mean of requested / page bytes over requests that left pages held
    pub mean_utilization: f64,
    /// Utilization after the last request, before draining
    pub final_utilization: f64,
    pub leaked_pages: usize,
}

#[instrument(skip(trace, config), fields(ops = trace.len()))]
pub fn replay(
    trace: &Trace,
    kind: StrategyKind,
    config: &KmaConfig,
    options: ReplayOptions,
) -> KmaResult<ReplayReport> {
    let mut kma = Kma::simulated(kind, config)?;
    let mut live: AHashMap<RequestId, (Address, Size)> = AHashMap::new();

    let mut peak_pages = 0;
    let mut utilization_sum = 0.0;
    let mut utilization_samples = 0usize;

    for op in trace.ops() {
        match *op {
            TraceOp::Alloc { id, size } => match kma.allocate(size) {
                Ok(address) => {
                    live.insert(id, (address, size));
                }
                Err(e) => debug!(id, size, error = %e, "request refused"),
            },
            TraceOp::Free { id } => {
                // Frees of refused requests have nothing to release
                if let Some((address, size)) = live.remove(&id) {
                    kma.release(address, size)?;
                }
            }
        }

        if options.check_invariants {
            kma.check_invariants()?;
        }

        let stats = kma.stats();
        peak_pages = peak_pages.max(stats.pages_in_use);
        if stats.page_bytes > 0 {
            utilization_sum += stats.utilization();
            utilization_samples += 1;
        }
    }

    let usage = kma.usage();
    let final_utilization = kma.stats().utilization();

    for (_, (address, size)) in live.drain() {
        kma.release(address, size)?;
    }
    if options.check_invariants {
        kma.check_invariants()?;
    }

    let report = ReplayReport {
        strategy: kind,
        page_size: config.page_size,
        ops: trace.len(),
        allocations: usage.allocations,
        releases: usage.releases,
        failures: usage.failed_allocations,
        peak_pages,
        peak_requested_bytes: usage.peak_bytes,
        mean_utilization: if utilization_samples == 0 {
            0.0
        } else {
            utilization_sum / utilization_samples as f64
        },
        final_utilization,
        leaked_pages: kma.provider().live_pages(),
    };

    info!(
        strategy = %kind,
        peak_pages = report.peak_pages,
        failures = report.failures,
        leaked_pages = report.leaked_pages,
        "replay finished"
    );
    Ok(report)
}
