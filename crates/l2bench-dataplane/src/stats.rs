//! Forwarder statistics
//!
//! Each worker counts into its own [`WorkerCounters`] with no sharing at all, then merges
//! once into the [`StatsAggregator`] on exit. The lock is never touched on the hot path.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::ops::AddAssign;

/// Per-worker packet counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerCounters {
    /// Frames received from the assigned port
    pub received: u64,
    /// Frames accepted by the paired port
    pub sent: u64,
}

impl WorkerCounters {
    /// Count received frames
    #[inline(always)]
    pub fn record_rx(&mut self, frames: usize) {
        self.received += frames as u64;
    }

    /// Count transmitted frames
    #[inline(always)]
    pub fn record_tx(&mut self, frames: usize) {
        self.sent += frames as u64;
    }

    /// Frames received but not accepted for transmission
    pub fn dropped(&self) -> u64 {
        self.received.saturating_sub(self.sent)
    }
}

impl AddAssign for WorkerCounters {
    fn add_assign(&mut self, other: Self) {
        self.received += other.received;
        self.sent += other.sent;
    }
}

/// Process-wide totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalCounters {
    /// Frames received across all workers
    pub received: u64,
    /// Frames sent across all workers
    pub sent: u64,
    /// Number of workers merged in
    pub workers: usize,
}

impl fmt::Display for GlobalCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== forwarder statistics ====")?;
        writeln!(f, "recv {} packets", self.received)?;
        writeln!(f, "sent {} packets", self.sent)?;
        write!(f, "==============================")
    }
}

/// Lock-protected totals shared by every forwarder worker
#[derive(Debug, Default)]
pub struct StatsAggregator {
    totals: Mutex<GlobalCounters>,
}

impl StatsAggregator {
    /// Create empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one worker's counters to the totals
    pub fn merge(&self, local: WorkerCounters) {
        {
            let mut totals = self.totals.lock();
            totals.received += local.received;
            totals.sent += local.sent;
            totals.workers += 1;
        }

        metrics::counter!("l2bench_forwarder_rx_packets").increment(local.received);
        metrics::counter!("l2bench_forwarder_tx_packets").increment(local.sent);
    }

    /// Totals merged so far. Workers still running are not included.
    pub fn snapshot(&self) -> GlobalCounters {
        *self.totals.lock()
    }

    /// Final totals. Taking the aggregator by value means every worker holding a handle
    /// to it has finished.
    pub fn into_totals(self) -> GlobalCounters {
        self.totals.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_worker_counters() {
        let mut counters = WorkerCounters::default();
        counters.record_rx(10);
        counters.record_tx(7);
        assert_eq!(counters, WorkerCounters { received: 10, sent: 7 });
        assert_eq!(counters.dropped(), 3);
    }

    #[test]
    fn test_report_format() {
        let totals = GlobalCounters {
            received: 12,
            sent: 9,
            workers: 2,
        };
        assert_eq!(
            totals.to_string(),
            "==== forwarder statistics ====\nrecv 12 packets\nsent 9 packets\n=============================="
        );
    }

    #[test]
    fn test_concurrent_merges() {
        let stats = Arc::new(StatsAggregator::new());
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let stats = stats.clone();
                thread::spawn(move || {
                    stats.merge(WorkerCounters {
                        received: 100 + i,
                        sent: i,
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let totals = Arc::try_unwrap(stats).unwrap().into_totals();
        assert_eq!(totals.received, 800 + 28);
        assert_eq!(totals.sent, 28);
        assert_eq!(totals.workers, 8);
    }

    proptest! {
        #[test]
        fn prop_merge_order_independent(
            mut counters in prop::collection::vec((0u64..1 << 32, 0u64..1 << 32), 0..32)
        ) {
            let expected_rx: u64 = counters.iter().map(|c| c.0).sum();
            let expected_tx: u64 = counters.iter().map(|c| c.1).sum();

            let forward = StatsAggregator::new();
            for &(received, sent) in &counters {
                forward.merge(WorkerCounters { received, sent });
            }
            counters.reverse();
            let backward = StatsAggregator::new();
            for &(received, sent) in &counters {
                backward.merge(WorkerCounters { received, sent });
            }

            let a = forward.into_totals();
            let b = backward.into_totals();
            prop_assert_eq!(a, b);
            prop_assert_eq!(a.received, expected_rx);
            prop_assert_eq!(a.sent, expected_tx);
            prop_assert_eq!(a.workers, counters.len());
        }
    }
}
