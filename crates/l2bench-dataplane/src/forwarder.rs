//! Two-port forwarder
//!
//! One worker thread per port. Each worker polls its own port and pushes whatever arrives
//! to the paired port (`port ^ 1`). Frames the paired port does not accept in that call
//! are freed, never retried. Workers stop on the next loop iteration after the
//! [`ShutdownSignal`] fires and merge their counters into the shared [`StatsAggregator`].

use crate::config::ForwarderConfig;
use crate::error::{DataplaneError, Result};
use crate::stats::{GlobalCounters, StatsAggregator, WorkerCounters};
use crate::transport::{BurstBatch, PacketIo, PortId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Process-wide stop flag, polled by every worker once per loop iteration
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    /// Create untriggered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if stop was requested
    #[inline(always)]
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Port that `port` forwards to
#[inline]
pub const fn paired_port(port: PortId) -> PortId {
    port ^ 1
}

/// Per-port forwarding loop
pub struct ForwarderWorker {
    port: PortId,
    peer: PortId,
    io: Arc<dyn PacketIo>,
    burst: BurstBatch,
    counters: WorkerCounters,
}

impl ForwarderWorker {
    /// Create worker receiving on `port` and sending on its pair
    pub fn new(port: PortId, io: Arc<dyn PacketIo>, burst_size: usize) -> Self {
        Self {
            port,
            peer: paired_port(port),
            io,
            burst: BurstBatch::with_capacity(burst_size),
            counters: WorkerCounters::default(),
        }
    }

    /// Receiving port
    pub fn port(&self) -> PortId {
        self.port
    }

    /// Counters so far
    pub fn counters(&self) -> WorkerCounters {
        self.counters
    }

    /// Relay at most one burst. Returns the number of frames received.
    #[inline]
    pub fn poll_once(&mut self) -> usize {
        let received = self.io.receive(self.port, 0, &mut self.burst);
        if received == 0 {
            return 0;
        }
        self.counters.record_rx(received);

        let sent = self.io.submit(self.peer, 0, self.burst.frames_mut());
        self.counters.record_tx(sent);

        // Whatever the paired port refused goes back to the pool.
        self.burst.clear();
        received
    }

    /// Poll until `shutdown` fires, then merge into `stats` exactly once.
    pub fn run(mut self, shutdown: &ShutdownSignal, stats: &StatsAggregator) -> WorkerCounters {
        tracing::info!(port = self.port, peer = self.peer, "forwarding");

        while !shutdown.is_triggered() {
            self.poll_once();
        }

        let counters = self.counters;
        if counters.dropped() > 0 {
            tracing::warn!(
                port = self.port,
                dropped = counters.dropped(),
                "frames dropped on full TX queue"
            );
        }
        stats.merge(counters);
        tracing::info!(
            port = self.port,
            received = counters.received,
            sent = counters.sent,
            "worker stopped"
        );
        counters
    }
}

struct WorkerHandle {
    thread: Option<thread::JoinHandle<()>>,
    port: PortId,
}

/// Multi-core forwarder
///
/// Runs once: after [`Forwarder::stop`] or [`Forwarder::join`] it cannot be restarted.
pub struct Forwarder {
    config: ForwarderConfig,
    shutdown: ShutdownSignal,
    stats: Arc<StatsAggregator>,
    workers: Vec<WorkerHandle>,
    started: bool,
}

impl Forwarder {
    /// Create forwarder with its own shutdown signal
    pub fn new(config: ForwarderConfig) -> Self {
        Self::with_shutdown(config, ShutdownSignal::new())
    }

    /// Create forwarder stopped by an externally owned signal
    pub fn with_shutdown(config: ForwarderConfig, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            shutdown,
            stats: Arc::new(StatsAggregator::new()),
            workers: Vec::new(),
            started: false,
        }
    }

    /// Handle for stopping the workers from elsewhere, e.g. a signal handler
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Spawn one worker per configured port, or per port of `io` when none are configured
    pub fn start(&mut self, io: Arc<dyn PacketIo>) -> Result<()> {
        if self.started {
            return Err(DataplaneError::AlreadyRunning);
        }
        self.config.validate()?;

        let available = io.ports();
        let ports = if self.config.ports.is_empty() {
            available.clone()
        } else {
            self.config.ports.clone()
        };
        if ports.is_empty() {
            return Err(DataplaneError::InvalidConfig("no ports to forward between".into()));
        }
        if let Some(&missing) = ports.iter().find(|p| !available.contains(p)) {
            return Err(DataplaneError::InvalidPort(missing));
        }
        for &port in &ports {
            if !ports.contains(&paired_port(port)) {
                tracing::warn!(port, peer = paired_port(port), "paired port not serviced");
            }
        }

        let core_ids = if self.config.pin_cores {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        self.started = true;
        for (n, &port) in ports.iter().enumerate() {
            let core = core_ids.get(self.config.first_core + n).copied();
            if self.config.pin_cores && core.is_none() {
                tracing::warn!(port, "no core left to pin worker to");
            }

            let worker = ForwarderWorker::new(port, io.clone(), self.config.burst_size);
            let shutdown = self.shutdown.clone();
            let stats = self.stats.clone();

            let spawned = thread::Builder::new()
                .name(format!("fwd-port-{}", port))
                .spawn(move || {
                    let core_id = core.map(|c| c.id);
                    let span = tracing::info_span!("worker", port, core = ?core_id);
                    let _enter = span.enter();

                    if let Some(core) = core {
                        if !core_affinity::set_for_current(core) {
                            tracing::warn!(core = core.id, "failed to pin worker");
                        }
                    }
                    worker.run(&shutdown, &stats);
                });

            match spawned {
                Ok(handle) => self.workers.push(WorkerHandle {
                    thread: Some(handle),
                    port,
                }),
                Err(e) => {
                    self.shutdown.trigger();
                    self.join_workers();
                    return Err(DataplaneError::SpawnFailed(e.to_string()));
                }
            }
        }

        tracing::info!(ports = ports.len(), "forwarder started");
        Ok(())
    }

    /// Check if workers are running
    pub fn is_running(&self) -> bool {
        !self.workers.is_empty() && !self.shutdown.is_triggered()
    }

    /// Totals merged so far
    pub fn stats(&self) -> GlobalCounters {
        self.stats.snapshot()
    }

    /// Signal every worker to stop and return the final totals
    pub fn stop(&mut self) -> GlobalCounters {
        self.shutdown.trigger();
        self.join()
    }

    /// Wait for the workers to exit after the shutdown signal fired elsewhere, then return
    /// the final totals
    pub fn join(&mut self) -> GlobalCounters {
        self.join_workers();

        let stats = std::mem::take(&mut self.stats);
        let totals = match Arc::try_unwrap(stats) {
            Ok(stats) => stats.into_totals(),
            Err(shared) => shared.snapshot(),
        };
        tracing::info!(
            workers = totals.workers,
            received = totals.received,
            sent = totals.sent,
            "forwarder stopped"
        );
        totals
    }

    fn join_workers(&mut self) {
        for worker in &mut self.workers {
            if let Some(handle) = worker.thread.take() {
                if handle.join().is_err() {
                    tracing::error!(port = worker.port, "worker panicked");
                }
            }
        }
        self.workers.clear();
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown.trigger();
            self.join_workers();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FramePool;
    use crate::transport::SimNetwork;
    use std::time::Duration;

    #[test]
    fn test_pairing() {
        assert_eq!(paired_port(0), 1);
        assert_eq!(paired_port(1), 0);
        assert_eq!(paired_port(6), 7);
    }

    #[test]
    fn test_idle_poll() {
        let net = Arc::new(SimNetwork::new(2, 8));
        let mut worker = ForwarderWorker::new(0, net, 32);
        assert_eq!(worker.poll_once(), 0);
        assert_eq!(worker.counters(), WorkerCounters::default());
    }

    #[test]
    fn test_worker_merges_once_on_shutdown() {
        let net = Arc::new(SimNetwork::new(2, 8));
        let pool = FramePool::new(8);
        net.inject(0, pool.alloc().unwrap()).unwrap();

        let shutdown = ShutdownSignal::new();
        let stats = StatsAggregator::new();
        let mut worker = ForwarderWorker::new(0, net.clone(), 32);
        worker.poll_once();
        shutdown.trigger();

        let counters = worker.run(&shutdown, &stats);
        assert_eq!(counters, WorkerCounters { received: 1, sent: 1 });
        assert_eq!(stats.snapshot().workers, 1);
        assert_eq!(net.tx_pending(1), 1);
    }

    #[test]
    fn test_lifecycle() {
        let net = Arc::new(SimNetwork::new(2, 8));
        let mut forwarder = Forwarder::new(ForwarderConfig::default());
        assert!(!forwarder.is_running());

        forwarder.start(net.clone()).unwrap();
        assert!(forwarder.is_running());
        assert!(matches!(
            forwarder.start(net),
            Err(DataplaneError::AlreadyRunning)
        ));

        std::thread::sleep(Duration::from_millis(10));
        let totals = forwarder.stop();
        assert!(!forwarder.is_running());
        assert_eq!(totals.workers, 2);
        assert_eq!(totals.received, 0);
    }

    #[test]
    fn test_unknown_port_rejected() {
        let net = Arc::new(SimNetwork::new(2, 8));
        let mut forwarder = Forwarder::new(ForwarderConfig {
            ports: vec![0, 4],
            ..Default::default()
        });
        assert!(matches!(
            forwarder.start(net),
            Err(DataplaneError::InvalidPort(4))
        ));
        assert!(!forwarder.is_running());
    }
}
