//! Ping-pong engine
//!
//! The initiator sends every fragment of a message, then polls until the same number of
//! frames has come back. The responder does the reverse. No payload framing is involved:
//! a frame is turned into its own reply by rewriting its addresses ([`swap_roles`]), so the
//! buffers that went out are the buffers that come back.
//!
//! ```text
//!  initiator                                   responder
//!  PREPARE
//!  SEND_ALL   ── dst=peer  src=local ──▶       AWAIT_ALL
//!                                              APPLY_SWAP
//!  AWAIT_ALL  ◀── dst=local src=peer ──        SEND_ALL
//!  MEASURE
//!  (repeat SEND_ALL..MEASURE per iteration, RELEASE once per size)
//! ```

use crate::buffer::{Frame, FramePool};
use crate::clock::Clock;
use crate::config::{BenchConfig, IntegrityPolicy};
use crate::error::{DataplaneError, Result};
use crate::ether::{swap_roles, MacAddr, ETHER_HDR_LEN};
use crate::fragment::{fragment_count, fragment_sizes};
use crate::transport::{submit_all, BurstBatch, PacketIo};
use std::sync::Arc;

/// One completed round trip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTripSample {
    /// Message size in bytes
    pub size: usize,
    /// Elapsed counter ticks
    pub cycles: u64,
    /// Elapsed microseconds
    pub micros: f64,
}

impl RoundTripSample {
    /// Build a sample from a tick delta
    pub fn from_ticks(size: usize, cycles: u64, clock: &dyn Clock) -> Self {
        Self {
            size,
            cycles,
            micros: clock.ticks_to_micros(cycles),
        }
    }

    /// Bits per microsecond
    pub fn bandwidth(&self) -> f64 {
        (self.size as f64 * 8.0) / self.micros
    }
}

/// Keeps the fastest round trip seen for one size
#[derive(Debug, Default, Clone)]
pub struct MinTracker {
    best: Option<RoundTripSample>,
}

impl MinTracker {
    /// Create empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a sample; kept only if strictly faster than the current best
    pub fn record(&mut self, sample: RoundTripSample) {
        match self.best {
            Some(best) if best.cycles <= sample.cycles => {}
            _ => self.best = Some(sample),
        }
    }

    /// Fastest sample so far
    pub fn best(&self) -> Option<RoundTripSample> {
        self.best
    }
}

/// One endpoint of the ping-pong exchange, bound to a single port and queue
pub struct PingPongEngine {
    io: Arc<dyn PacketIo>,
    pool: FramePool,
    clock: Arc<dyn Clock>,
    config: BenchConfig,
    local: MacAddr,
    rx: BurstBatch,
}

impl PingPongEngine {
    /// Create engine. Fails if the configuration is invalid or the port does not exist.
    pub fn new(
        io: Arc<dyn PacketIo>,
        pool: FramePool,
        clock: Arc<dyn Clock>,
        config: BenchConfig,
    ) -> Result<Self> {
        config.validate()?;
        if !io.ports().contains(&config.port) {
            return Err(DataplaneError::InvalidPort(config.port));
        }
        let local = io.local_address(config.port)?;
        tracing::debug!(port = config.port, mac = %local, "local MAC address");

        Ok(Self {
            rx: BurstBatch::with_capacity(config.burst_size),
            io,
            pool,
            clock,
            config,
            local,
        })
    }

    /// Address frames are expected to arrive on
    pub fn local_address(&self) -> MacAddr {
        self.local
    }

    /// Engine configuration
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Allocate and address every fragment of a `size` byte message.
    ///
    /// Running out of buffers is fatal here: a partial message cannot be timed.
    pub fn prepare(&self, size: usize) -> Result<Vec<Frame>> {
        let peer = self
            .config
            .peer
            .ok_or_else(|| DataplaneError::InvalidConfig("initiator needs a peer address".into()))?;

        let sizes = fragment_sizes(size, self.config.mtu, self.config.fragment_mode);
        let mut frames = Vec::with_capacity(sizes.len());
        for payload in sizes {
            let mut frame = self.pool.alloc()?;
            frame.set_len(ETHER_HDR_LEN + payload)?;
            frame.write_eth_header(peer, self.local, self.config.ether_type);
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Time `iterations` round trips of a `size` byte message and return the fastest.
    pub fn ping(&mut self, size: usize) -> Result<RoundTripSample> {
        let mut frames = self.prepare(size)?;
        let expected = frames.len();
        let mut tracker = MinTracker::new();

        for _ in 0..self.config.iterations {
            let start = self.clock.timestamp();
            submit_all(&*self.io, self.config.port, self.config.queue, &mut frames);
            self.await_all(expected, &mut frames)?;
            let stop = self.clock.timestamp();

            tracker.record(RoundTripSample::from_ticks(
                size,
                stop.saturating_sub(start),
                &*self.clock,
            ));
        }

        // Release happens when `frames` drops.
        tracker
            .best()
            .ok_or_else(|| DataplaneError::InvalidConfig("iterations must be at least 1".into()))
    }

    /// Bounce `iterations` messages of `size` bytes back to whoever sent them.
    pub fn pong(&mut self, size: usize) -> Result<()> {
        let expected = fragment_count(size, self.config.mtu);
        let mut frames = Vec::with_capacity(expected);

        for _ in 0..self.config.iterations {
            self.await_all(expected, &mut frames)?;
            submit_all(&*self.io, self.config.port, self.config.queue, &mut frames);
        }
        Ok(())
    }

    /// Poll until `expected` frames addressed to us have arrived, turning each into its
    /// reply. Surplus frames are reported and freed; returns how many.
    ///
    /// With a peer configured, frames from any other sender are dropped before they are
    /// counted. A kernel-owned interface also delivers host traffic to our address.
    fn await_all(&mut self, expected: usize, frames: &mut Vec<Frame>) -> Result<usize> {
        let Self {
            io,
            config,
            local,
            rx,
            ..
        } = self;

        while frames.len() < expected {
            if io.receive(config.port, config.queue, rx) == 0 {
                std::hint::spin_loop();
                continue;
            }

            for mut frame in rx.drain() {
                if let Some(peer) = config.peer {
                    let src = frame.src_addr();
                    if src != peer {
                        tracing::debug!(%src, %peer, "ignoring frame from unknown sender");
                        metrics::counter!("l2bench_foreign_frames").increment(1);
                        continue;
                    }
                }
                match swap_roles(&mut frame, *local) {
                    Ok(()) => frames.push(frame),
                    Err(err) => match config.integrity {
                        IntegrityPolicy::Fatal => {
                            tracing::error!(error = %err, "received frame not addressed to us");
                            return Err(err);
                        }
                        IntegrityPolicy::Drop => {
                            tracing::warn!(error = %err, "dropping frame not addressed to us");
                            metrics::counter!("l2bench_integrity_drops").increment(1);
                        }
                    },
                }
            }
        }

        let surplus = frames.len() - expected;
        if surplus > 0 {
            tracing::warn!(
                received = frames.len(),
                expected,
                "more frames received than expected"
            );
            metrics::counter!("l2bench_overdelivered_frames").increment(surplus as u64);
            frames.truncate(expected);
        }
        Ok(surplus)
    }
}
