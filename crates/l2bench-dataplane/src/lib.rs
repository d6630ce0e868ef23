//! l2bench dataplane
//!
//! Burst-oriented raw Ethernet benchmarking and forwarding on top of a non-blocking
//! packet I/O layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         LATENCY BENCHMARK                            │
//! │                                                                      │
//! │  SizeSweep ──▶ PingPongEngine ──▶ fragment_sizes / swap_roles        │
//! │   8,16,..,max      │   ▲                                             │
//! │                    ▼   │ submit_all / receive (BurstBatch)           │
//! │               ┌─────────────┐                                        │
//! │               │  PacketIo   │  SimNetwork | PacketSocketIo           │
//! │               └─────────────┘                                        │
//! └──────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            FORWARDER                                 │
//! │                                                                      │
//! │  ┌────────────────┐           ┌────────────────┐                     │
//! │  │ Worker port 0  │──────────▶│    TX port 1   │                     │
//! │  │ (core N)       │           └────────────────┘                     │
//! │  └────────────────┘                                                  │
//! │  ┌────────────────┐           ┌────────────────┐                     │
//! │  │ Worker port 1  │──────────▶│    TX port 0   │                     │
//! │  │ (core N+1)     │           └────────────────┘                     │
//! │  └───────┬────────┘                                                  │
//! │          │ merge once on shutdown                                    │
//! │          ▼                                                           │
//! │  StatsAggregator (Mutex)                                             │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every call into [`PacketIo`] is non-blocking and may complete partially. The benchmark
//! retries until a whole message is through; the forwarder frees what the paired port
//! refused and moves on.

#![warn(missing_docs)]

pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod ether;
pub mod forwarder;
pub mod fragment;
pub mod pingpong;
pub mod stats;
pub mod sweep;
pub mod transport;

pub use buffer::{pool_size_for, Frame, FramePool, BUFFER_SIZE};
pub use clock::{platform_clock, Clock, ManualClock, MonotonicClock};
pub use config::{
    BenchConfig, ForwarderConfig, IntegrityPolicy, Role, BURST_SIZE, DEFAULT_RING_SIZE,
};
pub use error::{DataplaneError, Result};
pub use ether::{swap_roles, MacAddr};
pub use forwarder::{Forwarder, ForwarderWorker, ShutdownSignal};
pub use fragment::{fragment_sizes, FragmentMode};
pub use pingpong::{MinTracker, PingPongEngine, RoundTripSample};
pub use stats::{GlobalCounters, StatsAggregator, WorkerCounters};
pub use sweep::{run_initiator, run_responder, SizeSweep, SweepRecord};
pub use transport::{BurstBatch, PacketIo, PortId, QueueId, SimNetwork};

#[cfg(target_os = "linux")]
pub use transport::PacketSocketIo;
