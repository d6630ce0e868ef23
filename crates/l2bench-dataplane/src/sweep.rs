//! Message size sweep
//!
//! Sizes double from the configured minimum up to and including the maximum, so a sweep
//! covers several orders of magnitude in a handful of points. Each size produces one
//! [`SweepRecord`].

use crate::config::Role;
use crate::error::{DataplaneError, Result};
use crate::pingpong::{PingPongEngine, RoundTripSample};
use serde::Serialize;
use std::fmt;

/// Geometric progression of message sizes, `min, 2*min, 4*min, ...` while `<= max`
#[derive(Debug, Clone)]
pub struct SizeSweep {
    next: Option<usize>,
    max: usize,
}

impl SizeSweep {
    /// Create sweep over `min..=max`
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            next: (min <= max).then_some(min),
            max,
        }
    }
}

impl Iterator for SizeSweep {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        // Zero never grows; emit it once.
        self.next = current
            .checked_mul(2)
            .filter(|&n| n > current && n <= self.max);
        Some(current)
    }
}

/// Result line for one message size
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepRecord {
    /// Message size in bytes
    pub size: usize,
    /// Minimum round-trip time in microseconds
    pub min_rtt_us: f64,
    /// Bits per microsecond at the minimum round-trip time
    pub bandwidth: f64,
}

impl From<RoundTripSample> for SweepRecord {
    fn from(sample: RoundTripSample) -> Self {
        Self {
            size: sample.size,
            min_rtt_us: sample.micros,
            bandwidth: sample.bandwidth(),
        }
    }
}

impl fmt::Display for SweepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2} {:.2}", self.size, self.min_rtt_us, self.bandwidth)
    }
}

/// Run the initiator over every size of the sweep, handing each record to `emit` as soon
/// as its size completes.
pub fn run_initiator<F>(engine: &mut PingPongEngine, mut emit: F) -> Result<Vec<SweepRecord>>
where
    F: FnMut(&SweepRecord),
{
    ensure_role(engine, Role::Initiator)?;
    let config = engine.config();
    tracing::info!(
        port = config.port,
        min = config.min_bytes,
        max = config.max_bytes,
        iterations = config.iterations,
        "entering ping loop"
    );
    if let Some(peer) = config.peer {
        tracing::debug!(%peer, "target MAC address");
    }

    let mut records = Vec::new();
    for size in engine.config().sizes() {
        let record = SweepRecord::from(engine.ping(size)?);
        emit(&record);
        records.push(record);
    }
    Ok(records)
}

/// Run the responder over every size of the sweep. Returns the number of sizes served.
pub fn run_responder(engine: &mut PingPongEngine) -> Result<usize> {
    ensure_role(engine, Role::Responder)?;
    let config = engine.config();
    tracing::info!(
        port = config.port,
        min = config.min_bytes,
        max = config.max_bytes,
        iterations = config.iterations,
        "entering pong loop"
    );

    let mut served = 0;
    for size in engine.config().sizes() {
        engine.pong(size)?;
        served += 1;
    }
    Ok(served)
}

fn ensure_role(engine: &PingPongEngine, role: Role) -> Result<()> {
    if engine.config().role != role {
        return Err(DataplaneError::InvalidConfig(format!(
            "engine configured as {:?}, expected {:?}",
            engine.config().role,
            role
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubling_is_inclusive() {
        assert_eq!(SizeSweep::new(8, 32).collect::<Vec<_>>(), vec![8, 16, 32]);
        assert_eq!(SizeSweep::new(8, 31).collect::<Vec<_>>(), vec![8, 16]);
        assert_eq!(SizeSweep::new(8, 8192).count(), 11);
    }

    #[test]
    fn test_degenerate_ranges() {
        assert_eq!(SizeSweep::new(64, 32).count(), 0);
        assert_eq!(SizeSweep::new(0, 100).collect::<Vec<_>>(), vec![0]);
        assert_eq!(SizeSweep::new(7, 7).collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_sweep_stops_before_overflow() {
        let top = usize::MAX / 2 + 1;
        assert_eq!(SizeSweep::new(top, usize::MAX).collect::<Vec<_>>(), vec![top]);
    }

    #[test]
    fn test_record_format() {
        let record = SweepRecord {
            size: 3000,
            min_rtt_us: 42.0,
            bandwidth: 3000.0 * 8.0 / 42.0,
        };
        assert_eq!(record.to_string(), "3000 42.00 571.43");
    }
}
