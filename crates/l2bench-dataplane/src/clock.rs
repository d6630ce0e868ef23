//! Timestamp counters
//!
//! Round trips are timed in raw counter ticks and converted to microseconds with the
//! counter's frequency.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Monotonic cycle counter
pub trait Clock: Send + Sync {
    /// Current counter value
    fn timestamp(&self) -> u64;

    /// Ticks per second
    fn frequency(&self) -> u64;

    /// Convert a tick delta to microseconds
    #[inline]
    fn ticks_to_micros(&self, ticks: u64) -> f64 {
        ticks as f64 * MICROS_PER_SEC / self.frequency() as f64
    }
}

/// Nanosecond counter on top of [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create clock counting from now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn timestamp(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn frequency(&self) -> u64 {
        1_000_000_000
    }
}

/// x86 time-stamp counter (`rdtsc`)
///
/// Assumes an invariant TSC, as every server CPU of the last decade has.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct TscClock {
    hz: u64,
}

#[cfg(target_arch = "x86_64")]
impl TscClock {
    /// Measure the counter frequency against the monotonic clock over `window`
    pub fn calibrate(window: Duration) -> Self {
        let start_instant = Instant::now();
        let start = read_tsc();
        std::thread::sleep(window);
        let ticks = read_tsc().wrapping_sub(start);
        let elapsed = start_instant.elapsed().as_secs_f64();

        let hz = if elapsed > 0.0 {
            (ticks as f64 / elapsed) as u64
        } else {
            0
        };
        tracing::debug!(hz, "calibrated TSC");
        Self { hz: hz.max(1) }
    }

    /// Use a known frequency
    pub fn with_frequency(hz: u64) -> Self {
        Self { hz: hz.max(1) }
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn read_tsc() -> u64 {
    // SAFETY: rdtsc is available on every x86_64 CPU and has no side effects.
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(target_arch = "x86_64")]
impl Clock for TscClock {
    #[inline(always)]
    fn timestamp(&self) -> u64 {
        read_tsc()
    }

    fn frequency(&self) -> u64 {
        self.hz
    }
}

/// Best clock for the platform: calibrated TSC on x86_64, monotonic nanoseconds elsewhere
pub fn platform_clock() -> Arc<dyn Clock> {
    #[cfg(target_arch = "x86_64")]
    {
        Arc::new(TscClock::calibrate(Duration::from_millis(100)))
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        Arc::new(MonotonicClock::new())
    }
}

/// Hand-driven clock for deterministic tests
///
/// Queued ticks are handed out one per [`Clock::timestamp`] call; once the queue is empty
/// the last value repeats.
#[derive(Debug)]
pub struct ManualClock {
    hz: u64,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    script: VecDeque<u64>,
    now: u64,
}

impl ManualClock {
    /// Create clock at tick 0 running at `hz`
    pub fn new(hz: u64) -> Self {
        Self {
            hz: hz.max(1),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Queue ticks to be returned by upcoming `timestamp` calls
    pub fn script<I: IntoIterator<Item = u64>>(&self, ticks: I) {
        self.state.lock().script.extend(ticks);
    }

    /// Move the current tick forward
    pub fn advance(&self, ticks: u64) {
        self.state.lock().now += ticks;
    }
}

impl Clock for ManualClock {
    fn timestamp(&self) -> u64 {
        let mut state = self.state.lock();
        if let Some(tick) = state.script.pop_front() {
            state.now = tick;
        }
        state.now
    }

    fn frequency(&self) -> u64 {
        self.hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.timestamp();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.timestamp();
        assert!(b > a);
        assert!(clock.ticks_to_micros(b - a) >= 2_000.0);
    }

    #[test]
    fn test_manual_clock_script() {
        let clock = ManualClock::new(1_000_000);
        clock.script([10, 60]);
        assert_eq!(clock.timestamp(), 10);
        assert_eq!(clock.timestamp(), 60);
        assert_eq!(clock.timestamp(), 60);
        clock.advance(5);
        assert_eq!(clock.timestamp(), 65);
        assert_eq!(clock.ticks_to_micros(50), 50.0);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_tsc_calibration_is_sane() {
        let tsc = TscClock::calibrate(Duration::from_millis(20));
        // Anything between 100 MHz and 10 GHz is a plausible counter rate.
        assert!(tsc.frequency() > 100_000_000);
        assert!(tsc.frequency() < 10_000_000_000);
    }
}
