//! Burst transport
//!
//! [`PacketIo`] is the narrow, non-blocking port interface the engines are written against.
//! Every call may complete partially: `submit` may accept only a prefix of the offered
//! frames and `receive` may return nothing at all. Callers poll; nothing here blocks.

use crate::buffer::Frame;
use crate::error::Result;
use crate::ether::MacAddr;

pub mod sim;

#[cfg(target_os = "linux")]
pub mod packet_socket;

pub use sim::SimNetwork;

#[cfg(target_os = "linux")]
pub use packet_socket::PacketSocketIo;

/// Port identifier
pub type PortId = u16;

/// Queue identifier within a port
pub type QueueId = u16;

/// Non-blocking packet I/O on a set of ports
///
/// Implementations must be safe to drive from one thread per port concurrently: a port's
/// RX queue is only ever polled by one thread, but its TX queue may be fed by the thread
/// servicing the paired port.
pub trait PacketIo: Send + Sync {
    /// Hand frames to the TX queue of `port`.
    ///
    /// Accepted frames are removed from the front of `frames` and now belong to the
    /// transport; the rejected suffix stays with the caller in its original order. Returns
    /// the number accepted, which may be zero.
    fn submit(&self, port: PortId, queue: QueueId, frames: &mut Vec<Frame>) -> usize;

    /// Move newly arrived frames from the RX queue of `port` into `burst`, up to its free
    /// capacity. Returns the number received; zero means nothing was ready.
    fn receive(&self, port: PortId, queue: QueueId, burst: &mut BurstBatch) -> usize;

    /// Hardware address of `port`
    fn local_address(&self, port: PortId) -> Result<MacAddr>;

    /// Ports served by this transport, in ascending order
    fn ports(&self) -> Vec<PortId>;
}

/// Bounded batch of frames for one receive or transmit call
#[derive(Debug)]
pub struct BurstBatch {
    frames: Vec<Frame>,
    capacity: usize,
}

impl BurstBatch {
    /// Create empty batch holding at most `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a frame; hands it back when the batch is full
    #[inline]
    pub fn push(&mut self, frame: Frame) -> std::result::Result<(), Frame> {
        if self.is_full() {
            return Err(frame);
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Number of frames held
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Check if full
    #[inline]
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Maximum number of frames
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots left
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.frames.len())
    }

    /// Frames as a vector, for passing to [`PacketIo::submit`]
    #[inline]
    pub fn frames_mut(&mut self) -> &mut Vec<Frame> {
        &mut self.frames
    }

    /// Move every frame out, in arrival order
    #[inline]
    pub fn drain(&mut self) -> std::vec::Drain<'_, Frame> {
        self.frames.drain(..)
    }

    /// Free every frame still held
    #[inline]
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Submit `frames` until every one has been accepted.
///
/// Spins on the TX queue without backoff: the only contention is the hardware queue
/// draining. Returns the number of frames sent, i.e. the original length of `frames`.
#[inline]
pub fn submit_all<I>(io: &I, port: PortId, queue: QueueId, frames: &mut Vec<Frame>) -> usize
where
    I: PacketIo + ?Sized,
{
    let mut sent = 0;
    while !frames.is_empty() {
        let accepted = io.submit(port, queue, frames);
        if accepted == 0 {
            std::hint::spin_loop();
        }
        sent += accepted;
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FramePool;

    #[test]
    fn test_burst_batch_bounds() {
        let pool = FramePool::new(8);
        let mut burst = BurstBatch::with_capacity(2);

        assert!(burst.push(pool.alloc().unwrap()).is_ok());
        assert!(burst.push(pool.alloc().unwrap()).is_ok());
        assert!(burst.is_full());
        assert_eq!(burst.remaining(), 0);

        let rejected = burst.push(pool.alloc().unwrap()).unwrap_err();
        drop(rejected);
        assert_eq!(pool.allocated(), 2);

        burst.clear();
        assert!(burst.is_empty());
        assert_eq!(pool.available(), 8);
    }

    #[test]
    fn test_burst_drain_keeps_order() {
        let pool = FramePool::new(8);
        let mut burst = BurstBatch::with_capacity(4);
        let mut expected = Vec::new();
        for _ in 0..3 {
            let frame = pool.alloc().unwrap();
            expected.push(frame.index());
            burst.push(frame).unwrap();
        }

        let order: Vec<u32> = burst.drain().map(|f| f.index()).collect();
        assert_eq!(order, expected);
        assert!(burst.is_empty());
    }
}
