//! In-memory NIC model
//!
//! Every port has a bounded RX ring. A port's TX side is either cabled to another port
//! (transmitted frames land in the peer's RX ring) or captured into a bounded TX ring that
//! the owner drains. Rings are lock-free and bounded, so a full ring makes `submit` accept
//! only part of a burst, the same way a real descriptor ring does.

use super::{BurstBatch, PacketIo, PortId, QueueId};
use crate::buffer::Frame;
use crate::error::{DataplaneError, Result};
use crate::ether::MacAddr;
use crossbeam::queue::ArrayQueue;

#[derive(Debug, Clone, Copy)]
enum Link {
    Cable(usize),
    Capture,
}

struct SimPort {
    id: PortId,
    mac: MacAddr,
    rx: ArrayQueue<Frame>,
    tx: ArrayQueue<Frame>,
    link: Link,
}

/// Simulated multi-port network
///
/// Only queue 0 exists on each port; other queue ids neither accept nor return frames.
pub struct SimNetwork {
    ports: Vec<SimPort>,
}

impl SimNetwork {
    /// Create `count` ports with ids `0..count`, each with `ring_size` RX and TX descriptors
    /// and TX captured. Port `n` gets address [`MacAddr::local`]`(n)`.
    pub fn new(count: u16, ring_size: usize) -> Self {
        let ring_size = ring_size.max(1);
        let ports = (0..count)
            .map(|id| SimPort {
                id,
                mac: MacAddr::local(id),
                rx: ArrayQueue::new(ring_size),
                tx: ArrayQueue::new(ring_size),
                link: Link::Capture,
            })
            .collect();
        Self { ports }
    }

    /// Two ports joined by a cable, the usual back-to-back benchmark setup
    pub fn back_to_back(ring_size: usize) -> Self {
        Self::new(2, ring_size).with_cable(0, 1)
    }

    /// Cable two ports together in both directions
    pub fn with_cable(mut self, a: PortId, b: PortId) -> Self {
        if let (Some(ia), Some(ib)) = (self.position(a), self.position(b)) {
            self.ports[ia].link = Link::Cable(ib);
            self.ports[ib].link = Link::Cable(ia);
        }
        self
    }

    /// Resize the capture ring of `port`, limiting how many frames it accepts before it is
    /// drained
    pub fn with_tx_capacity(mut self, port: PortId, capacity: usize) -> Self {
        if let Some(idx) = self.position(port) {
            self.ports[idx].tx = ArrayQueue::new(capacity.max(1));
        }
        self
    }

    /// Override the address of `port`
    pub fn with_address(mut self, port: PortId, mac: MacAddr) -> Self {
        if let Some(idx) = self.position(port) {
            self.ports[idx].mac = mac;
        }
        self
    }

    /// Deliver a frame to the RX ring of `port`, as if it arrived from the wire. Hands the
    /// frame back when the ring is full or the port does not exist.
    pub fn inject(&self, port: PortId, frame: Frame) -> std::result::Result<(), Frame> {
        match self.port(port) {
            Some(p) => p.rx.push(frame),
            None => Err(frame),
        }
    }

    /// Drain every frame captured on the TX side of `port`
    pub fn take_transmitted(&self, port: PortId) -> Vec<Frame> {
        let mut out = Vec::new();
        if let Some(p) = self.port(port) {
            while let Some(frame) = p.tx.pop() {
                out.push(frame);
            }
        }
        out
    }

    /// Frames waiting in the RX ring of `port`
    pub fn rx_pending(&self, port: PortId) -> usize {
        self.port(port).map_or(0, |p| p.rx.len())
    }

    /// Frames waiting in the capture ring of `port`
    pub fn tx_pending(&self, port: PortId) -> usize {
        self.port(port).map_or(0, |p| p.tx.len())
    }

    fn position(&self, port: PortId) -> Option<usize> {
        self.ports.iter().position(|p| p.id == port)
    }

    fn port(&self, port: PortId) -> Option<&SimPort> {
        self.ports.iter().find(|p| p.id == port)
    }

    fn tx_ring<'a>(&'a self, port: &'a SimPort) -> &'a ArrayQueue<Frame> {
        match port.link {
            Link::Cable(peer) => &self.ports[peer].rx,
            Link::Capture => &port.tx,
        }
    }
}

impl PacketIo for SimNetwork {
    fn submit(&self, port: PortId, queue: QueueId, frames: &mut Vec<Frame>) -> usize {
        let Some(p) = self.port(port) else {
            return 0;
        };
        if queue != 0 || frames.is_empty() {
            return 0;
        }

        let ring = self.tx_ring(p);
        let mut accepted = 0;
        let mut pending = std::mem::take(frames).into_iter();
        for frame in pending.by_ref() {
            if let Err(frame) = ring.push(frame) {
                frames.push(frame);
                break;
            }
            accepted += 1;
        }
        frames.extend(pending);
        accepted
    }

    fn receive(&self, port: PortId, queue: QueueId, burst: &mut BurstBatch) -> usize {
        let Some(p) = self.port(port) else {
            return 0;
        };
        if queue != 0 {
            return 0;
        }

        let mut received = 0;
        while !burst.is_full() {
            let Some(frame) = p.rx.pop() else {
                break;
            };
            if let Err(frame) = burst.push(frame) {
                // Not reachable while the batch has room; keep the frame rather than lose it.
                let _ = p.rx.push(frame);
                break;
            }
            received += 1;
        }
        received
    }

    fn local_address(&self, port: PortId) -> Result<MacAddr> {
        self.port(port)
            .map(|p| p.mac)
            .ok_or(DataplaneError::InvalidPort(port))
    }

    fn ports(&self) -> Vec<PortId> {
        let mut ids: Vec<PortId> = self.ports.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FramePool;
    use std::collections::HashSet;

    fn frames(pool: &FramePool, n: usize) -> Vec<Frame> {
        (0..n).map(|_| pool.alloc().unwrap()).collect()
    }

    #[test]
    fn test_cable_delivers_to_peer() {
        let pool = FramePool::new(16);
        let net = SimNetwork::back_to_back(8);

        let mut out = frames(&pool, 3);
        assert_eq!(net.submit(0, 0, &mut out), 3);
        assert!(out.is_empty());
        assert_eq!(net.rx_pending(1), 3);
        assert_eq!(net.rx_pending(0), 0);

        let mut burst = BurstBatch::with_capacity(32);
        assert_eq!(net.receive(1, 0, &mut burst), 3);
        assert_eq!(net.receive(1, 0, &mut burst), 0);
    }

    #[test]
    fn test_partial_submit_keeps_suffix() {
        let pool = FramePool::new(16);
        let net = SimNetwork::new(2, 8).with_tx_capacity(1, 4);

        let mut out = frames(&pool, 6);
        let order: Vec<u32> = out.iter().map(Frame::index).collect();

        assert_eq!(net.submit(1, 0, &mut out), 4);
        assert_eq!(out.iter().map(Frame::index).collect::<Vec<_>>(), &order[4..]);
        assert_eq!(net.submit(1, 0, &mut out), 0);

        let sent: Vec<u32> = net.take_transmitted(1).iter().map(Frame::index).collect();
        assert_eq!(sent, &order[..4]);
    }

    #[test]
    fn test_receive_respects_burst_capacity() {
        let pool = FramePool::new(16);
        let net = SimNetwork::new(1, 16);
        for frame in frames(&pool, 10) {
            net.inject(0, frame).unwrap();
        }

        let mut burst = BurstBatch::with_capacity(4);
        assert_eq!(net.receive(0, 0, &mut burst), 4);
        assert_eq!(net.rx_pending(0), 6);
    }

    #[test]
    fn test_unknown_port_and_queue() {
        let pool = FramePool::new(4);
        let net = SimNetwork::new(2, 4);

        let mut out = frames(&pool, 2);
        assert_eq!(net.submit(7, 0, &mut out), 0);
        assert_eq!(net.submit(0, 1, &mut out), 0);
        assert_eq!(out.len(), 2);
        assert!(matches!(net.local_address(7), Err(DataplaneError::InvalidPort(7))));
        assert_eq!(net.local_address(1).unwrap(), MacAddr::local(1));
    }

    #[test]
    fn test_burst_conservation() {
        let pool = FramePool::new(64);
        let net = SimNetwork::new(2, 64).with_tx_capacity(0, 5);

        let mut out = frames(&pool, 12);
        let mut accepted = 0;
        let mut seen = HashSet::new();
        for _ in 0..4 {
            accepted += net.submit(0, 0, &mut out);
            for frame in net.take_transmitted(0) {
                assert!(seen.insert(frame.index()), "frame transmitted twice");
            }
        }

        assert_eq!(accepted, 12);
        assert_eq!(seen.len(), accepted);
        assert!(out.is_empty());
    }
}
