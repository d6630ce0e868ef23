//! Frame Buffer Pool
//!
//! Pre-allocated, fixed-capacity frame buffers handed out as owned [`Frame`]s.
//!
//! # Design
//!
//! - All buffers are allocated once, when the pool is created
//! - Lock-free acquisition/release through a bounded free list
//! - A [`Frame`] is owned by exactly one holder at a time and is not `Clone`
//! - Dropping a [`Frame`] returns its storage to the pool it came from

use crate::error::{DataplaneError, Result};
use crossbeam::queue::ArrayQueue;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default buffer capacity (data room of one frame)
pub const BUFFER_SIZE: usize = 2048;

/// Per-core cache size used by the pool sizing rule
pub const POOL_CACHE_SIZE: usize = 128;

/// Lower bound on pool size
pub const MIN_POOL_SIZE: usize = 8192;

/// Number of buffers needed to keep `ports` ports fed.
///
/// Every port may hold a full RX ring and TX ring plus one burst in flight and one cache
/// worth of buffers, with a floor of [`MIN_POOL_SIZE`].
pub fn pool_size_for(ports: usize, rx_ring: usize, tx_ring: usize, burst: usize) -> usize {
    (ports * (rx_ring + tx_ring + burst + POOL_CACHE_SIZE)).max(MIN_POOL_SIZE)
}

struct Slot {
    index: u32,
    data: Box<[u8]>,
}

struct PoolShared {
    free_list: ArrayQueue<Slot>,
    size: usize,
    buffer_size: usize,
    allocated: AtomicUsize,
}

/// Owned frame buffer
///
/// The first `len()` bytes of the storage are the frame, starting with the Ethernet header.
pub struct Frame {
    index: u32,
    data_len: usize,
    data: Box<[u8]>,
    pool: Arc<PoolShared>,
}

impl Frame {
    /// Frame bytes
    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_len]
    }

    /// Mutable frame bytes
    #[inline(always)]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.data_len]
    }

    #[inline(always)]
    pub(crate) fn storage(&self) -> &[u8] {
        &self.data
    }

    /// Whole buffer regardless of the current length, for drivers filling the frame
    #[inline(always)]
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Frame length
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data_len
    }

    /// Check if empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data_len == 0
    }

    /// Buffer capacity
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Unused bytes after the frame
    #[inline(always)]
    pub fn tailroom(&self) -> usize {
        self.capacity() - self.data_len
    }

    /// Set frame length
    #[inline]
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.capacity() {
            return Err(DataplaneError::FrameTooLarge {
                len,
                capacity: self.capacity(),
            });
        }
        self.data_len = len;
        Ok(())
    }

    /// Append data (use tailroom)
    #[inline]
    pub fn append(&mut self, len: usize) -> Option<&mut [u8]> {
        if self.tailroom() < len {
            return None;
        }
        let start = self.data_len;
        self.data_len += len;
        Some(&mut self.data[start..start + len])
    }

    /// Get index in pool
    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn reset(&mut self) {
        self.data_len = 0;
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("len", &self.data_len)
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let slot = Slot {
            index: self.index,
            data: std::mem::take(&mut self.data),
        };
        // The free list is sized for every buffer of the pool, so this cannot overflow.
        let _ = self.pool.free_list.push(slot);
        self.pool.allocated.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Frame pool (pre-allocated, lock-free)
///
/// Cheap to clone; clones share the same buffers.
#[derive(Clone)]
pub struct FramePool {
    shared: Arc<PoolShared>,
}

impl FramePool {
    /// Create pool of `size` buffers of [`BUFFER_SIZE`] bytes
    pub fn new(size: usize) -> Self {
        Self::with_buffer_size(size, BUFFER_SIZE)
    }

    /// Create pool of `size` buffers of `buffer_size` bytes
    pub fn with_buffer_size(size: usize, buffer_size: usize) -> Self {
        let size = size.max(1);
        let free_list = ArrayQueue::new(size);
        for i in 0..size {
            let _ = free_list.push(Slot {
                index: i as u32,
                data: vec![0u8; buffer_size].into_boxed_slice(),
            });
        }

        Self {
            shared: Arc::new(PoolShared {
                free_list,
                size,
                buffer_size,
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    /// Allocate frame from pool
    #[inline]
    pub fn alloc(&self) -> Result<Frame> {
        let slot = self
            .shared
            .free_list
            .pop()
            .ok_or(DataplaneError::OutOfBuffers)?;
        self.shared.allocated.fetch_add(1, Ordering::Relaxed);

        let mut frame = Frame {
            index: slot.index,
            data_len: 0,
            data: slot.data,
            pool: Arc::clone(&self.shared),
        };
        frame.reset();
        Ok(frame)
    }

    /// Free frame back to pool
    #[inline]
    pub fn free(&self, frame: Frame) {
        drop(frame);
    }

    /// Get available count
    pub fn available(&self) -> usize {
        self.shared.free_list.len()
    }

    /// Get allocated count
    pub fn allocated(&self) -> usize {
        self.shared.allocated.load(Ordering::Relaxed)
    }

    /// Get pool size
    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Capacity of every buffer in the pool
    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("size", &self.size())
            .field("available", &self.available())
            .field("buffer_size", &self.buffer_size())
            .finish()
    }
}
