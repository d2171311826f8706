// Ring cache between the network and the decoder

use airwave_core::{AudioError, Result};
use airwave_ringbuffer::{ByteRingBuffer, SharedByteRing};
use parking_lot::MutexGuard;
use std::sync::atomic::{AtomicBool, Ordering};

/// Audio byte cache with readiness tracking
///
/// The cache is ready once it has been filled to capacity and stays ready
/// until a read window shrinks to `min_len` bytes or less.
pub struct RingCache {
    ring: SharedByteRing,
    capacity: usize,
    min_len: usize,
    ready: AtomicBool,
}

impl RingCache {
    pub fn new(capacity: usize, max_rw: usize, min_len: usize) -> Result<Self> {
        let ring = ByteRingBuffer::try_new(capacity, max_rw).map_err(|e| {
            AudioError::AllocationFailure(format!("Cache of {} bytes: {}", capacity, e))
        })?;

        log::debug!(
            "Cache created: {} bytes, {} byte windows",
            capacity,
            max_rw
        );

        Ok(Self {
            ring: SharedByteRing::new(ring),
            capacity,
            min_len,
            ready: AtomicBool::new(false),
        })
    }

    /// Lock the ring for window access
    pub fn lock(&self) -> MutexGuard<'_, ByteRingBuffer> {
        self.ring.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn len(&self) -> usize {
        self.ring.available_read()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn space(&self) -> usize {
        self.ring.available_write()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Cache found full: returns true on the not-ready to ready transition
    pub fn mark_full(&self) -> bool {
        !self.ready.swap(true, Ordering::AcqRel)
    }

    /// Whether a read window of `len` bytes is too short to decode from
    pub fn is_underrun(&self, len: usize) -> bool {
        len <= self.min_len
    }

    /// Cache underran: returns true when it was ready until now
    pub fn mark_underrun(&self) -> bool {
        self.ready.swap(false, Ordering::AcqRel)
    }

    /// Fill level in percent, 100 once the cache is ready
    pub fn fill_percent(&self) -> u8 {
        if self.is_ready() {
            return 100;
        }
        (self.len() * 100 / self.capacity.max(1)).min(100) as u8
    }
}
