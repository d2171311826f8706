// Byte ring buffer with contiguous read/write regions
//
// The backing store is `size + max_rw` bytes. The extra tail mirrors the start
// of the ring so that any region up to `max_rw` bytes is handed out as one
// contiguous slice, even when it wraps.

use parking_lot::{Mutex, MutexGuard};
use std::collections::TryReserveError;
use std::sync::Arc;

/// Ring buffer of bytes
pub struct ByteRingBuffer {
    buffer: Vec<u8>,
    size: usize,
    max_rw: usize,
    read_pos: usize,
    len: usize,
}

impl ByteRingBuffer {
    /// Create a ring holding `size` bytes, handing out regions of at most `max_rw`
    ///
    /// Reports allocation failure instead of aborting.
    pub fn try_new(size: usize, max_rw: usize) -> Result<Self, TryReserveError> {
        assert!(size > 0 && max_rw > 0, "ring buffer size must be non-zero");
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(size + max_rw)?;
        buffer.resize(size + max_rw, 0);
        Ok(Self {
            buffer,
            size,
            max_rw,
            read_pos: 0,
            len: 0,
        })
    }

    fn write_pos(&self) -> usize {
        (self.read_pos + self.len) % self.size
    }

    /// Contiguous free region, at most `max_rw` bytes
    pub fn write_region(&mut self) -> &mut [u8] {
        let n = self.available_write().min(self.max_rw);
        let start = self.write_pos();
        &mut self.buffer[start..start + n]
    }

    /// Publish `n` bytes written into the last write region
    pub fn commit_write(&mut self, n: usize) -> usize {
        let n = n.min(self.available_write()).min(self.max_rw);
        let start = self.write_pos();

        // Bytes written past the end belong at the start of the ring
        if start + n > self.size {
            let spill = start + n - self.size;
            self.buffer.copy_within(self.size..self.size + spill, 0);
        }

        self.len += n;
        n
    }

    /// Contiguous readable region, at most `max_rw` bytes
    pub fn read_region(&mut self) -> &[u8] {
        let n = self.len.min(self.max_rw);
        let start = self.read_pos;

        if start + n > self.size {
            let spill = start + n - self.size;
            self.buffer.copy_within(0..spill, self.size);
        }

        &self.buffer[start..start + n]
    }

    /// Drop `n` bytes from the front of the ring
    pub fn commit_read(&mut self, n: usize) -> usize {
        let n = n.min(self.len);
        self.read_pos = (self.read_pos + n) % self.size;
        self.len -= n;
        n
    }

    /// Copy as much of `data` as fits
    pub fn write(&mut self, data: &[u8]) -> usize {
        let mut written = 0;
        while written < data.len() {
            let region = self.write_region();
            let n = region.len().min(data.len() - written);
            if n == 0 {
                break;
            }
            region[..n].copy_from_slice(&data[written..written + n]);
            self.commit_write(n);
            written += n;
        }
        written
    }

    pub fn available_write(&self) -> usize {
        self.size - self.len
    }

    pub fn available_read(&self) -> usize {
        self.len
    }

    /// Largest region handed out by a single call
    pub fn max_region(&self) -> usize {
        self.max_rw
    }
}

/// Thread-safe wrapper for ByteRingBuffer
#[derive(Clone)]
pub struct SharedByteRing {
    inner: Arc<Mutex<ByteRingBuffer>>,
}

impl SharedByteRing {
    pub fn new(ring: ByteRingBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ring)),
        }
    }

    /// Lock the ring for region access
    pub fn lock(&self) -> MutexGuard<'_, ByteRingBuffer> {
        self.inner.lock()
    }

    pub fn available_write(&self) -> usize {
        self.inner.lock().available_write()
    }

    pub fn available_read(&self) -> usize {
        self.inner.lock().available_read()
    }
}
