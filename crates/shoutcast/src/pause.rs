// Time-shift buffer
//
// While paused, raw transport bytes are appended to a chain of fixed-size
// blocks. On resume the chain is replayed head first, ahead of live bytes.
// Replayed blocks return to a free pool that is trimmed periodically.

use airwave_core::{AudioError, Result};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One fixed-capacity block of buffered stream bytes
#[derive(Debug)]
pub struct StreamBlock {
    payload: Vec<u8>,
    consumed: usize,
}

impl StreamBlock {
    fn allocate(capacity: usize) -> Result<Self> {
        let mut payload = Vec::new();
        payload.try_reserve_exact(capacity).map_err(|e| {
            AudioError::AllocationFailure(format!("Pause block of {} bytes: {}", capacity, e))
        })?;
        Ok(Self {
            payload,
            consumed: 0,
        })
    }

    /// Bytes written but not yet replayed
    pub fn bytes_remaining(&self) -> usize {
        self.payload.len() - self.consumed
    }

    fn is_full(&self) -> bool {
        self.payload.len() == self.payload.capacity()
    }

    /// Append as much of `data` as fits
    fn fill(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.payload.capacity() - self.payload.len());
        self.payload.extend_from_slice(&data[..n]);
        n
    }

    /// Move up to `out.len()` unread bytes into `out`
    fn take(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.bytes_remaining());
        out[..n].copy_from_slice(&self.payload[self.consumed..self.consumed + n]);
        self.consumed += n;
        n
    }

    fn recycle(&mut self) {
        self.payload.clear();
        self.consumed = 0;
    }
}

/// Pause chain, free pool and pause-time accounting
pub struct PauseBuffer {
    block_size: usize,
    pool_keep: usize,
    check_period: Duration,
    max_bytes: usize,
    chain: VecDeque<StreamBlock>,
    pool: VecDeque<StreamBlock>,
    /// Unread bytes in the chain
    buffered: usize,
    /// Start of the running pause interval
    paused_since: Option<Instant>,
    /// Pause time represented by the chain and cache contents
    elapsed: Duration,
    /// Stream ended while paused: the clock no longer runs
    frozen: bool,
    /// Bytes to discard from the front of the buffered stream
    pending_skip: usize,
    last_pool_check: Instant,
}

impl PauseBuffer {
    pub fn new(
        block_size: usize,
        pool_keep: usize,
        check_period: Duration,
        max_bytes: usize,
        now: Instant,
    ) -> Self {
        Self {
            block_size: block_size.max(1),
            pool_keep,
            check_period,
            max_bytes,
            chain: VecDeque::new(),
            pool: VecDeque::new(),
            buffered: 0,
            paused_since: None,
            elapsed: Duration::ZERO,
            frozen: false,
            pending_skip: 0,
            last_pool_check: now,
        }
    }

    /// Start the pause clock (no-op when already running)
    pub fn start_clock(&mut self, now: Instant) {
        if self.paused_since.is_none() && !self.frozen {
            self.paused_since = Some(now);
        }
    }

    /// Fold the running interval into the elapsed time and stop the clock
    pub fn stop_clock(&mut self, now: Instant) {
        self.update_clock(now);
        self.paused_since = None;
    }

    /// Stream ended while paused: nothing more is buffered, stop counting
    pub fn freeze(&mut self, now: Instant) {
        self.stop_clock(now);
        self.frozen = true;
    }

    fn update_clock(&mut self, now: Instant) {
        if let Some(since) = self.paused_since {
            self.elapsed += now.saturating_duration_since(since);
            self.paused_since = Some(now);
        }
    }

    /// Pause time currently buffered
    pub fn elapsed(&mut self, now: Instant) -> Duration {
        self.update_clock(now);
        self.elapsed
    }

    pub fn elapsed_ms(&mut self, now: Instant) -> u64 {
        self.elapsed(now).as_millis() as u64
    }

    /// Append raw stream bytes to the chain
    pub fn absorb(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let needs_block = self.chain.back().map_or(true, StreamBlock::is_full);
            if needs_block {
                let block = match self.pool.pop_front() {
                    Some(block) => block,
                    None => StreamBlock::allocate(self.block_size)?,
                };
                self.chain.push_back(block);
            }

            if let Some(tail) = self.chain.back_mut() {
                let n = tail.fill(data);
                self.buffered += n;
                data = &data[n..];
            }
        }
        Ok(())
    }

    /// Replay up to `out.len()` bytes from the front of the chain
    pub fn drain(&mut self, out: &mut [u8], now: Instant) -> usize {
        let mut read = 0;

        while read < out.len() {
            let Some(head) = self.chain.front_mut() else {
                break;
            };

            let n = head.take(&mut out[read..]);
            let exhausted = head.bytes_remaining() == 0;
            let full = head.is_full();
            read += n;
            self.buffered -= n;

            // A partly written tail stays in place to keep absorbing
            if exhausted && (full || self.chain.len() > 1) {
                if let Some(block) = self.chain.pop_front() {
                    self.recycle(block, now);
                }
            } else if n == 0 {
                break;
            }
        }

        read
    }

    /// Remove the oldest block when the chain holds more than allowed
    ///
    /// Returns the block's unread bytes for the caller to demultiplex, and
    /// reduces the elapsed pause time in proportion.
    pub fn evict_over_limit(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.buffered <= self.max_bytes || self.chain.len() < 2 {
            return None;
        }

        let mut block = self.chain.pop_front()?;
        let mut bytes = vec![0u8; block.bytes_remaining()];
        block.take(&mut bytes);

        self.update_clock(now);
        let before = self.buffered as u128;
        self.buffered -= bytes.len();
        self.pending_skip = self.pending_skip.saturating_sub(bytes.len());
        let kept = self.elapsed.as_nanos() * self.buffered as u128 / before.max(1);
        self.elapsed = Duration::from_nanos(kept as u64);

        self.recycle(block, now);
        log::debug!(
            "Pause buffer over {} bytes, dropped {} oldest bytes",
            self.max_bytes,
            bytes.len()
        );
        Some(bytes)
    }

    fn recycle(&mut self, mut block: StreamBlock, now: Instant) {
        block.recycle();
        self.pool.push_back(block);

        if now.saturating_duration_since(self.last_pool_check) >= self.check_period {
            self.last_pool_check = now;
            if self.pool.len() > self.pool_keep {
                log::debug!(
                    "Releasing {} idle pause blocks",
                    self.pool.len() - self.pool_keep
                );
                self.pool.truncate(self.pool_keep);
            }
        }
    }

    /// Schedule `ms` of buffered pause time to be skipped
    ///
    /// `cached` is the audio held in the cache, which is discarded before
    /// the chain. Time maps to bytes assuming a constant bitrate across the
    /// pause. Returns the milliseconds actually skipped, never more than the
    /// elapsed pause time and 0 when nothing is left to discard.
    pub fn skip(&mut self, ms: u64, cached: usize, now: Instant) -> u64 {
        let elapsed_ms = self.elapsed_ms(now);
        if elapsed_ms == 0 {
            return 0;
        }

        let unskipped = (self.buffered + cached).saturating_sub(self.pending_skip);
        if unskipped == 0 {
            self.elapsed = Duration::ZERO;
            return 0;
        }

        let ms = ms.min(elapsed_ms);
        let bytes = ms as u128 * unskipped as u128 / elapsed_ms as u128;
        self.pending_skip += bytes as usize;
        self.elapsed = self.elapsed.saturating_sub(Duration::from_millis(ms));
        ms
    }

    /// Skip everything buffered and reset the clock
    pub fn skip_all(&mut self) {
        self.pending_skip = usize::MAX;
        self.elapsed = Duration::ZERO;
        self.paused_since = None;
        self.frozen = false;
    }

    pub fn pending_skip(&self) -> usize {
        self.pending_skip
    }

    /// Record that `n` bytes of the pending skip were discarded
    pub fn consume_skip(&mut self, n: usize) {
        self.pending_skip = self.pending_skip.saturating_sub(n);
    }

    /// Nothing left to skip in the chain: drop the rest of the request
    pub fn finish_skip(&mut self) {
        self.pending_skip = 0;
        if self.chain_is_empty() {
            self.elapsed = Duration::ZERO;
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn chain_is_empty(&self) -> bool {
        self.buffered == 0
    }

    pub fn chain_blocks(&self) -> usize {
        self.chain.len()
    }

    pub fn pool_blocks(&self) -> usize {
        self.pool.len()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 8192;

    fn buffer(now: Instant) -> PauseBuffer {
        PauseBuffer::new(BLOCK, 2, Duration::from_secs(30), usize::MAX, now)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_absorb_then_drain_in_order() {
        let t0 = Instant::now();
        let mut pause = buffer(t0);
        let data = pattern(3 * BLOCK + 100);

        for chunk in data.chunks(1000) {
            pause.absorb(chunk).unwrap();
        }
        assert_eq!(pause.buffered(), data.len());
        assert_eq!(pause.chain_blocks(), 4);

        let mut out = Vec::new();
        let mut chunk = [0u8; 3000];
        loop {
            let n = pause.drain(&mut chunk, t0);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(out, data);
        assert!(pause.chain_is_empty());
        assert_eq!(pause.pool_blocks(), 3);
    }

    #[test]
    fn test_pool_blocks_are_reused() {
        let t0 = Instant::now();
        let mut pause = buffer(t0);
        pause.absorb(&pattern(2 * BLOCK)).unwrap();
        let mut out = vec![0u8; 2 * BLOCK];
        assert_eq!(pause.drain(&mut out, t0), 2 * BLOCK);
        assert_eq!(pause.pool_blocks(), 2);

        pause.absorb(&pattern(BLOCK + 1)).unwrap();
        assert_eq!(pause.pool_blocks(), 0);
        assert_eq!(pause.chain_blocks(), 2);
    }

    #[test]
    fn test_pool_trimmed_after_check_period() {
        let t0 = Instant::now();
        let mut pause = buffer(t0);
        pause.absorb(&pattern(6 * BLOCK)).unwrap();

        let mut out = vec![0u8; 4 * BLOCK];
        pause.drain(&mut out, t0 + Duration::from_secs(1));
        assert_eq!(pause.pool_blocks(), 4);

        // First recycle after the period trims the pool
        let mut out = vec![0u8; BLOCK];
        pause.drain(&mut out, t0 + Duration::from_secs(31));
        assert_eq!(pause.pool_blocks(), 2);
    }

    #[test]
    fn test_pause_clock() {
        let t0 = Instant::now();
        let mut pause = buffer(t0);

        pause.start_clock(t0);
        pause.start_clock(t0 + Duration::from_millis(500));
        assert_eq!(pause.elapsed_ms(t0 + Duration::from_millis(1200)), 1200);

        pause.stop_clock(t0 + Duration::from_millis(2000));
        assert_eq!(pause.elapsed_ms(t0 + Duration::from_millis(9000)), 2000);

        pause.start_clock(t0 + Duration::from_millis(10_000));
        pause.freeze(t0 + Duration::from_millis(10_500));
        pause.start_clock(t0 + Duration::from_millis(11_000));
        assert_eq!(pause.elapsed_ms(t0 + Duration::from_millis(20_000)), 2500);
        assert!(pause.is_frozen());
    }

    #[test]
    fn test_skip_is_proportional_and_clamped() {
        // Three full blocks buffered over a 5000 ms pause
        let t0 = Instant::now();
        let mut pause = buffer(t0);
        pause.start_clock(t0);
        pause.absorb(&pattern(3 * BLOCK)).unwrap();
        pause.stop_clock(t0 + Duration::from_millis(5000));

        let now = t0 + Duration::from_millis(5000);
        assert_eq!(pause.skip(2000, 0, now), 2000);
        assert_eq!(pause.pending_skip(), 2000 * 3 * BLOCK / 5000);
        assert!(pause.elapsed_ms(now) <= 3000);

        // Only 3000 ms are left to skip
        assert_eq!(pause.skip(10_000, 0, now), 3000);
        assert_eq!(pause.pending_skip(), 3 * BLOCK);
        assert_eq!(pause.elapsed_ms(now), 0);
        assert_eq!(pause.skip(100, 0, now), 0);
    }

    #[test]
    fn test_skip_counts_cached_audio() {
        // The chain has drained into the cache but the time shift remains
        let t0 = Instant::now();
        let mut pause = buffer(t0);
        pause.start_clock(t0);
        pause.stop_clock(t0 + Duration::from_millis(50));

        let now = t0 + Duration::from_millis(80);
        assert!(pause.chain_is_empty());
        assert_eq!(pause.skip(30, 15_000, now), 30);
        assert_eq!(pause.pending_skip(), 30 * 15_000 / 50);
        assert_eq!(pause.elapsed_ms(now), 20);
    }

    #[test]
    fn test_skip_with_nothing_buffered() {
        let t0 = Instant::now();
        let mut pause = buffer(t0);
        pause.start_clock(t0);
        pause.stop_clock(t0 + Duration::from_millis(50));

        let now = t0 + Duration::from_millis(60);
        assert_eq!(pause.skip(30, 0, now), 0);
        assert_eq!(pause.pending_skip(), 0);
        assert_eq!(pause.elapsed_ms(now), 0);
    }

    #[test]
    fn test_skip_accounting() {
        let t0 = Instant::now();
        let mut pause = buffer(t0);
        pause.absorb(&pattern(BLOCK)).unwrap();
        pause.skip_all();
        assert_eq!(pause.pending_skip(), usize::MAX);

        pause.consume_skip(BLOCK);
        assert!(pause.pending_skip() > 0);
        let mut out = vec![0u8; BLOCK];
        pause.drain(&mut out, t0);
        pause.finish_skip();
        assert_eq!(pause.pending_skip(), 0);
        assert_eq!(pause.elapsed_ms(t0), 0);
    }

    #[test]
    fn test_evict_over_limit() {
        let t0 = Instant::now();
        let mut pause = PauseBuffer::new(BLOCK, 2, Duration::from_secs(30), 2 * BLOCK, t0);
        pause.start_clock(t0);
        let data = pattern(3 * BLOCK);
        pause.absorb(&data).unwrap();
        pause.stop_clock(t0 + Duration::from_millis(3000));

        let evicted = pause.evict_over_limit(t0).unwrap();
        assert_eq!(evicted, &data[..BLOCK]);
        assert_eq!(pause.buffered(), 2 * BLOCK);
        assert_eq!(pause.elapsed_ms(t0), 2000);
        assert!(pause.evict_over_limit(t0).is_none());

        let mut out = vec![0u8; BLOCK];
        pause.drain(&mut out, t0);
        assert_eq!(out, &data[BLOCK..2 * BLOCK]);
    }
}
