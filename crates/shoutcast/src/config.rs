// Session configuration

use airwave_transport_http::HttpOptions;
use std::time::Duration;

/// Bitrate assumed when the server does not advertise one (kb/s)
pub const DEFAULT_BITRATE: u32 = 320;

/// Tunables of a streaming session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Seconds of audio held in the cache
    pub cache_seconds: u32,
    /// Explicit cache size in bytes, overriding `cache_seconds`
    pub cache_bytes: Option<usize>,
    /// Run the fill loop on a background thread
    pub use_thread: bool,
    /// Transport read timeout of one background fill cycle
    pub thread_timeout: Duration,
    /// Total time allowed to find the first frame at open
    pub sync_budget: Duration,
    /// Transport read timeout while synchronizing
    pub sync_read_timeout: Duration,
    /// Size of one pause buffer block
    pub block_size: usize,
    /// Period at which idle pause blocks are released
    pub pool_check_period: Duration,
    /// Idle blocks kept after each pool check
    pub pool_keep: usize,
    /// Bytes the pause buffer may hold before dropping its oldest block
    pub max_pause_bytes: usize,
    /// Read windows at or below this size count as an underrun
    pub min_cache_len: usize,
    /// Largest contiguous window handed to the decoder
    pub max_rw: usize,
    /// Consecutive undecodable frames tolerated before the stream is ended
    pub max_decode_failures: u32,
    pub http: HttpOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_seconds: 1,
            cache_bytes: None,
            use_thread: false,
            thread_timeout: Duration::from_millis(100),
            sync_budget: Duration::from_secs(5),
            sync_read_timeout: Duration::from_millis(1),
            block_size: 8192,
            pool_check_period: Duration::from_secs(30),
            pool_keep: 2,
            max_pause_bytes: 64 * 1024 * 1024,
            min_cache_len: 2048,
            max_rw: 8192,
            max_decode_failures: 64,
            http: HttpOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_seconds(mut self, seconds: u32) -> Self {
        // Zero falls back to the default length
        self.cache_seconds = if seconds > 0 { seconds } else { 1 };
        self
    }

    pub fn with_cache_bytes(mut self, bytes: usize) -> Self {
        self.cache_bytes = Some(bytes);
        self
    }

    pub fn with_thread(mut self, use_thread: bool) -> Self {
        self.use_thread = use_thread;
        self
    }

    pub fn with_thread_timeout(mut self, timeout: Duration) -> Self {
        self.thread_timeout = timeout;
        self
    }

    pub fn with_sync_budget(mut self, budget: Duration) -> Self {
        self.sync_budget = budget;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn with_pool_check_period(mut self, period: Duration) -> Self {
        self.pool_check_period = period;
        self
    }

    pub fn with_max_pause_bytes(mut self, bytes: usize) -> Self {
        self.max_pause_bytes = bytes;
        self
    }

    pub fn with_max_decode_failures(mut self, failures: u32) -> Self {
        self.max_decode_failures = failures;
        self
    }

    pub fn with_http(mut self, http: HttpOptions) -> Self {
        self.http = http;
        self
    }

    /// Cache capacity for a stream advertising `bitrate` kb/s (0 if unknown)
    pub fn cache_capacity(&self, bitrate: u32) -> usize {
        if let Some(bytes) = self.cache_bytes {
            return bytes;
        }
        let bitrate = if bitrate > 0 { bitrate } else { DEFAULT_BITRATE };
        self.cache_seconds as usize * 1000 * (bitrate / 8) as usize
    }
}
