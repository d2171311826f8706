// Streaming session: fill loop, decode path and playback controls
//
// Lock order: feed -> control -> cache ring -> metadata. Events are collected
// while locks are held and dispatched once every lock is released.

use crate::cache::RingCache;
use crate::config::SessionConfig;
use crate::info::RadioInfo;
use crate::metadata::{DemuxSink, Demuxer, MetadataQueue};
use crate::pause::PauseBuffer;
use crate::sync::{discardable, find_first_frame, sync_size};
use airwave_core::{
    AudioError, AudioFormat, Codec, DecoderOpener, EventDispatcher, FrameDecoder, Result,
    StreamCallback, StreamEvent, StreamStatus,
};
use airwave_decode_symphonia::open_decoder;
use airwave_ringbuffer::ByteRingBuffer;
use airwave_transport_http::{HttpTransport, ReadStatus, Transport};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Transport side of the session, touched only by the fill path
struct Feed {
    transport: Box<dyn Transport>,
    demuxer: Demuxer,
    scratch: Vec<u8>,
}

/// Playback state guarded by the pause lock
struct Control {
    paused: bool,
    /// Samples have been produced since the cache became ready
    playing: bool,
    /// The read position must be moved to a frame boundary
    resync: bool,
    /// Samples decoded before a skip must not be played
    flush_decoded: bool,
    pause: PauseBuffer,
}

struct Reader {
    decoder: Box<dyn FrameDecoder>,
    /// Consecutive frames that could not be decoded
    failures: u32,
}

/// Writes demultiplexed audio to the cache and queues metadata at the
/// cache's write position
struct CacheSink<'a> {
    ring: MutexGuard<'a, ByteRingBuffer>,
    metadata: &'a Mutex<MetadataQueue>,
    keep_audio: bool,
    audio: usize,
}

impl DemuxSink for CacheSink<'_> {
    fn audio(&mut self, data: &[u8]) {
        self.audio += data.len();
        if self.keep_audio {
            let written = self.ring.write(data);
            if written < data.len() {
                log::warn!("Cache overflow, dropped {} bytes", data.len() - written);
            }
        }
    }

    fn metadata(&mut self, text: String) {
        let distance = self.ring.available_read();
        self.metadata.lock().push(text, distance);
    }
}

struct Shared {
    config: SessionConfig,
    info: RadioInfo,
    codec: Codec,
    sync_size: usize,
    feed: Mutex<Feed>,
    control: Mutex<Control>,
    cache: RingCache,
    metadata: Mutex<MetadataQueue>,
    events: EventDispatcher,
    reader: Mutex<Option<Reader>>,
    format: Mutex<AudioFormat>,
    /// Transport has ended or failed
    eos: AtomicBool,
    /// Session is stopped; also the stop signal of the fill thread
    stopped: AtomicBool,
    end_signalled: AtomicBool,
}

/// A time-shiftable radio stream
pub struct Session {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Connect to `url` and synchronize on the first audio frame
    pub fn open(url: &str, config: SessionConfig) -> Result<Self> {
        let transport = HttpTransport::connect(url, &config.http)?;
        Self::open_with(Box::new(transport), Box::new(open_decoder), config)
    }

    /// Open a session over an already connected transport
    pub fn open_with(
        transport: Box<dyn Transport>,
        opener: DecoderOpener,
        config: SessionConfig,
    ) -> Result<Self> {
        let info = RadioInfo::from_headers(transport.headers())?;
        let codec = info.codec().ok_or_else(|| {
            AudioError::UnsupportedFormat(format!("Unsupported content type: {}", info.content_type))
        })?;

        let sync_size = sync_size(codec);
        let max_rw = config.max_rw.max(sync_size);
        let capacity = config
            .cache_capacity(info.bitrate)
            .max(sync_size)
            .max(config.min_cache_len + 1);
        let cache = RingCache::new(capacity, max_rw, config.min_cache_len)?;

        log::info!(
            "Opening {:?} stream {:?}: {} kb/s, metaint {}, cache {} bytes",
            codec,
            info.name.as_deref().unwrap_or("(unnamed)"),
            info.bitrate,
            info.metaint,
            capacity
        );

        let mut scratch = Vec::new();
        scratch.try_reserve_exact(max_rw.max(config.block_size))?;
        scratch.resize(max_rw.max(config.block_size), 0);

        let now = Instant::now();
        let shared = Arc::new(Shared {
            feed: Mutex::new(Feed {
                transport,
                demuxer: Demuxer::new(info.metaint),
                scratch,
            }),
            control: Mutex::new(Control {
                paused: false,
                playing: false,
                resync: false,
                flush_decoded: false,
                pause: PauseBuffer::new(
                    config.block_size,
                    config.pool_keep,
                    config.pool_check_period,
                    config.max_pause_bytes,
                    now,
                ),
            }),
            cache,
            metadata: Mutex::new(MetadataQueue::new()),
            events: EventDispatcher::new(),
            reader: Mutex::new(None),
            format: Mutex::new(AudioFormat::default()),
            eos: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            end_signalled: AtomicBool::new(false),
            config,
            info,
            codec,
            sync_size,
        });

        // No READY while the cache is primed
        shared.cache.set_ready(true);
        shared.synchronize()?;

        let decoder = {
            let mut ring = shared.cache.lock();
            opener(codec, ring.read_region())?
        };
        *shared.format.lock() = decoder.format();
        *shared.reader.lock() = Some(Reader {
            decoder,
            failures: 0,
        });
        shared.cache.set_ready(false);

        let worker = if shared.config.use_thread {
            let thread_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name("airwave-fill".to_string())
                .spawn(move || thread_shared.run_fill_loop())
                .map_err(|e| AudioError::ThreadError(format!("Failed to spawn fill thread: {}", e)))?;
            Some(handle)
        } else {
            None
        };

        Ok(Self {
            shared,
            worker: Mutex::new(worker),
        })
    }

    /// Decode up to `out.len()` interleaved samples
    ///
    /// Returns 0 while buffering or paused. Returns `Err(EndOfStream)` once
    /// the stream has ended and everything buffered has been played. A call
    /// returns early when the output format changes; check `format()`
    /// after each call.
    pub fn read(&self, out: &mut [f32]) -> Result<usize> {
        let mut events = Vec::new();
        let result = self.shared.read(out, &mut events);
        self.shared.events.dispatch_all(events);
        result
    }

    /// Run one fill cycle, waiting at most `timeout` for the transport
    ///
    /// `read` does this itself when the session has no fill thread.
    pub fn fill(&self, timeout: Duration) -> Result<()> {
        self.shared.fill_and_dispatch(timeout)
    }

    /// Resume playback, replaying what was buffered while paused
    pub fn play(&self) -> Result<()> {
        self.shared.ensure_running()?;
        let mut control = self.shared.control.lock();
        if control.paused {
            control.paused = false;
            control.pause.stop_clock(Instant::now());
            log::info!(
                "Resuming with {} bytes time-shifted",
                control.pause.buffered()
            );
        }
        Ok(())
    }

    /// Pause playback; the stream keeps flowing into the pause buffer
    pub fn pause(&self) -> Result<()> {
        self.shared.ensure_running()?;
        let now = Instant::now();
        let mut control = self.shared.control.lock();
        if !control.paused {
            control.paused = true;
            control.playing = false;
            control.pause.start_clock(now);
            if self.shared.eos.load(Ordering::Acquire) {
                control.pause.freeze(now);
            }
            log::info!("Paused");
        }
        Ok(())
    }

    /// Skip `ms` of time-shifted audio, returning the milliseconds skipped
    pub fn skip(&self, ms: u64) -> u64 {
        let mut control = self.shared.control.lock();
        let cached = self.shared.cache.len();
        let skipped = control.pause.skip(ms, cached, Instant::now());
        if skipped > 0 {
            log::info!(
                "Skipping {} ms ({} bytes pending)",
                skipped,
                control.pause.pending_skip()
            );
        }
        skipped
    }

    /// Time-shifted audio currently buffered, in milliseconds
    pub fn pause_duration(&self) -> u64 {
        self.shared.control.lock().pause.elapsed_ms(Instant::now())
    }

    /// Drop everything time-shifted and return to the live stream
    pub fn reset_pause(&self) {
        let now = Instant::now();
        let mut control = self.shared.control.lock();
        control.pause.stop_clock(now);
        control.pause.skip_all();
        control.paused = false;
        log::info!("Pause buffer reset, back to live");
    }

    pub fn status(&self) -> StreamStatus {
        self.shared.status()
    }

    /// Cache fill level in percent, 100 once ready
    pub fn fill_percent(&self) -> u8 {
        self.shared.cache.fill_percent()
    }

    /// Metadata text in effect at the playback position
    pub fn metadata(&self) -> Option<String> {
        self.shared
            .metadata
            .lock()
            .current()
            .map(|block| block.text().to_string())
    }

    /// `StreamTitle` of the current metadata
    pub fn title(&self) -> Option<String> {
        self.shared
            .metadata
            .lock()
            .current()
            .and_then(|block| block.title().map(str::to_string))
    }

    /// Metadata blocks received but not yet reached by playback
    pub fn pending_metadata(&self) -> usize {
        self.shared.metadata.lock().pending()
    }

    pub fn radio_info(&self) -> &RadioInfo {
        &self.shared.info
    }

    pub fn codec(&self) -> Codec {
        self.shared.codec
    }

    /// Format of the samples returned by the last `read`
    pub fn format(&self) -> AudioFormat {
        *self.shared.format.lock()
    }

    pub fn sample_rate(&self) -> u32 {
        self.format().sample_rate
    }

    pub fn channels(&self) -> u8 {
        self.format().channels
    }

    /// Audio bytes held in the cache
    pub fn cache_len(&self) -> usize {
        self.shared.cache.len()
    }

    pub fn cache_capacity(&self) -> usize {
        self.shared.cache.capacity()
    }

    /// Bytes held in the pause buffer
    pub fn paused_bytes(&self) -> usize {
        self.shared.control.lock().pause.buffered()
    }

    pub fn set_event_callback(&self, callback: Option<Arc<dyn StreamCallback>>) {
        self.shared.events.set_callback(callback);
    }

    /// Stop the fill thread and release the stream
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);

        if let Some(handle) = self.worker.lock().take() {
            // Dropped from a callback on the fill thread: it exits on its own
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Fill thread panicked");
            }
        }
        log::debug!("Session closed");
    }
}

impl Shared {
    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(AudioError::InvalidState("Session is stopped".to_string()));
        }
        Ok(())
    }

    fn status(&self) -> StreamStatus {
        if self.stopped.load(Ordering::Acquire) {
            return StreamStatus::Stopped;
        }

        let control = self.control.lock();
        if control.paused {
            StreamStatus::Paused
        } else if !self.cache.is_ready() {
            StreamStatus::Buffering
        } else if !control.playing {
            StreamStatus::Ready
        } else {
            StreamStatus::Playing
        }
    }

    fn run_fill_loop(&self) {
        log::debug!("Fill thread started");
        let timeout = self.config.thread_timeout;

        while !self.stopped.load(Ordering::Acquire) {
            if let Err(e) = self.fill_and_dispatch(timeout) {
                log::error!("Fill failed: {}", e);
                thread::sleep(timeout);
            }
        }

        log::debug!("Fill thread stopped");
    }

    /// Fill the cache until it holds `target` bytes, the stream ends or the
    /// deadline passes
    fn fill_until(&self, target: usize, deadline: Instant) -> Result<()> {
        while self.cache.len() < target
            && Instant::now() < deadline
            && !self.eos.load(Ordering::Acquire)
        {
            self.fill_and_dispatch(self.config.sync_read_timeout)?;
        }
        Ok(())
    }

    /// Move the read position to the first frame of the stream
    fn synchronize(&self) -> Result<()> {
        let deadline = Instant::now() + self.config.sync_budget;
        self.fill_until(self.sync_size, deadline)?;

        let mut events = Vec::new();
        {
            let mut ring = self.cache.lock();
            let window = ring.read_region();
            let offset = find_first_frame(self.codec, window).ok_or_else(|| {
                AudioError::SyncTimeout(format!(
                    "No {:?} frame found in {} bytes",
                    self.codec,
                    window.len()
                ))
            })?;
            if offset > 0 {
                log::debug!("First frame after {} bytes", offset);
            }
            self.forward(&mut ring, offset, &mut events);
        }
        self.events.dispatch_all(events);

        self.fill_until(self.sync_size, deadline)
    }

    fn fill_and_dispatch(&self, timeout: Duration) -> Result<()> {
        let mut events = Vec::new();
        let result = self.fill(timeout, &mut events);
        self.events.dispatch_all(events);
        result
    }

    /// Consume `n` bytes at the read position, moving metadata along
    fn forward(
        &self,
        ring: &mut ByteRingBuffer,
        n: usize,
        events: &mut Vec<StreamEvent>,
    ) -> usize {
        let n = ring.commit_read(n);
        self.metadata.lock().advance(n, events);
        n
    }

    /// Demultiplex raw stream bytes into the cache, or drop their audio
    fn demux(&self, demuxer: &mut Demuxer, data: &[u8], keep_audio: bool) -> usize {
        let mut sink = CacheSink {
            ring: self.cache.lock(),
            metadata: &self.metadata,
            keep_audio,
            audio: 0,
        };
        demuxer.feed(data, &mut sink);
        sink.audio
    }

    /// One bounded transport read into the scratch buffer
    fn read_transport(&self, feed: &mut Feed, max: usize, timeout: Duration) -> Result<ReadStatus> {
        if self.eos.load(Ordering::Acquire) {
            return Ok(ReadStatus::Ended);
        }

        let max = max.min(feed.scratch.len());
        match feed.transport.read_timeout(&mut feed.scratch[..max], timeout) {
            Ok(ReadStatus::Ended) => {
                log::info!("Stream ended");
                self.eos.store(true, Ordering::Release);
                Ok(ReadStatus::Ended)
            }
            Ok(status) => Ok(status),
            Err(e) => {
                log::error!("Transport failed: {}", e);
                self.eos.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Append raw bytes to the pause chain, dropping its oldest block when
    /// the chain outgrows its bound
    fn absorb(
        &self,
        demuxer: &mut Demuxer,
        control: &mut Control,
        data: &[u8],
        now: Instant,
    ) -> Result<()> {
        control.pause.absorb(data)?;
        while let Some(evicted) = control.pause.evict_over_limit(now) {
            // Metadata in the dropped block still moves the phase along
            self.demux(demuxer, &evicted, false);
            control.resync = true;
        }
        Ok(())
    }

    fn fill(&self, timeout: Duration, events: &mut Vec<StreamEvent>) -> Result<()> {
        let mut guard = self.feed.lock();
        let feed = &mut *guard;

        loop {
            let now = Instant::now();
            let mut control = self.control.lock();

            if control.pause.pending_skip() > 0 {
                self.apply_skip(feed, &mut control, events, now);
            }

            if control.paused {
                return self.fill_paused(feed, control, timeout);
            }

            let space = self.cache.space().min(self.config.max_rw);
            if space == 0 {
                if self.cache.mark_full() {
                    log::info!("Cache full, stream ready");
                    events.push(StreamEvent::Ready);
                }
                drop(control);
                thread::sleep(timeout);
                return Ok(());
            }

            if !control.pause.chain_is_empty() {
                drop(control);

                // Keep the live stream flowing into the chain while it replays
                let status = self.read_transport(feed, self.config.block_size, Duration::ZERO);
                let mut control = self.control.lock();
                if let Ok(ReadStatus::Data(n)) = status {
                    self.absorb(&mut feed.demuxer, &mut control, &feed.scratch[..n], now)?;
                }

                let n = control.pause.drain(&mut feed.scratch[..space], now);
                drop(control);
                self.demux(&mut feed.demuxer, &feed.scratch[..n], true);
            } else {
                drop(control);

                match self.read_transport(feed, space, timeout)? {
                    ReadStatus::Data(n) => {
                        let mut control = self.control.lock();
                        if control.paused || !control.pause.chain_is_empty() {
                            // Paused while reading: these bytes follow the chain
                            self.absorb(&mut feed.demuxer, &mut control, &feed.scratch[..n], now)?;
                        } else {
                            drop(control);
                            self.demux(&mut feed.demuxer, &feed.scratch[..n], true);
                        }
                    }
                    ReadStatus::TimedOut => return Ok(()),
                    ReadStatus::Ended => {
                        thread::sleep(timeout);
                        return Ok(());
                    }
                }
            }

            if self.cache.is_ready() {
                return Ok(());
            }
        }
    }

    /// Fill cycle while paused: transport bytes go to the pause chain
    fn fill_paused(
        &self,
        feed: &mut Feed,
        control: MutexGuard<'_, Control>,
        timeout: Duration,
    ) -> Result<()> {
        drop(control);

        let status = self.read_transport(feed, self.config.block_size, timeout);
        let now = Instant::now();
        let mut control = self.control.lock();

        match status {
            Ok(ReadStatus::Data(n)) => {
                self.absorb(&mut feed.demuxer, &mut control, &feed.scratch[..n], now)
            }
            Ok(ReadStatus::TimedOut) => Ok(()),
            Ok(ReadStatus::Ended) => {
                if !control.pause.is_frozen() {
                    control.pause.freeze(now);
                }
                drop(control);
                thread::sleep(timeout);
                Ok(())
            }
            Err(e) => {
                control.pause.freeze(now);
                Err(e)
            }
        }
    }

    /// Discard the pending skip: cache first, then the front of the chain
    fn apply_skip(
        &self,
        feed: &mut Feed,
        control: &mut Control,
        events: &mut Vec<StreamEvent>,
        now: Instant,
    ) {
        let mut skipped = {
            let mut ring = self.cache.lock();
            self.forward(&mut ring, control.pause.pending_skip(), events)
        };
        control.pause.consume_skip(skipped);

        while control.pause.pending_skip() > 0 && !control.pause.chain_is_empty() {
            let max = control.pause.pending_skip().min(feed.scratch.len());
            let n = control.pause.drain(&mut feed.scratch[..max], now);
            self.demux(&mut feed.demuxer, &feed.scratch[..n], false);
            control.pause.consume_skip(n);
            skipped += n;
        }

        if control.pause.pending_skip() > 0 {
            control.pause.finish_skip();
        }
        control.resync = true;
        control.flush_decoded = true;
        log::debug!("Skipped {} bytes", skipped);
    }

    fn set_format(&self, format: AudioFormat) {
        let mut current = self.format.lock();
        if *current != format {
            log::info!(
                "Output format: {} Hz, {} channels",
                format.sample_rate,
                format.channels
            );
            *current = format;
        }
    }

    /// Mark the session stopped and signal END once
    fn end_stream(&self, events: &mut Vec<StreamEvent>) {
        self.stopped.store(true, Ordering::Release);
        if !self.end_signalled.swap(true, Ordering::AcqRel) {
            log::info!("End of stream");
            events.push(StreamEvent::End);
        }
    }

    /// Nothing left anywhere to decode
    fn is_drained(&self, decoder: &dyn FrameDecoder) -> bool {
        self.eos.load(Ordering::Acquire)
            && self.cache.is_empty()
            && decoder.remaining() == 0
            && self.control.lock().pause.chain_is_empty()
    }

    fn read(&self, out: &mut [f32], events: &mut Vec<StreamEvent>) -> Result<usize> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(AudioError::EndOfStream);
        }

        let mut reader_guard = self.reader.lock();
        let reader = reader_guard
            .as_mut()
            .ok_or_else(|| AudioError::InvalidState("No decoder".to_string()))?;

        {
            let mut control = self.control.lock();
            if control.flush_decoded || control.pause.pending_skip() > 0 {
                flush_decoder(&mut control, reader);
            }
        }

        let mut total = 0;
        if reader.decoder.remaining() > 0 {
            total += reader.decoder.read_samples(out);
            self.set_format(reader.decoder.format());
        }

        while total < out.len() {
            if !self.config.use_thread {
                match self.fill(Duration::ZERO, events) {
                    Err(e @ AudioError::AllocationFailure(_)) => return Err(e),
                    Err(e) => log::warn!("Fill failed: {}", e),
                    Ok(()) => {}
                }
            }

            let eos = self.eos.load(Ordering::Acquire);
            let mut control = self.control.lock();
            if control.flush_decoded {
                flush_decoder(&mut control, reader);
            }
            if control.paused || (!self.cache.is_ready() && !control.resync && !eos) {
                break;
            }

            let mut ring = self.cache.lock();
            let len = ring.available_read().min(ring.max_region());
            if len == 0 {
                break;
            }

            if !eos && self.cache.is_underrun(len) {
                if self.cache.mark_underrun() {
                    log::info!("Cache underrun ({} bytes), buffering", len);
                    events.push(StreamEvent::Buffering);
                }
                control.playing = false;
                break;
            }

            if control.resync {
                if len < self.sync_size && !eos {
                    break;
                }

                match find_first_frame(self.codec, ring.read_region()) {
                    Some(offset) => {
                        self.forward(&mut ring, offset, events);
                        control.resync = false;
                        log::debug!("Resynchronized after {} bytes", offset);
                    }
                    None => {
                        let n = if eos { len } else { discardable(self.codec, len) };
                        log::debug!("No frame boundary, dropping {} bytes", n);
                        self.forward(&mut ring, n, events);
                    }
                }
                continue;
            }

            let status = match reader.decoder.decode(ring.read_region()) {
                Ok(status) => status,
                Err(e) => {
                    log::warn!("Decoder error: {}", e);
                    self.forward(&mut ring, 1, events);
                    control.resync = true;
                    reader.failures += 1;
                    if reader.failures > self.config.max_decode_failures {
                        self.end_stream(events);
                        break;
                    }
                    continue;
                }
            };

            if status.lost_sync {
                log::debug!("Decoder lost frame alignment");
                self.forward(&mut ring, 1, events);
                control.resync = true;
                continue;
            }

            if status.used == 0 {
                if eos {
                    log::debug!("Dropping {} bytes of incomplete final frame", len);
                    self.forward(&mut ring, len, events);
                    continue;
                }
                if len >= ring.max_region() {
                    // A full window always holds a frame
                    self.forward(&mut ring, 1, events);
                    control.resync = true;
                    continue;
                }
                break;
            }

            self.forward(&mut ring, status.used, events);

            if status.failed {
                reader.failures += 1;
                if reader.failures > self.config.max_decode_failures {
                    log::error!(
                        "{} consecutive frames failed to decode",
                        reader.failures
                    );
                    self.end_stream(events);
                    break;
                }
                continue;
            }
            reader.failures = 0;
            if status.samples > 0 {
                control.playing = true;
            }
            drop(ring);
            drop(control);

            if status.format != *self.format.lock() {
                // Queued samples are handed out by the next call
                if total > 0 {
                    break;
                }
                self.set_format(status.format);
            }

            total += reader.decoder.read_samples(&mut out[total..]);
        }

        if total == 0 {
            if self.stopped.load(Ordering::Acquire) {
                return Err(AudioError::EndOfStream);
            }
            if self.is_drained(reader.decoder.as_ref()) {
                self.end_stream(events);
                return Err(AudioError::EndOfStream);
            }
        }

        Ok(total)
    }
}

/// Drop samples decoded ahead of a skipped region
fn flush_decoder(control: &mut Control, reader: &mut Reader) {
    control.flush_decoded = false;
    if reader.decoder.remaining() > 0 {
        log::debug!("Dropping {} decoded samples", reader.decoder.remaining());
    }
    reader.decoder.reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwave_core::DecodeStatus;
    use airwave_transport_http::Headers;
    use std::collections::VecDeque;

    struct MemoryTransport {
        headers: Headers,
        data: VecDeque<u8>,
    }

    impl Transport for MemoryTransport {
        fn headers(&self) -> &Headers {
            &self.headers
        }

        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<ReadStatus> {
            if self.data.is_empty() {
                return Ok(ReadStatus::Ended);
            }
            let n = buf.len().min(self.data.len());
            for (dst, src) in buf.iter_mut().zip(self.data.drain(..n)) {
                *dst = src;
            }
            Ok(ReadStatus::Data(n))
        }
    }

    struct CountingDecoder {
        queued: usize,
    }

    impl FrameDecoder for CountingDecoder {
        fn decode(&mut self, input: &[u8]) -> Result<DecodeStatus> {
            let format = AudioFormat::new(44100, 2);
            match airwave_core::FrameHeader::parse_mpeg(input) {
                Some(header) if input.len() >= header.frame_len => {
                    self.queued += 2;
                    Ok(DecodeStatus {
                        used: header.frame_len,
                        samples: 2,
                        format,
                        lost_sync: false,
                        failed: false,
                    })
                }
                Some(_) => Ok(DecodeStatus::need_more(format)),
                None => Ok(DecodeStatus::lost_sync(format)),
            }
        }

        fn read_samples(&mut self, output: &mut [f32]) -> usize {
            let n = output.len().min(self.queued);
            self.queued -= n;
            n
        }

        fn remaining(&self) -> usize {
            self.queued
        }

        fn format(&self) -> AudioFormat {
            AudioFormat::new(44100, 2)
        }

        fn reset(&mut self) {
            self.queued = 0;
        }
    }

    fn frames(count: usize) -> VecDeque<u8> {
        let mut data = VecDeque::new();
        for _ in 0..count {
            data.extend([0xFF, 0xFB, 0x90, 0x00]);
            data.extend(std::iter::repeat(0u8).take(413));
        }
        data
    }

    fn open(data: VecDeque<u8>, content_type: &str) -> Result<Session> {
        let transport = MemoryTransport {
            headers: [("content-type", content_type)].into_iter().collect(),
            data,
        };
        Session::open_with(
            Box::new(transport),
            Box::new(|_: Codec, _: &[u8]| {
                Ok(Box::new(CountingDecoder { queued: 0 }) as Box<dyn FrameDecoder>)
            }),
            SessionConfig::default().with_cache_bytes(16_384),
        )
    }

    #[test]
    fn test_open_and_drain_to_end() {
        let session = open(frames(100), "audio/mpeg").unwrap();
        assert_eq!(session.codec(), Codec::Mp3);
        assert_eq!(session.cache_capacity(), 16_384);
        assert_eq!(session.sample_rate(), 44100);
        assert_eq!(session.channels(), 2);

        let mut out = [0f32; 64];
        let mut samples = 0;
        loop {
            match session.read(&mut out) {
                Ok(n) => samples += n,
                Err(AudioError::EndOfStream) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(samples, 200);
        assert_eq!(session.status(), StreamStatus::Stopped);
        assert!(session.play().is_err());
    }

    #[test]
    fn test_open_rejects_garbage() {
        let garbage: VecDeque<u8> = std::iter::repeat(0x42).take(20_000).collect();
        assert!(matches!(
            open(garbage, "audio/mpeg"),
            Err(AudioError::SyncTimeout(_))
        ));
        assert!(matches!(
            open(frames(10), "text/html"),
            Err(AudioError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_pause_controls_without_data() {
        let session = open(frames(60), "audio/mpeg").unwrap();
        assert_eq!(session.skip(1000), 0);
        session.pause().unwrap();
        session.pause().unwrap();
        assert_eq!(session.status(), StreamStatus::Paused);

        let mut out = [0f32; 16];
        assert_eq!(session.read(&mut out).unwrap(), 0);

        session.play().unwrap();
        assert_ne!(session.status(), StreamStatus::Paused);
        session.pause().unwrap();
        assert_eq!(session.read(&mut out).unwrap(), 0);
        assert!(session.paused_bytes() > 0);

        // The discard happens on the next fill cycle
        session.reset_pause();
        session.fill(Duration::ZERO).unwrap();
        assert_eq!(session.paused_bytes(), 0);
        assert_ne!(session.status(), StreamStatus::Paused);
    }
}
