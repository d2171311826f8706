// Byte-stream transport with timed reads
// A pump thread drains the blocking HTTP reader into a bounded queue so the
// engine can read with a timeout instead of blocking on the socket.

use crate::client::{create_http_agent, request_stream, HttpOptions};
use crate::headers::Headers;
use airwave_core::{AudioError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Bytes buffered ahead of the engine before the pump waits
const PUMP_QUEUE_LIMIT: usize = 256 * 1024;

/// Socket read size of the pump thread
const PUMP_CHUNK_SIZE: usize = 16 * 1024;

/// Outcome of a timed read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Bytes copied into the buffer
    Data(usize),
    /// Nothing arrived within the timeout
    TimedOut,
    /// The source closed the stream
    Ended,
}

/// Source of raw stream bytes
pub trait Transport: Send {
    /// Response headers received when the stream was opened
    fn headers(&self) -> &Headers;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`
    ///
    /// Connection failures are reported as `AudioError::NetworkError`.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadStatus>;
}

/// Shared state between the transport and its pump thread
struct PumpState {
    queue: VecDeque<u8>,
    ended: bool,
    error: Option<String>,
    closed: bool,
}

/// HTTP transport for ICY streams
pub struct HttpTransport {
    state: Arc<Mutex<PumpState>>,
    data_available: Arc<Condvar>,
    space_available: Arc<Condvar>,
    headers: Headers,
    status: u16,
    worker: Option<thread::JoinHandle<()>>,
}

impl HttpTransport {
    /// Connect to `url` and start pumping the response body
    pub fn connect(url: &str, options: &HttpOptions) -> Result<Self> {
        log::info!("Opening stream: {}", url);

        let agent = create_http_agent(options);
        let response = request_stream(&agent, url, options.retries)?;

        let status = response.status();
        if status != 200 {
            return Err(AudioError::NetworkError(format!(
                "Unexpected HTTP status {} from {}",
                status, url
            )));
        }

        let headers = Headers::from(&response);
        log::debug!("Stream responded with {} headers", headers.len());

        let state = Arc::new(Mutex::new(PumpState {
            queue: VecDeque::with_capacity(PUMP_CHUNK_SIZE),
            ended: false,
            error: None,
            closed: false,
        }));
        let data_available = Arc::new(Condvar::new());
        let space_available = Arc::new(Condvar::new());

        let reader = response.into_reader();
        let worker_state = Arc::clone(&state);
        let worker_data = Arc::clone(&data_available);
        let worker_space = Arc::clone(&space_available);
        let worker = thread::Builder::new()
            .name("airwave-http-pump".to_string())
            .spawn(move || Self::pump_worker(reader, worker_state, worker_data, worker_space))
            .map_err(|e| AudioError::ThreadError(format!("Failed to spawn pump: {}", e)))?;

        Ok(Self {
            state,
            data_available,
            space_available,
            headers,
            status,
            worker: Some(worker),
        })
    }

    /// HTTP status of the stream response
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Pump thread: socket -> bounded queue
    fn pump_worker(
        mut reader: Box<dyn Read + Send + Sync>,
        state: Arc<Mutex<PumpState>>,
        data_available: Arc<Condvar>,
        space_available: Arc<Condvar>,
    ) {
        let mut chunk = vec![0u8; PUMP_CHUNK_SIZE];
        let mut total = 0u64;

        loop {
            {
                let mut state = state.lock();
                while state.queue.len() >= PUMP_QUEUE_LIMIT && !state.closed {
                    space_available.wait_for(&mut state, Duration::from_millis(100));
                }
                if state.closed {
                    log::debug!("Pump stopped after {} bytes", total);
                    return;
                }
            }

            let result = reader.read(&mut chunk);

            let mut state = state.lock();
            match result {
                Ok(0) => {
                    log::info!("Stream closed by server after {} bytes", total);
                    state.ended = true;
                    data_available.notify_all();
                    return;
                }
                Ok(n) => {
                    state.queue.extend(&chunk[..n]);
                    total += n as u64;
                    data_available.notify_all();
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::error!("Stream read failed: {}", e);
                    state.error = Some(e.to_string());
                    data_available.notify_all();
                    return;
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadStatus> {
        if buf.is_empty() {
            return Ok(ReadStatus::Data(0));
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if !state.queue.is_empty() {
                let n = buf.len().min(state.queue.len());
                for (dst, src) in buf.iter_mut().zip(state.queue.drain(..n)) {
                    *dst = src;
                }
                self.space_available.notify_one();
                return Ok(ReadStatus::Data(n));
            }

            if let Some(ref error) = state.error {
                return Err(AudioError::NetworkError(error.clone()));
            }

            if state.ended {
                return Ok(ReadStatus::Ended);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(ReadStatus::TimedOut);
            }

            self.data_available.wait_for(&mut state, remaining);
        }
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.state.lock().closed = true;
        self.space_available.notify_all();

        // A parked socket read returns within the agent's read timeout
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Pump thread panicked");
            }
        }
    }
}
