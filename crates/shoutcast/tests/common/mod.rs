// Scripted transport and frame-indexing decoder for session tests
#![allow(dead_code)]

use airwave_core::{
    AudioFormat, Codec, DecodeStatus, DecoderOpener, FrameDecoder, FrameHeader, Result,
    StreamCallback, StreamEvent,
};
use airwave_shoutcast::{Session, SessionConfig};
use airwave_transport_http::{Headers, ReadStatus, Transport};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// MPEG-1 layer III, 128 kb/s, 44.1 kHz, stereo
pub const HEADER_44K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
pub const FRAME_LEN_44K: usize = 417;

/// MPEG-1 layer III, 128 kb/s, 48 kHz, stereo
pub const HEADER_48K: [u8; 4] = [0xFF, 0xFB, 0x94, 0x00];
pub const FRAME_LEN_48K: usize = 384;

/// Frame index the decoder refuses to decode
pub const FAIL_MARK: u32 = u32::MAX;

fn frame(header: [u8; 4], len: usize, index: u32) -> Vec<u8> {
    let mut frame = vec![0u8; len];
    frame[..4].copy_from_slice(&header);
    frame[4..8].copy_from_slice(&index.to_be_bytes());
    if index != FAIL_MARK {
        frame[8..12].copy_from_slice(&(!index).to_be_bytes());
    }
    frame
}

/// Frames carrying their index and its complement, starting at `first`
pub fn frames(first: u32, count: u32) -> Vec<u8> {
    (first..first + count)
        .flat_map(|index| frame(HEADER_44K, FRAME_LEN_44K, index))
        .collect()
}

pub fn frames_48k(first: u32, count: u32) -> Vec<u8> {
    (first..first + count)
        .flat_map(|index| frame(HEADER_48K, FRAME_LEN_48K, index))
        .collect()
}

pub fn failing_frames(count: u32) -> Vec<u8> {
    (0..count)
        .flat_map(|_| frame(HEADER_44K, FRAME_LEN_44K, FAIL_MARK))
        .collect()
}

/// Interleave ICY metadata into `audio` every `metaint` bytes
///
/// Returns the raw stream and the text of every block in order.
pub fn icy_stream(
    audio: &[u8],
    metaint: usize,
    title: impl Fn(usize) -> String,
) -> (Vec<u8>, Vec<String>) {
    let mut stream = Vec::new();
    let mut texts = Vec::new();

    for (block, chunk) in audio.chunks(metaint).enumerate() {
        stream.extend_from_slice(chunk);
        if chunk.len() < metaint {
            break;
        }

        let text = title(block);
        let padded = text.len().div_ceil(16) * 16;
        stream.push((padded / 16) as u8);
        stream.extend_from_slice(text.as_bytes());
        stream.resize(stream.len() + padded - text.len(), 0);
        texts.push(text);
    }

    (stream, texts)
}

pub fn song_title(block: usize) -> String {
    format!("StreamTitle='Song {}';StreamUrl='';", block)
}

struct Script {
    data: VecDeque<u8>,
    ended: bool,
    chunk: usize,
}

/// Test-side control over a scripted transport
#[derive(Clone)]
pub struct ScriptHandle(Arc<Mutex<Script>>);

impl ScriptHandle {
    pub fn push(&self, data: &[u8]) {
        self.0.lock().data.extend(data.iter().copied());
    }

    pub fn end(&self) {
        self.0.lock().ended = true;
    }

    pub fn remaining(&self) -> usize {
        self.0.lock().data.len()
    }
}

/// Transport replaying scripted bytes in bounded chunks
pub struct ScriptedTransport {
    headers: Headers,
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new(headers: Headers, chunk: usize) -> (Self, ScriptHandle) {
        let script = Arc::new(Mutex::new(Script {
            data: VecDeque::new(),
            ended: false,
            chunk: chunk.max(1),
        }));
        let handle = ScriptHandle(script.clone());
        (Self { headers, script }, handle)
    }
}

impl Transport for ScriptedTransport {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadStatus> {
        let mut script = self.script.lock();
        if script.data.is_empty() {
            if script.ended {
                return Ok(ReadStatus::Ended);
            }
            drop(script);
            std::thread::sleep(timeout.min(Duration::from_millis(2)));
            return Ok(ReadStatus::TimedOut);
        }

        let n = buf.len().min(script.chunk).min(script.data.len());
        for (dst, src) in buf.iter_mut().zip(script.data.drain(..n)) {
            *dst = src;
        }
        Ok(ReadStatus::Data(n))
    }
}

/// Decoder emitting each frame's index as one stereo sample pair
pub struct IndexDecoder {
    queue: VecDeque<f32>,
    format: AudioFormat,
}

impl FrameDecoder for IndexDecoder {
    fn decode(&mut self, input: &[u8]) -> Result<DecodeStatus> {
        let header = match FrameHeader::parse_mpeg(input) {
            Some(header) => header,
            None if input.len() < 4 => return Ok(DecodeStatus::need_more(self.format)),
            None => return Ok(DecodeStatus::lost_sync(self.format)),
        };
        if input.len() < header.frame_len {
            return Ok(DecodeStatus::need_more(self.format));
        }

        let index = u32::from_be_bytes([input[4], input[5], input[6], input[7]]);
        let check = u32::from_be_bytes([input[8], input[9], input[10], input[11]]);
        // Spliced frames fail the check, like a corrupt frame would
        if index == FAIL_MARK || check != !index {
            return Ok(DecodeStatus::failed(header.frame_len, self.format));
        }

        self.format = header.format();
        self.queue.extend([index as f32, index as f32]);
        Ok(DecodeStatus {
            used: header.frame_len,
            samples: 2,
            format: self.format,
            lost_sync: false,
            failed: false,
        })
    }

    fn read_samples(&mut self, output: &mut [f32]) -> usize {
        let n = output.len().min(self.queue.len());
        for (dst, src) in output.iter_mut().zip(self.queue.drain(..n)) {
            *dst = src;
        }
        n
    }

    fn remaining(&self) -> usize {
        self.queue.len()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn reset(&mut self) {
        self.queue.clear();
    }
}

pub fn index_decoder() -> DecoderOpener {
    Box::new(|codec: Codec, _window: &[u8]| {
        assert_eq!(codec, Codec::Mp3);
        Ok(Box::new(IndexDecoder {
            queue: VecDeque::new(),
            format: AudioFormat::new(44100, 2),
        }) as Box<dyn FrameDecoder>)
    })
}

pub fn mpeg_headers(metaint: usize) -> Headers {
    let mut headers = Headers::new();
    headers.insert("content-type", "audio/mpeg");
    headers.insert("icy-name", "Scripted Radio");
    headers.insert("icy-br", "128");
    if metaint > 0 {
        headers.insert("icy-metaint", metaint.to_string());
    }
    headers
}

/// Open a session over `stream`, delivered `chunk` bytes per read
pub fn open_scripted(
    stream: &[u8],
    metaint: usize,
    chunk: usize,
    ended: bool,
    config: SessionConfig,
) -> (Result<Session>, ScriptHandle) {
    let (transport, handle) = ScriptedTransport::new(mpeg_headers(metaint), chunk);
    handle.push(stream);
    if ended {
        handle.end();
    }
    let session = Session::open_with(Box::new(transport), index_decoder(), config);
    (session, handle)
}

/// Callback recording every event
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<StreamEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Meta(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &StreamEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == wanted).count()
    }
}

impl StreamCallback for Recorder {
    fn on_event(&self, event: StreamEvent) {
        self.events.lock().push(event);
    }
}

/// Frame indices decoded by `read` calls until the stream ends
pub fn read_indices(session: &Session, out_len: usize, indices: &mut Vec<u32>) {
    let mut out = vec![0f32; out_len];
    for _ in 0..2_000_000 {
        match session.read(&mut out) {
            Ok(n) => push_indices(&out[..n], indices),
            Err(airwave_core::AudioError::EndOfStream) => return,
            Err(e) => panic!("read failed: {}", e),
        }
    }
    panic!("stream did not end");
}

/// Collect frame indices from interleaved stereo samples
pub fn push_indices(samples: &[f32], indices: &mut Vec<u32>) {
    for pair in samples.chunks(2) {
        indices.push(pair[0] as u32);
    }
}
