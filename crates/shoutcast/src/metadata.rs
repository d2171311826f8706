// In-band ICY metadata: stream demultiplexer and metadata queue
//
// The server interleaves one metadata field after every `metaint` bytes of
// audio: a length byte (unit of 16 bytes) followed by that many bytes of text.

use airwave_core::{AudioError, Result, StreamEvent};
use std::collections::VecDeque;

/// Unit of the metadata length byte
pub const META_LEN_UNIT: usize = 16;

/// Position of the demultiplexer within the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    /// Audio bytes, counting down to the next metadata field
    Data,
    /// Next byte is the length of the metadata field
    MetaLen,
    /// Collecting metadata text
    MetaData,
}

/// Receiver of demultiplexed bytes
pub trait DemuxSink {
    fn audio(&mut self, data: &[u8]);
    fn metadata(&mut self, text: String);
}

/// Byte-count driven ICY demultiplexer
///
/// One instance sees every byte leaving the transport in order, whatever path
/// the bytes take afterwards, so the phase never drifts.
pub struct Demuxer {
    interval: usize,
    state: DemuxState,
    remaining: usize,
    field: Vec<u8>,
}

impl Demuxer {
    /// Create a demultiplexer for metadata every `interval` audio bytes
    ///
    /// An interval of 0 passes every byte through as audio.
    pub fn new(interval: usize) -> Self {
        Self {
            interval,
            state: DemuxState::Data,
            remaining: interval,
            field: Vec::new(),
        }
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    /// Split `input` into audio and metadata
    pub fn feed(&mut self, mut input: &[u8], sink: &mut impl DemuxSink) {
        if self.interval == 0 {
            if !input.is_empty() {
                sink.audio(input);
            }
            return;
        }

        while !input.is_empty() {
            match self.state {
                DemuxState::Data => {
                    let n = self.remaining.min(input.len());
                    sink.audio(&input[..n]);
                    input = &input[n..];
                    self.remaining -= n;
                    if self.remaining == 0 {
                        self.state = DemuxState::MetaLen;
                    }
                }
                DemuxState::MetaLen => {
                    let size = input[0] as usize * META_LEN_UNIT;
                    input = &input[1..];
                    if size == 0 {
                        self.start_data();
                    } else {
                        self.field.clear();
                        self.remaining = size;
                        self.state = DemuxState::MetaData;
                    }
                }
                DemuxState::MetaData => {
                    let n = self.remaining.min(input.len());
                    self.field.extend_from_slice(&input[..n]);
                    input = &input[n..];
                    self.remaining -= n;
                    if self.remaining == 0 {
                        match decode_metadata(&self.field) {
                            Ok(text) => sink.metadata(text),
                            Err(e) => log::warn!("Discarding metadata block: {}", e),
                        }
                        self.start_data();
                    }
                }
            }
        }
    }

    fn start_data(&mut self) {
        self.remaining = self.interval;
        self.state = DemuxState::Data;
    }
}

/// Decode a raw metadata field into text
///
/// The field is NUL padded to a multiple of 16 bytes. Text that is not UTF-8
/// is read as Latin-1, which is what most servers send.
pub fn decode_metadata(raw: &[u8]) -> Result<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let raw = &raw[..end];

    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(AudioError::ProtocolAnomaly(
            "Empty metadata field".to_string(),
        ));
    }

    Ok(match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().map(|&b| b as char).collect(),
    })
}

/// A metadata blurb waiting to become current
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlock {
    text: String,
    /// Audio bytes to consume after the previous block before this one applies
    bytes_until_effect: usize,
}

impl MetadataBlock {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bytes_until_effect(&self) -> usize {
        self.bytes_until_effect
    }

    /// Value of a `Key='value';` field of the blurb
    pub fn field(&self, key: &str) -> Option<&str> {
        parse_field(&self.text, key)
    }

    /// The `StreamTitle` field
    pub fn title(&self) -> Option<&str> {
        self.field("StreamTitle")
    }
}

/// Value of `key` in an ICY blurb such as `StreamTitle='A - B';StreamUrl='';`
pub fn parse_field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let mut rest = text;
    loop {
        let start = rest.find(key)?;
        let after = &rest[start + key.len()..];
        let at_boundary = start == 0 || rest[..start].ends_with(';');

        if let (true, Some(value)) = (at_boundary, after.strip_prefix("='")) {
            // Titles may contain quotes, so the field ends at `';`
            let end = value
                .find("';")
                .or_else(|| value.rfind('\''))
                .unwrap_or(value.len());
            return Some(&value[..end]);
        }
        rest = after;
    }
}

/// FIFO of metadata blocks ordered by stream position
///
/// Positions are counted in audio bytes of the cache. Each block stores its
/// distance from the block ahead of it (the head: from the read position), so
/// consuming bytes only ever touches the head.
#[derive(Debug, Default)]
pub struct MetadataQueue {
    pending: VecDeque<MetadataBlock>,
    current: Option<MetadataBlock>,
    /// Sum of the pending `bytes_until_effect`
    pending_span: usize,
}

impl MetadataQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `text` to take effect `distance` bytes past the read position
    pub fn push(&mut self, text: String, distance: usize) {
        let bytes_until_effect = distance.saturating_sub(self.pending_span);
        self.pending_span += bytes_until_effect;
        log::debug!(
            "Queued metadata ({} bytes ahead): {}",
            distance,
            text
        );
        self.pending.push_back(MetadataBlock {
            text,
            bytes_until_effect,
        });
    }

    /// Account for `consumed` audio bytes leaving the read position
    ///
    /// Every block passed becomes current in turn, each producing a `Meta`
    /// event.
    pub fn advance(&mut self, mut consumed: usize, events: &mut Vec<StreamEvent>) {
        while let Some(head) = self.pending.front_mut() {
            if consumed < head.bytes_until_effect {
                head.bytes_until_effect -= consumed;
                self.pending_span -= consumed;
                return;
            }

            consumed -= head.bytes_until_effect;
            self.pending_span -= head.bytes_until_effect;
            head.bytes_until_effect = 0;

            if let Some(block) = self.pending.pop_front() {
                events.push(StreamEvent::Meta(block.text.clone()));
                self.current = Some(block);
            }
        }
    }

    /// The metadata that applies at the read position
    pub fn current(&self) -> Option<&MetadataBlock> {
        self.current.as_ref()
    }

    /// Blocks received but not yet in effect
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
