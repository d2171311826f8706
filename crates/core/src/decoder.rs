// Frame decoder trait consumed by the streaming engine

use crate::error::Result;
use crate::state::{AudioFormat, Codec};

/// Outcome of one decode step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStatus {
    /// Bytes consumed from the input window
    pub used: usize,
    /// Interleaved samples added to the decoder's output queue
    pub samples: usize,
    /// Format of the samples just produced
    pub format: AudioFormat,
    /// The window does not start on a frame boundary
    pub lost_sync: bool,
    /// The frame was consumed but could not be decoded
    pub failed: bool,
}

impl DecodeStatus {
    /// Not enough input for a complete frame
    pub fn need_more(format: AudioFormat) -> Self {
        Self {
            used: 0,
            samples: 0,
            format,
            lost_sync: false,
            failed: false,
        }
    }

    /// A frame of `used` bytes that was dropped after a decode failure
    pub fn failed(used: usize, format: AudioFormat) -> Self {
        Self {
            used,
            failed: true,
            ..Self::need_more(format)
        }
    }

    pub fn lost_sync(format: AudioFormat) -> Self {
        Self {
            lost_sync: true,
            ..Self::need_more(format)
        }
    }
}

/// Compressed frame decoder
///
/// `decode` is handed a window that starts on a frame boundary and decodes at
/// most one frame into an internal queue; `read_samples` drains that queue.
/// A frame that fails to decode is reported through `DecodeStatus::failed`.
pub trait FrameDecoder: Send {
    /// Decode the next frame from `input`
    fn decode(&mut self, input: &[u8]) -> Result<DecodeStatus>;

    /// Move queued samples into `output`, returning how many were written
    fn read_samples(&mut self, output: &mut [f32]) -> usize;

    /// Samples decoded but not yet handed out
    fn remaining(&self) -> usize;

    /// Current output format
    fn format(&self) -> AudioFormat;

    /// Drop any queued samples and codec state
    fn reset(&mut self);
}

/// Builds a decoder for a codec from the first synchronized window
pub type DecoderOpener =
    Box<dyn FnOnce(Codec, &[u8]) -> Result<Box<dyn FrameDecoder>> + Send>;
