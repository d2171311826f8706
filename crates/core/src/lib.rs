// Core types and traits for the airwave streaming engine

pub mod callback;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod state;

// Re-export commonly used types
pub use callback::{EventDispatcher, StreamCallback, StreamEvent};
pub use decoder::{DecodeStatus, DecoderOpener, FrameDecoder};
pub use error::{AudioError, Result};
pub use frame::FrameHeader;
pub use state::{AudioFormat, Codec, StreamStatus};
