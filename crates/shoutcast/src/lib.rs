// SHOUTcast/ICY stream ingestion with time-shifted playback
//
// A session pulls an ICY stream over HTTP, strips the in-band metadata,
// caches the audio in a ring and decodes it on demand. While paused the
// stream keeps flowing into a chain of blocks that is replayed on resume.

pub mod cache;
pub mod config;
pub mod info;
pub mod metadata;
pub mod pause;
pub mod session;
pub mod sync;

pub use config::SessionConfig;
pub use info::RadioInfo;
pub use metadata::{parse_field, MetadataBlock};
pub use session::Session;

pub use airwave_core::{AudioError, AudioFormat, Codec, Result, StreamEvent, StreamStatus};
