// Error handling for the streaming engine

use std::fmt;

/// Streaming engine error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Connection or HTTP failure (fatal to a session)
    NetworkError(String),

    /// No valid frame boundary found within the synchronization budget
    SyncTimeout(String),

    /// The decoder could not parse a frame
    DecodingError(String),

    /// A block or session buffer could not be allocated
    AllocationFailure(String),

    /// Malformed in-band metadata
    ProtocolAnomaly(String),

    /// Stream content type not supported
    UnsupportedFormat(String),

    /// Operation not valid in the current state
    InvalidState(String),

    /// Thread/synchronization error
    ThreadError(String),

    /// IO error
    IoError(String),

    /// Stream ended, no more data will arrive
    EndOfStream,

    /// Generic error
    Other(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AudioError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AudioError::SyncTimeout(msg) => write!(f, "Synchronization timeout: {}", msg),
            AudioError::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
            AudioError::AllocationFailure(msg) => write!(f, "Allocation failure: {}", msg),
            AudioError::ProtocolAnomaly(msg) => write!(f, "Protocol anomaly: {}", msg),
            AudioError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            AudioError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AudioError::ThreadError(msg) => write!(f, "Thread error: {}", msg),
            AudioError::IoError(msg) => write!(f, "IO error: {}", msg),
            AudioError::EndOfStream => write!(f, "End of stream"),
            AudioError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Result type alias for streaming operations
pub type Result<T> = std::result::Result<T, AudioError>;

// Conversion implementations
impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::IoError(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for AudioError {
    fn from(err: std::collections::TryReserveError) -> Self {
        AudioError::AllocationFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_conversion() {
        let err: AudioError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out").into();
        assert_eq!(err, AudioError::IoError("read timed out".to_string()));
    }
}
