// Stream lifecycle and audio format types

/// Lifecycle status of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Cache is filling, no audio is produced yet
    Buffering,
    /// Cache is full, waiting for the first read
    Ready,
    /// Audio is being produced
    Playing,
    /// Playback is paused, the source keeps flowing into the pause buffer
    Paused,
    /// Stream ended or session closed
    Stopped,
}

impl StreamStatus {
    /// Numeric code used by the C interface
    pub fn code(self) -> i32 {
        match self {
            StreamStatus::Buffering => 0,
            StreamStatus::Ready => 1,
            StreamStatus::Playing => 2,
            StreamStatus::Paused => 3,
            StreamStatus::Stopped => 4,
        }
    }

    /// Whether `self -> to` is a legal lifecycle transition
    pub fn can_transition(self, to: StreamStatus) -> bool {
        use StreamStatus::*;

        match (self, to) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Buffering, Ready) | (Buffering, Paused) => true,
            (Ready, Playing) | (Ready, Paused) | (Ready, Buffering) => true,
            (Playing, Paused) | (Playing, Buffering) => true,
            (Paused, Playing) | (Paused, Buffering) | (Paused, Ready) => true,
            (from, to) => from == to,
        }
    }
}

/// Audio stream codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// MPEG-1/2/2.5 audio, layers I-III
    Mp3,
    /// AAC in ADTS framing
    Aac,
}

impl Codec {
    /// Map an HTTP content type to a codec
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" => Some(Codec::Mp3),
            "audio/aac" | "audio/aacp" | "audio/x-aac" => Some(Codec::Aac),
            _ => None,
        }
    }
}

/// Format of decoded PCM output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u8,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u8) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
        }
    }
}
