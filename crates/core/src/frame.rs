// Audio frame header parsing for MPEG audio and ADTS AAC

use crate::state::{AudioFormat, Codec};

/// Bitrates in kb/s indexed by [MPEG-1 | MPEG-2/2.5][layer I, II, III][index]
const MPEG_BITRATES: [[[u32; 15]; 3]; 2] = [
    [
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    ],
    [
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    ],
];

/// Sample rates indexed by [MPEG-1, MPEG-2, MPEG-2.5][index]
const MPEG_SAMPLE_RATES: [[u32; 3]; 3] = [
    [44100, 48000, 32000],
    [22050, 24000, 16000],
    [11025, 12000, 8000],
];

const ADTS_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Bytes needed to read an MPEG audio header
pub const MPEG_HEADER_LEN: usize = 4;

/// Bytes needed to read an ADTS header (without CRC)
pub const ADTS_HEADER_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

/// Parsed header of a single compressed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub codec: Codec,
    /// Total frame length in bytes, header included
    pub frame_len: usize,
    /// Header length in bytes (ADTS with CRC is 9)
    pub header_len: usize,
    pub sample_rate: u32,
    pub channels: u8,
    /// PCM frames carried by one compressed frame
    pub samples_per_frame: u32,
    /// Bitrate in kb/s (MPEG only, 0 for ADTS)
    pub bitrate: u32,
}

impl FrameHeader {
    /// Parse the header at the start of `data` for the given codec
    pub fn parse(codec: Codec, data: &[u8]) -> Option<Self> {
        match codec {
            Codec::Mp3 => Self::parse_mpeg(data),
            Codec::Aac => Self::parse_adts(data),
        }
    }

    /// Smallest number of bytes `parse` looks at for this codec
    pub fn min_len(codec: Codec) -> usize {
        match codec {
            Codec::Mp3 => MPEG_HEADER_LEN,
            Codec::Aac => ADTS_HEADER_LEN,
        }
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels)
    }

    /// Parse an MPEG audio frame header (11-bit sync)
    pub fn parse_mpeg(data: &[u8]) -> Option<Self> {
        if data.len() < MPEG_HEADER_LEN || !is_mpeg_sync(data[0], data[1]) {
            return None;
        }

        let version = match (data[1] >> 3) & 0x03 {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return None,
        };

        // 3 = layer I, 2 = layer II, 1 = layer III, 0 = reserved
        let layer = match (data[1] >> 1) & 0x03 {
            3 => 1,
            2 => 2,
            1 => 3,
            _ => return None,
        };

        let bitrate_index = ((data[2] >> 4) & 0x0F) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }

        let rate_index = ((data[2] >> 2) & 0x03) as usize;
        if rate_index == 3 {
            return None;
        }

        let (table, rates) = match version {
            MpegVersion::Mpeg1 => (0, 0),
            MpegVersion::Mpeg2 => (1, 1),
            MpegVersion::Mpeg25 => (1, 2),
        };
        let bitrate = MPEG_BITRATES[table][layer - 1][bitrate_index];
        let sample_rate = MPEG_SAMPLE_RATES[rates][rate_index];
        let padding = ((data[2] >> 1) & 0x01) as u32;

        let (frame_len, samples_per_frame) = match (layer, version) {
            (1, _) => ((12 * bitrate * 1000 / sample_rate + padding) * 4, 384),
            (3, MpegVersion::Mpeg2) | (3, MpegVersion::Mpeg25) => {
                (72 * bitrate * 1000 / sample_rate + padding, 576)
            }
            _ => (144 * bitrate * 1000 / sample_rate + padding, 1152),
        };

        let channels = if (data[3] >> 6) & 0x03 == 3 { 1 } else { 2 };

        Some(Self {
            codec: Codec::Mp3,
            frame_len: frame_len as usize,
            header_len: MPEG_HEADER_LEN,
            sample_rate,
            channels,
            samples_per_frame,
            bitrate,
        })
    }

    /// Parse an ADTS header (12-bit sync, layer 0)
    pub fn parse_adts(data: &[u8]) -> Option<Self> {
        if data.len() < ADTS_HEADER_LEN || !is_adts_sync(data[0], data[1]) {
            return None;
        }

        let protection_absent = data[1] & 0x01 == 1;
        let rate_index = ((data[2] >> 2) & 0x0F) as usize;
        let sample_rate = *ADTS_SAMPLE_RATES.get(rate_index)?;
        let channels = (((data[2] & 0x01) << 2) | (data[3] >> 6)) & 0x07;

        let frame_len = (((data[3] & 0x03) as usize) << 11)
            | ((data[4] as usize) << 3)
            | ((data[5] as usize) >> 5);
        let header_len = if protection_absent { 7 } else { 9 };
        if frame_len <= header_len {
            return None;
        }

        let raw_blocks = (data[6] & 0x03) as u32 + 1;

        Some(Self {
            codec: Codec::Aac,
            frame_len,
            header_len,
            sample_rate,
            channels: match channels {
                // Configuration 0 is signalled in-band, assume stereo
                0 => 2,
                7 => 8,
                n => n,
            },
            samples_per_frame: 1024 * raw_blocks,
            bitrate: 0,
        })
    }
}

#[inline]
pub fn is_mpeg_sync(b0: u8, b1: u8) -> bool {
    b0 == 0xFF && b1 != 0xFF && (b1 & 0xE0) == 0xE0
}

#[inline]
pub fn is_adts_sync(b0: u8, b1: u8) -> bool {
    b0 == 0xFF && (b1 & 0xF6) == 0xF0
}
