// Frame synchronization
// A frame boundary is accepted only when a second sync pattern sits exactly
// one frame length later, since sync bytes also occur inside audio data.

use airwave_core::frame::{is_adts_sync, is_mpeg_sync};
use airwave_core::{Codec, FrameHeader};

/// Largest MPEG layer II/III frame is 2881 bytes; two frames plus a header
pub const MP3_SYNC_SIZE: usize = 2881 * 2 + 3;

pub const AAC_SYNC_SIZE: usize = 8192;

/// Bytes needed in the window before a synchronization attempt is meaningful
pub fn sync_size(codec: Codec) -> usize {
    match codec {
        Codec::Mp3 => MP3_SYNC_SIZE,
        Codec::Aac => AAC_SYNC_SIZE,
    }
}

/// Offset of the first frame in `window` that is followed by another frame
pub fn find_first_frame(codec: Codec, window: &[u8]) -> Option<usize> {
    let min_len = FrameHeader::min_len(codec);
    if window.len() < min_len {
        return None;
    }

    (0..=window.len() - min_len).find(|&offset| {
        let header = match FrameHeader::parse(codec, &window[offset..]) {
            Some(header) => header,
            None => return false,
        };

        let next = offset + header.frame_len;
        if next + 2 > window.len() {
            return false;
        }

        match codec {
            Codec::Mp3 => is_mpeg_sync(window[next], window[next + 1]),
            Codec::Aac => is_adts_sync(window[next], window[next + 1]),
        }
    })
}

/// Bytes that may be dropped from a window in which no frame was found
///
/// The tail may hold the start of a header, so it is kept.
pub fn discardable(codec: Codec, window_len: usize) -> usize {
    window_len.saturating_sub(FrameHeader::min_len(codec) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MP3_FRAME_LEN: usize = 417;

    fn mp3_frames(count: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for _ in 0..count {
            let mut frame = vec![0u8; MP3_FRAME_LEN];
            frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
            data.extend_from_slice(&frame);
        }
        data
    }

    fn adts_frame(len: usize) -> Vec<u8> {
        let mut frame = vec![0u8; len];
        frame[..7].copy_from_slice(&[
            0xFF,
            0xF1,
            0x50,
            0x80 | ((len >> 11) & 0x03) as u8,
            ((len >> 3) & 0xFF) as u8,
            (((len & 0x07) << 5) as u8) | 0x1F,
            0xFC,
        ]);
        frame
    }

    #[test]
    fn test_aligned_stream() {
        assert_eq!(find_first_frame(Codec::Mp3, &mp3_frames(3)), Some(0));
    }

    #[test]
    fn test_skips_garbage_prefix() {
        let mut data = vec![0x12, 0x34, 0xFF, 0x00, 0x99];
        data.extend_from_slice(&mp3_frames(2));
        assert_eq!(find_first_frame(Codec::Mp3, &data), Some(5));
    }

    #[test]
    fn test_lone_sync_pattern_is_rejected() {
        // Valid header whose successor is missing, then a real pair
        let mut data = vec![0xFF, 0xFB, 0x90, 0x00];
        data.extend_from_slice(&[0u8; 100]);
        data.extend_from_slice(&mp3_frames(2));
        assert_eq!(find_first_frame(Codec::Mp3, &data), Some(104));
    }

    #[test]
    fn test_single_frame_is_not_enough() {
        assert_eq!(find_first_frame(Codec::Mp3, &mp3_frames(1)), None);
        assert_eq!(find_first_frame(Codec::Mp3, &[0xFF, 0xFB]), None);
        assert_eq!(find_first_frame(Codec::Mp3, &[0u8; 8192]), None);
    }

    #[test]
    fn test_adts_pair() {
        let mut data = vec![0u8; 10];
        data.extend_from_slice(&adts_frame(300));
        data.extend_from_slice(&adts_frame(280));
        assert_eq!(find_first_frame(Codec::Aac, &data), Some(10));
    }

    #[test]
    fn test_sync_sizes() {
        assert_eq!(sync_size(Codec::Mp3), 5765);
        assert_eq!(sync_size(Codec::Aac), 8192);
        assert_eq!(discardable(Codec::Mp3, 100), 97);
        assert_eq!(discardable(Codec::Aac, 3), 0);
    }
}
