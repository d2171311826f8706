// Frame decoding using Symphonia

use airwave_core::{AudioError, AudioFormat, Codec, DecodeStatus, FrameDecoder, FrameHeader, Result};
use std::collections::VecDeque;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Channels, Signal};
use symphonia::core::codecs::{
    CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_AAC, CODEC_TYPE_MP3,
};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use symphonia::core::sample::Sample;

/// Decoder for MP3 and ADTS AAC frames fed one at a time
pub struct SymphoniaFrameDecoder {
    decoder: Box<dyn Decoder>,
    codec: Codec,
    /// Format the codec was configured with (AAC has no in-band reconfiguration)
    stream_format: AudioFormat,
    /// Format of the most recently decoded samples
    format: AudioFormat,
    samples: VecDeque<f32>,
    timestamp: u64,
}

impl SymphoniaFrameDecoder {
    /// Create a decoder for the stream whose first frame starts `window`
    pub fn new(codec: Codec, window: &[u8]) -> Result<Self> {
        let header = FrameHeader::parse(codec, window).ok_or_else(|| {
            AudioError::DecodingError("Window does not start with a frame header".to_string())
        })?;

        let format = header.format();
        let decoder = make_decoder(codec, format)?;
        log::info!(
            "Decoder opened: {:?} {} Hz, {} channels",
            codec,
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            decoder,
            codec,
            stream_format: format,
            format,
            samples: VecDeque::new(),
            timestamp: 0,
        })
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }
}

/// `DecoderOpener`-compatible constructor
pub fn open_decoder(codec: Codec, window: &[u8]) -> Result<Box<dyn FrameDecoder>> {
    Ok(Box::new(SymphoniaFrameDecoder::new(codec, window)?))
}

impl FrameDecoder for SymphoniaFrameDecoder {
    fn decode(&mut self, input: &[u8]) -> Result<DecodeStatus> {
        let header = match FrameHeader::parse(self.codec, input) {
            Some(header) => header,
            None if input.len() < FrameHeader::min_len(self.codec) => {
                return Ok(DecodeStatus::need_more(self.format));
            }
            None => return Ok(DecodeStatus::lost_sync(self.format)),
        };

        if input.len() < header.frame_len {
            return Ok(DecodeStatus::need_more(self.format));
        }

        // The AAC decoder is fixed to the parameters it was built with
        if self.codec == Codec::Aac && header.format() != self.stream_format {
            log::info!(
                "ADTS format changed to {} Hz, {} channels",
                header.sample_rate,
                header.channels
            );
            self.decoder = make_decoder(self.codec, header.format())?;
            self.stream_format = header.format();
        }

        // MP3 packets carry their header, AAC packets are raw access units
        let payload = match self.codec {
            Codec::Mp3 => &input[..header.frame_len],
            Codec::Aac => &input[header.header_len..header.frame_len],
        };
        let packet = Packet::new_from_slice(
            0,
            self.timestamp,
            header.samples_per_frame as u64,
            payload,
        );
        self.timestamp += header.samples_per_frame as u64;

        match self.decoder.decode(&packet) {
            Ok(buffer) => {
                let spec = *buffer.spec();
                let format = AudioFormat::new(spec.rate, spec.channels.count() as u8);
                let samples = append_interleaved(buffer, &mut self.samples);
                self.format = format;

                Ok(DecodeStatus {
                    used: header.frame_len,
                    samples,
                    format,
                    lost_sync: false,
                    failed: false,
                })
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Dropping undecodable frame ({} bytes): {}", header.frame_len, e);
                Ok(DecodeStatus::failed(header.frame_len, self.format))
            }
            Err(SymphoniaError::ResetRequired) => {
                log::debug!("Decoder reset requested");
                self.decoder.reset();
                Ok(DecodeStatus::failed(header.frame_len, self.format))
            }
            Err(e) => Err(AudioError::DecodingError(format!("Decoding failed: {}", e))),
        }
    }

    fn read_samples(&mut self, output: &mut [f32]) -> usize {
        let n = output.len().min(self.samples.len());
        for (dst, src) in output.iter_mut().zip(self.samples.drain(..n)) {
            *dst = src;
        }
        n
    }

    fn remaining(&self) -> usize {
        self.samples.len()
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.samples.clear();
    }
}

fn make_decoder(codec: Codec, format: AudioFormat) -> Result<Box<dyn Decoder>> {
    let codec_type = match codec {
        Codec::Mp3 => CODEC_TYPE_MP3,
        Codec::Aac => CODEC_TYPE_AAC,
    };

    let mut params = CodecParameters::new();
    params
        .for_codec(codec_type)
        .with_sample_rate(format.sample_rate)
        .with_channels(channel_mask(format.channels));

    symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| AudioError::DecodingError(format!("Failed to create decoder: {}", e)))
}

/// Channel mask with the first `count` positions set
fn channel_mask(count: u8) -> Channels {
    let count = u32::from(count.clamp(1, 8));
    Channels::from_bits_truncate((1u32 << count) - 1)
}

/// Append a decoded buffer to `output` as interleaved f32 samples
fn append_interleaved(buffer: AudioBufferRef, output: &mut VecDeque<f32>) -> usize {
    match buffer {
        AudioBufferRef::U8(buf) => interleave(&buf, output),
        AudioBufferRef::U16(buf) => interleave(&buf, output),
        AudioBufferRef::U24(buf) => interleave(&buf, output),
        AudioBufferRef::U32(buf) => interleave(&buf, output),
        AudioBufferRef::S8(buf) => interleave(&buf, output),
        AudioBufferRef::S16(buf) => interleave(&buf, output),
        AudioBufferRef::S24(buf) => interleave(&buf, output),
        AudioBufferRef::S32(buf) => interleave(&buf, output),
        AudioBufferRef::F32(buf) => interleave(&buf, output),
        AudioBufferRef::F64(buf) => interleave(&buf, output),
    }
}

fn interleave<S>(buffer: &AudioBuffer<S>, output: &mut VecDeque<f32>) -> usize
where
    S: Sample + IntoSample<f32>,
{
    let channels = buffer.spec().channels.count();
    let frames = buffer.frames();
    output.reserve(frames * channels);

    for frame in 0..frames {
        for ch in 0..channels {
            output.push_back(buffer.chan(ch)[frame].into_sample());
        }
    }

    frames * channels
}
