//! PCM codec: float samples <-> base64 of little-endian 16-bit PCM
//!
//! Pure and stateless. Outbound frames are encoded from normalized `f32`
//! samples, inbound chunks are decoded back into per-channel float buffers.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scale between normalized float samples and 16-bit PCM
pub const PCM_SCALE: f32 = 32768.0;

/// Errors produced while decoding an inbound audio chunk
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload is not valid base64
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// 16-bit PCM needs an even number of bytes
    #[error("pcm payload has odd byte length {0}")]
    OddByteLength(usize),

    /// Channel count of zero
    #[error("channel count must be at least 1")]
    ZeroChannels,

    /// Sample rate of zero
    #[error("sample rate must be non-zero")]
    ZeroSampleRate,

    /// Interleaved samples do not divide evenly into frames
    #[error("{samples} samples do not divide into {channels} channels")]
    Misaligned { samples: usize, channels: u16 },
}

/// One audio frame wrapped for transport
///
/// Serializes as the `{mimeType, data}` blob used by the realtime input message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedChunk {
    /// Descriptor identifying the PCM rate, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64 of little-endian 16-bit PCM
    pub data: String,
}

/// Decoded audio with one sample vector per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Wrap mono samples
    #[must_use]
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Samples of one channel
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Average all channels into one
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.as_slice() {
            [] => Vec::new(),
            [only] => only.clone(),
            all => {
                let count = all.len() as f32;
                (0..self.frames())
                    .map(|i| all.iter().map(|c| c[i]).sum::<f32>() / count)
                    .collect()
            }
        }
    }
}

/// MIME-like descriptor for raw PCM at `sample_rate`
#[must_use]
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Convert one normalized sample to 16-bit PCM
///
/// Out-of-range input saturates at the i16 bounds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn float_to_pcm16(sample: f32) -> i16 {
    (sample * PCM_SCALE) as i16
}

/// Convert one 16-bit PCM sample back to the float domain
#[must_use]
pub fn pcm16_to_float(sample: i16) -> f32 {
    f32::from(sample) / PCM_SCALE
}

/// Encode a mono frame of float samples for transport
#[must_use]
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> EncodedChunk {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }

    EncodedChunk {
        mime_type: pcm_mime_type(sample_rate),
        data: STANDARD.encode(&bytes),
    }
}

/// Decode a base64 PCM payload into per-channel float samples
///
/// Interleaved input is split by `channels`, keeping channel order.
///
/// # Errors
///
/// Returns `DecodeError` if the payload is not base64, has an odd byte
/// length, or does not divide evenly into frames
pub fn decode_chunk(data: &str, sample_rate: u32, channels: u16) -> Result<AudioBuffer, DecodeError> {
    if channels == 0 {
        return Err(DecodeError::ZeroChannels);
    }
    if sample_rate == 0 {
        return Err(DecodeError::ZeroSampleRate);
    }

    let bytes = STANDARD.decode(data.trim())?;
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddByteLength(bytes.len()));
    }

    let samples = bytes.len() / 2;
    let channel_count = usize::from(channels);
    if samples % channel_count != 0 {
        return Err(DecodeError::Misaligned { samples, channels });
    }

    let frames = samples / channel_count;
    let mut out = vec![Vec::with_capacity(frames); channel_count];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        out[i % channel_count].push(pcm16_to_float(value));
    }

    Ok(AudioBuffer {
        sample_rate,
        channels: out,
    })
}
