//! Resampling and PCM16 encoding for the uplink, PCM16 decoding for the downlink.
//!
//! The resampler uses nearest-neighbor sample selection rather than bandlimited
//! interpolation. That is a deliberate simplicity/latency tradeoff inherited from
//! the product: uplink speech survives it fine, and it keeps the capture callback
//! cheap. Do not "upgrade" it to a high-fidelity resampler.

use crate::error::{MirrorError, MirrorResult};
use base64::Engine as _;

/// Scale-and-clamp a float sample in [-1, 1] to the i16 range.
#[inline]
pub fn sample_to_i16(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert float samples at `input_rate` to PCM16 at `target_rate`.
///
/// When the rates match this is a direct scale-and-clamp with no interpolation.
/// Otherwise the output picks the nearest earlier input sample. Output length
/// is within ±1 of `round(len × target_rate / input_rate)`.
pub fn resample_to_pcm16(samples: &[f32], input_rate: u32, target_rate: u32) -> Vec<i16> {
    if input_rate == target_rate {
        return samples.iter().map(|&v| sample_to_i16(v)).collect();
    }

    let ratio = input_rate as f64 / target_rate as f64;
    let new_len = (samples.len() as f64 / ratio).round() as usize;
    let mut out = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src = ((i as f64 * ratio) as usize).min(samples.len().saturating_sub(1));
        out.push(sample_to_i16(samples[src]));
    }
    out
}

/// A PCM16 chunk ready for transmission, tagged with its MIME descriptor.
/// Produced exactly once per capture frame; ordering is preserved end-to-end.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// PCM16 little-endian bytes.
    pub data: Vec<u8>,

    /// MIME-like descriptor, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

impl EncodedChunk {
    /// Build a chunk from PCM16 samples at the given rate.
    pub fn from_pcm16(samples: &[i16], sample_rate: u32) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            data,
            mime_type: format!("audio/pcm;rate={}", sample_rate),
        }
    }

    /// Resample-and-encode a float frame in one step (the uplink path).
    pub fn from_frame(samples: &[f32], input_rate: u32, target_rate: u32) -> Self {
        let pcm = resample_to_pcm16(samples, input_rate, target_rate);
        Self::from_pcm16(&pcm, target_rate)
    }

    /// Transport encoding used by the endpoint.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Number of PCM16 samples in the chunk.
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }
}

/// Decode little-endian PCM16 bytes to float samples in [-1, 1].
///
/// An odd byte count means a malformed payload; the caller drops it and the
/// session continues.
pub fn decode_pcm16_le(bytes: &[u8]) -> MirrorResult<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(MirrorError::Decode(format!(
            "PCM16 payload has odd byte count ({})",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect())
}
