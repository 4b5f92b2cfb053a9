//! Raw PCM decoding
//!
//! Synthesized speech arrives as mono, 16-bit signed little-endian samples
//! at 24 kHz. No other format is accepted.

/// Sample rate of synthesized speech
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Channel count of synthesized speech
pub const PLAYBACK_CHANNELS: u16 = 1;

/// Decoded audio ready for an output device
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    /// Decode raw synthesizer output
    ///
    /// A trailing odd byte is ignored.
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        Self {
            samples: decode_pcm16(bytes),
            sample_rate: PLAYBACK_SAMPLE_RATE,
            channels: PLAYBACK_CHANNELS,
        }
    }

    /// Playback length in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        let frames = self.samples.len() as u64 / u64::from(self.channels.max(1));
        frames * 1000 / u64::from(self.sample_rate.max(1))
    }
}

/// Convert little-endian i16 samples to f32 normalized by 32768
#[must_use]
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}
