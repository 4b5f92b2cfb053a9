//! Voice processing module
//!
//! Handles speech synthesis playback, microphone capture and transcription.

mod capture;
mod listener;
mod output;
mod pcm;
mod playback;
mod stt;

use async_trait::async_trait;

pub use capture::{Microphone, SAMPLE_RATE, encode_wav};
pub use listener::{
    EndpointState, ListenFailure, MicrophoneListener, SpeechCapture, UtteranceDetector,
};
pub use output::{AudioOutput, CpalOutput, DeviceEvent};
pub use pcm::{PLAYBACK_CHANNELS, PLAYBACK_SAMPLE_RATE, PcmBuffer, decode_pcm16};
pub use playback::{HandleId, PlaybackEngine, PlaybackEvent, PlaybackHandle};
pub use stt::SpeechToText;

use crate::Result;

/// Turns text into raw 16-bit little-endian PCM at 24 kHz
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`
    ///
    /// `Ok(None)` means the service answered without audio.
    ///
    /// # Errors
    ///
    /// Returns error if the synthesis request fails
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>>;
}

/// Synthesizer used when audio is disabled; never produces sound
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpeech;

#[async_trait]
impl SpeechSynthesizer for NoSpeech {
    async fn synthesize(&self, _text: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}
