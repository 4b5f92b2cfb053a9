//! Microphone speech capture
//!
//! One listening session yields one finalized transcript: capture starts,
//! an energy-based endpointer waits for speech followed by a pause, and the
//! utterance is transcribed.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::capture::{Microphone, encode_wav};
use super::stt::SpeechToText;
use crate::{Error, Result};

/// Minimum RMS energy to consider a chunk speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to accept (0.3 s at 16 kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (0.8 s at 16 kHz)
const SILENCE_SAMPLES: usize = 12_800;

/// Give up when nobody speaks for this long
const NO_SPEECH_TIMEOUT: Duration = Duration::from_secs(8);

/// Hard cap on one utterance
const MAX_UTTERANCE: Duration = Duration::from_secs(30);

/// Produces one transcript per listening session
#[async_trait(?Send)]
pub trait SpeechCapture {
    /// Open the input device
    ///
    /// # Errors
    ///
    /// Returns error if the device is missing or refuses to start
    fn start(&mut self) -> Result<()>;

    /// Close the input device; no-op when not started
    fn stop(&mut self);

    /// Capture and transcribe one utterance
    ///
    /// `Ok(None)` means nothing was heard: nobody spoke before the timeout,
    /// or the transcript came back empty.
    ///
    /// # Errors
    ///
    /// Returns error if the device fails or transcription fails; see
    /// [`ListenFailure::classify`]
    async fn listen(&mut self) -> Result<Option<String>>;
}

/// What a failed listening session means for the rest of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenFailure {
    /// The microphone or its credentials are unusable; stop listening
    Disable,
    /// One transcription failed; report it and listen again
    Retry,
}

impl ListenFailure {
    #[must_use]
    pub const fn classify(error: &Error) -> Self {
        match error {
            Error::Audio(_) | Error::MissingCredential(_) => Self::Disable,
            _ => Self::Retry,
        }
    }
}

/// Endpointer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Waiting for speech
    Waiting,
    /// Speech detected, accumulating
    Speaking,
    /// Speech followed by enough silence
    Complete,
}

/// Energy-based end-of-utterance detection
pub struct UtteranceDetector {
    state: EndpointState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: EndpointState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Feed a chunk of samples, returning the new state
    pub fn process(&mut self, samples: &[f32]) -> EndpointState {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            EndpointState::Waiting => {
                if is_speech {
                    self.state = EndpointState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected");
                }
            }
            EndpointState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    if self.speech_buffer.len() > MIN_SPEECH_SAMPLES + self.silence_counter {
                        tracing::debug!(samples = self.speech_buffer.len(), "utterance complete");
                        self.state = EndpointState::Complete;
                    } else {
                        tracing::trace!("speech too short, resetting");
                        self.reset();
                    }
                }
            }
            EndpointState::Complete => {}
        }

        self.state
    }

    /// Take the captured utterance and reset
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let samples = std::mem::take(&mut self.speech_buffer);
        self.reset();
        samples
    }

    /// Reset to waiting
    pub fn reset(&mut self) {
        self.state = EndpointState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }
}

/// Microphone capture transcribed with Whisper
pub struct MicrophoneListener {
    microphone: Option<Microphone>,
    stt: SpeechToText,
}

impl MicrophoneListener {
    /// Create a listener; the device is opened on `start`
    #[must_use]
    pub const fn new(stt: SpeechToText) -> Self {
        Self {
            microphone: None,
            stt,
        }
    }
}

#[async_trait(?Send)]
impl SpeechCapture for MicrophoneListener {
    fn start(&mut self) -> Result<()> {
        let microphone = match self.microphone.take() {
            Some(microphone) => microphone,
            None => Microphone::open()?,
        };
        self.microphone.insert(microphone).resume()
    }

    fn stop(&mut self) {
        if let Some(microphone) = self.microphone.as_mut() {
            microphone.pause();
        }
    }

    async fn listen(&mut self) -> Result<Option<String>> {
        self.start()?;

        let mut detector = UtteranceDetector::new();
        let started = Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_millis(100));

        let utterance = loop {
            ticker.tick().await;

            let chunk = self
                .microphone
                .as_ref()
                .map(Microphone::drain)
                .unwrap_or_default();

            match detector.process(&chunk) {
                EndpointState::Complete => break detector.take_utterance(),
                EndpointState::Waiting if started.elapsed() > NO_SPEECH_TIMEOUT => {
                    self.stop();
                    tracing::debug!("no speech before timeout");
                    return Ok(None);
                }
                _ if started.elapsed() > MAX_UTTERANCE => break detector.take_utterance(),
                _ => {}
            }
        };

        self.stop();

        let wav = encode_wav(&utterance)?;
        let transcript = self.stt.transcribe(&wav).await?;

        if transcript.is_empty() {
            tracing::debug!("transcript empty");
            return Ok(None);
        }

        Ok(Some(transcript))
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
