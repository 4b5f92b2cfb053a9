//! Exclusive, interruptible speech playback
//!
//! [`PlaybackEngine`] owns the single live [`PlaybackHandle`]. `speak`
//! replaces whatever is playing; `cancel` silences it. Completion signals are
//! matched against the active handle so a replaced or cancelled rendering
//! can never clear the state of its successor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, oneshot};

use super::SpeechSynthesizer;
use super::output::{AudioOutput, DeviceEvent};
use super::pcm::PcmBuffer;

/// Identity of one rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A started rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackHandle {
    id: HandleId,
}

impl PlaybackHandle {
    #[must_use]
    pub const fn id(&self) -> HandleId {
        self.id
    }
}

/// Playback notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started(HandleId),
    /// Natural end of audio
    Completed(HandleId),
    /// Silenced by `cancel` or a newer `speak`
    Cancelled(HandleId),
    Failed { id: HandleId, reason: String },
}

#[derive(Debug, Default)]
struct EngineState {
    active: Option<HandleId>,
    next_handle: u64,
    /// Bumped by every `speak` and `cancel`; a synthesis result is only used
    /// if the counter still matches the value seen when it was requested
    request: u64,
    speaking: bool,
}

struct Inner {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    state: Mutex<EngineState>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn finish(&self, id: HandleId, outcome: Result<DeviceEvent, oneshot::error::RecvError>) {
        let mut state = self.state();
        if state.active != Some(id) {
            tracing::trace!(handle = %id, "ignoring signal from inactive handle");
            return;
        }

        state.active = None;
        state.speaking = false;
        drop(state);

        match outcome {
            Ok(DeviceEvent::Completed) => {
                tracing::debug!(handle = %id, "playback complete");
                self.emit(PlaybackEvent::Completed(id));
            }
            Ok(DeviceEvent::Failed(reason)) => {
                tracing::warn!(handle = %id, %reason, "playback failed");
                self.emit(PlaybackEvent::Failed { id, reason });
            }
            Err(_) => {
                tracing::warn!(handle = %id, "output device dropped playback");
                self.emit(PlaybackEvent::Failed {
                    id,
                    reason: "output device dropped playback".to_string(),
                });
            }
        }
    }
}

/// Speaks text through a synthesizer and an output device
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<Inner>,
}

impl PlaybackEngine {
    /// Create an engine over a synthesizer and an output device
    #[must_use]
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, output: Arc<dyn AudioOutput>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                synthesizer,
                output,
                state: Mutex::new(EngineState::default()),
                events,
            }),
        }
    }

    /// Subscribe to playback notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// Whether speech is being synthesized or played
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.inner.state().speaking
    }

    /// The live handle, if any
    #[must_use]
    pub fn active(&self) -> Option<HandleId> {
        self.inner.state().active
    }

    /// Synthesize `text` and start playing it
    ///
    /// Anything already playing is cancelled first. Returns `None` when
    /// synthesis produced no audio, the device refused the buffer, or a newer
    /// `speak`/`cancel` superseded this call while synthesis was pending.
    pub async fn speak(&self, text: &str) -> Option<PlaybackHandle> {
        self.cancel();

        let request = {
            let mut state = self.inner.state();
            state.speaking = true;
            state.request
        };

        let audio = match self.inner.synthesizer.synthesize(text).await {
            Ok(Some(bytes)) if bytes.len() >= 2 => Some(bytes),
            Ok(_) => {
                tracing::debug!("synthesizer returned no audio");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed");
                None
            }
        };

        let mut state = self.inner.state();
        if state.request != request {
            tracing::debug!("discarding superseded synthesis");
            return None;
        }

        let Some(audio) = audio else {
            state.speaking = false;
            return None;
        };

        let buffer = PcmBuffer::from_le_bytes(&audio);
        let duration_ms = buffer.duration_ms();

        let receiver = match self.inner.output.start(buffer) {
            Ok(receiver) => receiver,
            Err(e) => {
                tracing::warn!(error = %e, "output device rejected audio");
                state.speaking = false;
                return None;
            }
        };

        state.next_handle += 1;
        let id = HandleId(state.next_handle);
        state.active = Some(id);
        drop(state);

        tracing::debug!(handle = %id, duration_ms, "playback started");
        self.inner.emit(PlaybackEvent::Started(id));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = receiver.await;
            inner.finish(id, outcome);
        });

        Some(PlaybackHandle { id })
    }

    /// Silence any playback and abandon pending synthesis
    ///
    /// No-op when nothing is playing; safe to call repeatedly.
    pub fn cancel(&self) {
        let mut state = self.inner.state();
        state.request += 1;
        state.speaking = false;
        let Some(id) = state.active.take() else {
            return;
        };

        // Held across `stop`: a concurrent `speak` starts only after it
        self.inner.output.stop();
        drop(state);

        tracing::debug!(handle = %id, "playback cancelled");
        self.inner.emit(PlaybackEvent::Cancelled(id));
    }
}
