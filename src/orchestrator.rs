//! Conversation orchestrator
//!
//! Drives a [`Session`] through `Idle → AcquiringContext → Conversing` and
//! back. Every async request captures the session epoch when it is issued;
//! a result arriving after a reset (or a newer start) finds a different
//! epoch and is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::acquisition::{ContentRetriever, PageRetriever};
use crate::generator::TurnGenerator;
use crate::providers::GeminiClient;
use crate::session::{Session, SessionState, Turn};
use crate::voice::{CpalOutput, NoSpeech, PlaybackEngine, SpeechSynthesizer};
use crate::{Config, Error, Result};

/// Why a submission produced no turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Input was blank
    Empty,
    /// No page has been analyzed yet
    NotConversing,
    /// A reply is already being generated
    Busy,
    /// The session was reset while the reply was generating
    Stale,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty input"),
            Self::NotConversing => write!(f, "not conversing"),
            Self::Busy => write!(f, "a reply is in progress"),
            Self::Stale => write!(f, "session was reset"),
        }
    }
}

/// Result of [`Orchestrator::submit`]
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The assistant turn appended for this submission
    Replied(Turn),
    Ignored(IgnoreReason),
}

struct Inner {
    retriever: Arc<dyn ContentRetriever>,
    generator: TurnGenerator,
    playback: PlaybackEngine,
    session: Mutex<Session>,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the session and sequences acquisition, generation and playback
///
/// Cloning yields another handle to the same conversation.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create an orchestrator over its collaborators
    #[must_use]
    pub fn new(
        retriever: Arc<dyn ContentRetriever>,
        generator: TurnGenerator,
        playback: PlaybackEngine,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                retriever,
                generator,
                playback,
                session: Mutex::new(Session::default()),
            }),
        }
    }

    /// Wire the HTTP retriever, Gemini and the default output device
    ///
    /// With audio disabled nothing is synthesized and no device is opened.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let gemini = Arc::new(GeminiClient::new(&config.gemini)?);
        let retriever = Arc::new(PageRetriever::new(&config.acquisition)?);

        let synthesizer: Arc<dyn SpeechSynthesizer> = if config.voice.audio_enabled {
            gemini.clone()
        } else {
            Arc::new(NoSpeech)
        };
        let playback = PlaybackEngine::new(synthesizer, Arc::new(CpalOutput::new()));

        Ok(Self::new(retriever, TurnGenerator::new(gemini), playback))
    }

    /// Analyze `url` and produce the opening turn
    ///
    /// Returns `Ok(None)` if the session was reset before the opening turn
    /// was ready.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` for a blank URL, `InvalidState` outside `Idle`,
    /// and unrecoverable generator errors; in the last case the session is
    /// back in `Idle` with an empty transcript.
    pub async fn start(&self, url: &str) -> Result<Option<Turn>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidUrl("url is empty".to_string()));
        }

        let epoch = {
            let mut session = self.inner.session();
            if session.state != SessionState::Idle {
                return Err(Error::InvalidState(format!(
                    "cannot start a new page while {}",
                    session.state
                )));
            }
            session.state = SessionState::AcquiringContext;
            session.source_url = Some(url.to_string());
            session.epoch += 1;
            session.epoch
        };

        tracing::info!(url, "acquiring context");
        let acquisition = self.inner.retriever.acquire(url).await;

        let (opening, context, title) = if acquisition.acquired {
            let text = format!(
                "I've analyzed the content of {}. What would you like to know?",
                acquisition.title
            );
            (
                Turn::assistant(text, Vec::new()),
                Some(acquisition.content),
                acquisition.title,
            )
        } else {
            if self.is_stale(epoch) {
                tracing::debug!(url, "discarding acquisition for a reset session");
                return Ok(None);
            }

            tracing::info!(url, "falling back to search-grounded summary");
            match self.inner.generator.summarize(url).await {
                Ok(reply) => (
                    Turn::assistant(reply.text, reply.citations),
                    None,
                    acquisition.title,
                ),
                Err(e) => {
                    let mut session = self.inner.session();
                    if session.epoch != epoch {
                        tracing::debug!(url, error = %e, "discarding failed summary for a reset session");
                        return Ok(None);
                    }
                    session.clear();
                    drop(session);
                    tracing::error!(url, error = %e, "could not analyze page");
                    return Err(e);
                }
            }
        };

        {
            let mut session = self.inner.session();
            if session.epoch != epoch {
                tracing::debug!(url, "discarding opening turn for a reset session");
                return Ok(None);
            }
            session.state = SessionState::Conversing;
            session.title = Some(title);
            session.context = context;
            session.transcript.push(opening.clone());
        }

        tracing::info!(url, citations = opening.citations.len(), "conversation ready");
        self.inner.playback.speak(&opening.text).await;

        Ok(Some(opening))
    }

    /// Submit a user turn and return the assistant's reply
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let input = text.trim();
        if input.is_empty() {
            return SubmitOutcome::Ignored(IgnoreReason::Empty);
        }

        let (epoch, url, context, history) = {
            let mut session = self.inner.session();
            if session.state != SessionState::Conversing {
                return SubmitOutcome::Ignored(IgnoreReason::NotConversing);
            }
            if session.processing {
                tracing::debug!("ignoring submission while a reply is in progress");
                return SubmitOutcome::Ignored(IgnoreReason::Busy);
            }

            self.inner.playback.cancel();

            let history = session.history();
            session.processing = true;
            session.transcript.push(Turn::user(input));
            (
                session.epoch,
                session.source_url.clone().unwrap_or_default(),
                session.context.clone().unwrap_or_default(),
                history,
            )
        };

        tracing::debug!(chars = input.len(), history = history.len(), "generating reply");
        let reply = self
            .inner
            .generator
            .respond(input, &url, &context, history)
            .await;

        let turn = {
            let mut session = self.inner.session();
            if session.epoch != epoch {
                tracing::debug!("discarding reply for a reset session");
                return SubmitOutcome::Ignored(IgnoreReason::Stale);
            }
            let turn = Turn::assistant(reply.text, reply.citations);
            session.transcript.push(turn.clone());
            session.processing = false;
            turn
        };

        self.inner.playback.speak(&turn.text).await;

        SubmitOutcome::Replied(turn)
    }

    /// Stop speech and return to `Idle`, forgetting the page
    ///
    /// Valid from any state.
    pub fn reset(&self) {
        self.inner.playback.cancel();
        self.inner.session().clear();
        tracing::info!("session reset");
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.session().state
    }

    /// A copy of the current session
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.inner.session().clone()
    }

    /// Whether a user turn is awaiting its reply
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.inner.session().processing
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.inner.playback.is_speaking()
    }

    /// The playback engine, for event subscription
    #[must_use]
    pub fn playback(&self) -> &PlaybackEngine {
        &self.inner.playback
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.inner.session().epoch != epoch
    }
}
