//! Conversation session data model
//!
//! A [`Session`] is owned by the orchestrator; everything handed out is a clone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No page selected
    #[default]
    Idle,
    /// Retrieving page content or the fallback summary
    AcquiringContext,
    /// Opening turn produced, accepting user turns
    Conversing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AcquiringContext => write!(f, "acquiring_context"),
            Self::Conversing => write!(f, "conversing"),
        }
    }
}

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Role name used by the generator API
    #[must_use]
    pub const fn as_role(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "model",
        }
    }
}

/// A citation attached to an assistant turn
///
/// Both fields are guaranteed non-blank; construct through [`Source::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub label: String,
}

impl Source {
    /// Build a source, returning `None` if either field is missing or blank
    #[must_use]
    pub fn new(uri: Option<String>, label: Option<String>) -> Option<Self> {
        let uri = uri.filter(|u| !u.trim().is_empty())?;
        let label = label.filter(|l| !l.trim().is_empty())?;
        Some(Self { uri, label })
    }
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Always empty for user turns
    pub citations: Vec<Source>,
}

impl Turn {
    /// Create a user turn
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            created_at: Utc::now(),
            citations: Vec::new(),
        }
    }

    /// Create an assistant turn
    #[must_use]
    pub fn assistant(text: impl Into<String>, citations: Vec<Source>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            created_at: Utc::now(),
            citations,
        }
    }
}

/// Prior turn as seen by the generator: citations are not carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl From<&Turn> for HistoryEntry {
    fn from(turn: &Turn) -> Self {
        Self {
            speaker: turn.speaker,
            text: turn.text.clone(),
        }
    }
}

/// The top-level aggregate for one conversation
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub state: SessionState,
    pub source_url: Option<String>,
    /// Page title, or the URL when retrieval failed
    pub title: Option<String>,
    /// Extracted page text; `None` when the session runs on search grounding
    pub context: Option<String>,
    pub transcript: Vec<Turn>,
    /// A user turn is awaiting its reply
    pub processing: bool,
    /// Bumped on every start and reset; async results tagged with an older
    /// epoch are discarded
    pub epoch: u64,
}

impl Session {
    /// Whether replies rely on the generator's own search instead of page text
    #[must_use]
    pub const fn grounding_active(&self) -> bool {
        matches!(self.state, SessionState::Conversing) && self.context.is_none()
    }

    /// Transcript as generator history
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.transcript.iter().map(HistoryEntry::from).collect()
    }

    /// Return to `Idle`, dropping everything bound to the previous page
    pub fn clear(&mut self) {
        self.state = SessionState::Idle;
        self.source_url = None;
        self.title = None;
        self.context = None;
        self.transcript.clear();
        self.processing = false;
        self.epoch += 1;
    }
}
