//! Error types for webvoice

use thiserror::Error;

/// Result type alias for webvoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in webvoice
#[derive(Debug, Error)]
pub enum Error {
    /// A required credential was not configured
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    /// Operation not valid in the current session state
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// URL rejected before any request was made
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Web fetch error (SSRF protection, request failures)
    #[error("web fetch error: {0}")]
    WebFetch(String),

    /// Response generation error
    #[error("generation error: {0}")]
    Generation(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Base64 decoding error
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl Error {
    /// Whether retrying without new credentials can never succeed
    #[must_use]
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::MissingCredential(_))
    }
}
