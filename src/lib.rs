//! webvoice - Spoken conversations about web pages
//!
//! Give it a URL and it reads the page, then answers questions about it out
//! loud:
//! - Content acquisition (fetch and text extraction, with search-grounded
//!   fallback when a page cannot be read)
//! - Turn generation via Gemini
//! - Interruptible speech playback and microphone input
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │        REPL (text)   │   Microphone (voice)          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Orchestrator                        │
//! │   Session  │  Acquisition  │  Generator  │ Playback │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Providers                          │
//! │   HTTP + scraper  │  Gemini (chat, TTS)  │  Whisper │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod acquisition;
pub mod config;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod providers;
pub mod session;
pub mod voice;

pub use acquisition::{Acquisition, ContentRetriever, PageRetriever};
pub use config::Config;
pub use error::{Error, Result};
pub use generator::{Reply, ResponseBackend, TurnGenerator};
pub use orchestrator::{IgnoreReason, Orchestrator, SubmitOutcome};
pub use providers::GeminiClient;
pub use session::{Session, SessionState, Source, Speaker, Turn};
pub use voice::{PlaybackEngine, PlaybackEvent, SpeechSynthesizer};
