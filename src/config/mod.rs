//! Configuration management for webvoice

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use crate::Result;
use file::WebvoiceConfigFile;

/// Default Gemini REST endpoint
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default upper bound on extracted page text
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 20_000;

/// Default limit on one Gemini request, generation or synthesis
pub const DEFAULT_GEMINI_TIMEOUT: Duration = Duration::from_secs(60);

/// webvoice configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Generator and synthesizer configuration
    pub gemini: GeminiConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Page retrieval configuration
    pub acquisition: AcquisitionConfig,
}

/// Gemini API configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key (`GEMINI_API_KEY`, falling back to `API_KEY`)
    pub api_key: Option<SecretString>,

    /// REST base URL without trailing slash
    pub base_url: String,

    /// Model used for conversation turns and summaries
    pub chat_model: String,

    /// Model used for speech synthesis
    pub tts_model: String,

    /// Prebuilt voice name
    pub tts_voice: String,

    /// Limit on each request, after which the call fails
    pub request_timeout: Duration,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Play synthesized replies
    pub audio_enabled: bool,

    /// Whisper model for microphone input
    pub stt_model: String,

    /// `OpenAI` API key for Whisper
    pub openai_api_key: Option<SecretString>,
}

/// Page retrieval configuration
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Request timeout
    pub fetch_timeout: Duration,

    /// Extracted text is truncated to this many characters
    pub max_context_chars: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(15),
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if configuration cannot be loaded
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit audio disable option
    ///
    /// # Errors
    ///
    /// Returns error if configuration cannot be loaded
    pub fn load_with_options(disable_audio: bool) -> Result<Self> {
        let fc = file::load_config_file();
        let mut config = Self::resolve(fc, |key| std::env::var(key).ok());

        if disable_audio {
            tracing::info!("audio output explicitly disabled via --no-audio");
            config.voice.audio_enabled = false;
        }

        if config.gemini.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; replies and speech will be unavailable");
        }

        Ok(config)
    }

    /// Merge a parsed config file with values from `env`
    ///
    /// `env` maps a variable name to its value; environment wins over the file.
    pub fn resolve(fc: WebvoiceConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |v: String| if v.trim().is_empty() { None } else { Some(v) };

        let gemini = GeminiConfig {
            api_key: env("GEMINI_API_KEY")
                .or_else(|| env("API_KEY"))
                .or(fc.gemini.api_key)
                .and_then(non_empty)
                .map(SecretString::from),
            base_url: env("WEBVOICE_GEMINI_URL")
                .or(fc.gemini.base_url)
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            chat_model: env("WEBVOICE_CHAT_MODEL")
                .or(fc.gemini.chat_model)
                .unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            tts_model: env("WEBVOICE_TTS_MODEL")
                .or(fc.gemini.tts_model)
                .unwrap_or_else(|| "gemini-2.5-flash-preview-tts".to_string()),
            tts_voice: env("WEBVOICE_TTS_VOICE")
                .or(fc.gemini.tts_voice)
                .unwrap_or_else(|| "Kore".to_string()),
            request_timeout: env("WEBVOICE_GEMINI_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.gemini.request_timeout_secs)
                .filter(|secs| *secs > 0)
                .map_or(DEFAULT_GEMINI_TIMEOUT, Duration::from_secs),
        };

        let voice = VoiceConfig {
            audio_enabled: env("WEBVOICE_AUDIO")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .or(fc.voice.audio_enabled)
                .unwrap_or(true),
            stt_model: env("WEBVOICE_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            openai_api_key: env("OPENAI_API_KEY")
                .or(fc.voice.openai_api_key)
                .and_then(non_empty)
                .map(SecretString::from),
        };

        let defaults = AcquisitionConfig::default();
        let acquisition = AcquisitionConfig {
            fetch_timeout: env("WEBVOICE_FETCH_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.acquisition.fetch_timeout_secs)
                .map_or(defaults.fetch_timeout, Duration::from_secs),
            max_context_chars: env("WEBVOICE_MAX_CONTEXT_CHARS")
                .and_then(|s| s.parse().ok())
                .or(fc.acquisition.max_context_chars)
                .unwrap_or(defaults.max_context_chars),
        };

        Self {
            gemini,
            voice,
            acquisition,
        }
    }
}
