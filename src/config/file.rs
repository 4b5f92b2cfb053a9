//! TOML configuration file loading
//!
//! Supports `~/.config/webvoice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct WebvoiceConfigFile {
    /// Generator and synthesizer configuration
    #[serde(default)]
    pub gemini: GeminiFileConfig,

    /// Voice input/output configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Page retrieval configuration
    #[serde(default)]
    pub acquisition: AcquisitionFileConfig,
}

/// Gemini API configuration
#[derive(Debug, Default, Deserialize)]
pub struct GeminiFileConfig {
    pub api_key: Option<String>,

    /// API base URL (e.g. "https://generativelanguage.googleapis.com/v1beta")
    pub base_url: Option<String>,

    /// Model for conversation turns (e.g. "gemini-2.5-flash")
    pub chat_model: Option<String>,

    /// Model for speech synthesis
    pub tts_model: Option<String>,

    /// Prebuilt voice name (e.g. "Kore")
    pub tts_voice: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Play synthesized replies through the speakers
    pub audio_enabled: Option<bool>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// `OpenAI` key used for Whisper transcription
    pub openai_api_key: Option<String>,
}

/// Page retrieval configuration
#[derive(Debug, Default, Deserialize)]
pub struct AcquisitionFileConfig {
    /// Request timeout in seconds
    pub fetch_timeout_secs: Option<u64>,

    /// Upper bound on extracted page text, in characters
    pub max_context_chars: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `WebvoiceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> WebvoiceConfigFile {
    let Some(path) = config_file_path() else {
        return WebvoiceConfigFile::default();
    };

    if !path.exists() {
        return WebvoiceConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                WebvoiceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            WebvoiceConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> crate::Result<WebvoiceConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/webvoice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("webvoice").join("config.toml"))
}
