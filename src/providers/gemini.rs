//! Gemini API client
//!
//! Serves two roles: conversation turns (`generateContent` with the search
//! tool, citations taken from grounding metadata) and speech synthesis
//! (audio response modality, raw PCM returned as base64 inline data).

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::generator::{GeneratedReply, GenerationRequest, RawCitation, ResponseBackend};
use crate::voice::SpeechSynthesizer;
use crate::{Error, Result};

/// Gemini REST client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    chat_model: String,
    tts_model: String,
    voice: String,
}

// Request types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: EmptyObject,
}

#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'a str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

// Response types

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

impl GeminiClient {
    /// Create a client from configuration
    ///
    /// A missing API key is not an error here; each call reports
    /// [`Error::MissingCredential`] instead. Every request is bounded by
    /// `config.request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            chat_model: config.chat_model.clone(),
            tts_model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
        })
    }

    fn api_key(&self) -> Result<&SecretString> {
        self.api_key
            .as_ref()
            .ok_or(Error::MissingCredential("GEMINI_API_KEY"))
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse> {
        let api_key = self.api_key()?;
        let url = format!("{}/models/{model}:generateContent", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, model, "Gemini API error");
            return Err(Error::Generation(format!("Gemini API error {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ResponseBackend for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedReply> {
        let mut contents: Vec<Content<'_>> = request
            .history
            .iter()
            .map(|entry| Content {
                role: Some(entry.speaker.as_role()),
                parts: vec![TextPart { text: &entry.text }],
            })
            .collect();
        contents.push(Content {
            role: Some("user"),
            parts: vec![TextPart {
                text: &request.prompt,
            }],
        });

        let body = GenerateContentRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![TextPart {
                    text: &request.system_instruction,
                }],
            }),
            tools: if request.search {
                vec![Tool {
                    google_search: EmptyObject {},
                }]
            } else {
                Vec::new()
            },
            generation_config: None,
        };

        tracing::debug!(
            model = %self.chat_model,
            history = request.history.len(),
            "requesting reply"
        );

        let response = self.generate_content(&self.chat_model, &body).await?;
        Ok(reply_from_response(response))
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: None,
                parts: vec![TextPart { text }],
            }],
            system_instruction: None,
            tools: Vec::new(),
            generation_config: Some(GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: &self.voice,
                        },
                    },
                },
            }),
        };

        let response = self
            .generate_content(&self.tts_model, &body)
            .await
            .map_err(|e| match e {
                Error::Generation(msg) => Error::Tts(msg),
                other => other,
            })?;

        audio_from_response(response)
    }
}

/// Concatenated text and web citations of the first candidate
fn reply_from_response(response: GenerateContentResponse) -> GeneratedReply {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return GeneratedReply::default();
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let citations = candidate
        .grounding_metadata
        .map(|m| m.grounding_chunks)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|chunk| chunk.web)
        .map(|web| RawCitation {
            uri: web.uri,
            title: web.title,
        })
        .collect();

    GeneratedReply {
        text: if text.is_empty() { None } else { Some(text) },
        citations,
    }
}

/// Decoded audio bytes of the first inline-data part, if any
fn audio_from_response(response: GenerateContentResponse) -> Result<Option<Vec<u8>>> {
    let inline = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.inline_data));

    let Some(inline) = inline else {
        tracing::warn!("speech response contained no audio");
        return Ok(None);
    };

    let bytes = base64::engine::general_purpose::STANDARD.decode(inline.data.as_bytes())?;
    tracing::debug!(mime = %inline.mime_type, bytes = bytes.len(), "speech synthesized");

    Ok(if bytes.is_empty() { None } else { Some(bytes) })
}
