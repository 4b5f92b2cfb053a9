//! Turn generation
//!
//! [`TurnGenerator`] shapes requests for a [`ResponseBackend`] and turns
//! whatever comes back into a [`Reply`] that is safe to put in a transcript:
//! failures become spoken apologies and incomplete citations are dropped.

pub mod prompt;

use async_trait::async_trait;

use crate::Result;
use crate::session::{HistoryEntry, Source};

/// Spoken when a conversation turn cannot be generated
pub const RESPOND_APOLOGY: &str = "Sorry, I encountered an error generating a response.";

/// Spoken when the model returned no text for a turn
pub const RESPOND_EMPTY: &str = "I couldn't generate a response.";

/// Spoken when neither retrieval nor search could describe the page
pub const SUMMARY_APOLOGY: &str =
    "I couldn't access the website directly or via search. Please check the URL.";

/// Spoken when the model returned no text for a summary
pub const SUMMARY_EMPTY: &str = "I found the website but couldn't generate a summary.";

/// A request to the backend
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_instruction: String,
    /// Prior turns, oldest first
    pub history: Vec<HistoryEntry>,
    pub prompt: String,
    /// Allow the backend to use its own search capability
    pub search: bool,
}

/// A citation as reported by the backend; either field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCitation {
    pub uri: Option<String>,
    pub title: Option<String>,
}

/// Unfiltered backend output
#[derive(Debug, Clone, Default)]
pub struct GeneratedReply {
    pub text: Option<String>,
    pub citations: Vec<RawCitation>,
}

/// A reply ready to become an assistant turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub citations: Vec<Source>,
}

impl Reply {
    fn apology(text: &str) -> Self {
        Self {
            text: text.to_string(),
            citations: Vec::new(),
        }
    }
}

/// Language-response generator
#[async_trait]
pub trait ResponseBackend: Send + Sync {
    /// Generate a reply
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedReply>;
}

/// Drop citations missing a URI or title, preserving order
#[must_use]
pub fn filter_citations(raw: Vec<RawCitation>) -> Vec<Source> {
    raw.into_iter()
        .filter_map(|c| Source::new(c.uri, c.title))
        .collect()
}

/// Produces assistant replies from a backend
#[derive(Clone)]
pub struct TurnGenerator {
    backend: std::sync::Arc<dyn ResponseBackend>,
}

impl TurnGenerator {
    /// Create a generator over `backend`
    #[must_use]
    pub fn new(backend: std::sync::Arc<dyn ResponseBackend>) -> Self {
        Self { backend }
    }

    /// Describe the subject of `url` without page content
    ///
    /// Backend failures become an apology reply.
    ///
    /// # Errors
    ///
    /// Returns error only for unrecoverable failures (missing credentials),
    /// which end the onboarding attempt
    pub async fn summarize(&self, url: &str) -> Result<Reply> {
        let request = GenerationRequest {
            system_instruction: prompt::summarize_instruction(),
            history: Vec::new(),
            prompt: prompt::summarize_prompt(url),
            search: true,
        };

        match self.backend.generate(request).await {
            Ok(reply) => Ok(shape(reply, SUMMARY_EMPTY)),
            Err(e) if e.is_unrecoverable() => Err(e),
            Err(e) => {
                tracing::error!(url, error = %e, "summary generation failed");
                Ok(Reply::apology(SUMMARY_APOLOGY))
            }
        }
    }

    /// Answer `input` about the page at `url`, given its `context`
    /// (possibly empty) and prior turns
    ///
    /// Never fails: any error becomes a spoken apology with no citations.
    pub async fn respond(
        &self,
        input: &str,
        url: &str,
        context: &str,
        history: Vec<HistoryEntry>,
    ) -> Reply {
        let request = GenerationRequest {
            system_instruction: prompt::respond_instruction(url, context),
            history,
            prompt: input.to_string(),
            search: true,
        };

        match self.backend.generate(request).await {
            Ok(reply) => shape(reply, RESPOND_EMPTY),
            Err(e) => {
                tracing::error!(error = %e, "chat generation failed");
                Reply::apology(RESPOND_APOLOGY)
            }
        }
    }
}

fn shape(reply: GeneratedReply, empty_text: &str) -> Reply {
    let text = reply
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| empty_text.to_string());

    let raw_count = reply.citations.len();
    let citations = filter_citations(reply.citations);
    if citations.len() < raw_count {
        tracing::debug!(
            dropped = raw_count - citations.len(),
            "dropped incomplete citations"
        );
    }

    Reply { text, citations }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::Error;
    use crate::session::Speaker;

    struct StubBackend {
        result: Mutex<Option<Result<GeneratedReply>>>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl StubBackend {
        fn new(result: Result<GeneratedReply>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ResponseBackend for StubBackend {
        async fn generate(&self, request: GenerationRequest) -> Result<GeneratedReply> {
            self.seen.lock().unwrap().push(request);
            self.result.lock().unwrap().take().unwrap()
        }
    }

    fn cite(uri: Option<&str>, title: Option<&str>) -> RawCitation {
        RawCitation {
            uri: uri.map(str::to_string),
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn test_filter_citations() {
        let sources = filter_citations(vec![
            cite(Some("https://a.example"), Some("A")),
            cite(None, Some("no uri")),
            cite(Some("https://c.example"), None),
            cite(Some("https://d.example"), Some("")),
            cite(Some("https://e.example"), Some("E")),
        ]);

        let labels: Vec<_> = sources.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["A", "E"]);
    }

    #[tokio::test]
    async fn test_respond_passes_context_and_history() {
        let backend = StubBackend::new(Ok(GeneratedReply {
            text: Some("  It is an example.  ".into()),
            citations: vec![cite(Some("https://example.com"), Some("Example"))],
        }));
        let generator = TurnGenerator::new(backend.clone());

        let history = vec![HistoryEntry {
            speaker: Speaker::Assistant,
            text: "Welcome".into(),
        }];
        let reply = generator
            .respond("What is it?", "https://example.com", "Example page text", history)
            .await;

        assert_eq!(reply.text, "It is an example.");
        assert_eq!(reply.citations.len(), 1);

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].prompt, "What is it?");
        assert_eq!(seen[0].history.len(), 1);
        assert!(seen[0].system_instruction.contains("Example page text"));
        assert!(seen[0].search);
    }

    #[tokio::test]
    async fn test_respond_without_context_names_the_url() {
        let backend = StubBackend::new(Ok(GeneratedReply::default()));
        TurnGenerator::new(backend.clone())
            .respond("Who runs it?", "https://blocked.example/", "", Vec::new())
            .await;

        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].system_instruction.contains("https://blocked.example/"));
    }

    #[tokio::test]
    async fn test_respond_failure_becomes_apology() {
        let backend = StubBackend::new(Err(Error::Generation("503".into())));
        let reply = TurnGenerator::new(backend).respond("hi", "https://example.com", "", Vec::new()).await;

        assert_eq!(reply.text, RESPOND_APOLOGY);
        assert!(reply.citations.is_empty());
    }

    #[tokio::test]
    async fn test_respond_missing_credential_becomes_apology() {
        let backend = StubBackend::new(Err(Error::MissingCredential("GEMINI_API_KEY")));
        let reply = TurnGenerator::new(backend).respond("hi", "https://example.com", "", Vec::new()).await;
        assert_eq!(reply.text, RESPOND_APOLOGY);
    }

    #[tokio::test]
    async fn test_respond_empty_text() {
        let backend = StubBackend::new(Ok(GeneratedReply::default()));
        let reply = TurnGenerator::new(backend).respond("hi", "https://example.com", "", Vec::new()).await;
        assert_eq!(reply.text, RESPOND_EMPTY);
    }

    #[tokio::test]
    async fn test_summarize_transport_failure_is_apology() {
        let backend = StubBackend::new(Err(Error::Generation("timeout".into())));
        let reply = TurnGenerator::new(backend)
            .summarize("https://example.com")
            .await
            .unwrap();
        assert_eq!(reply.text, SUMMARY_APOLOGY);
    }

    #[tokio::test]
    async fn test_summarize_missing_credential_is_error() {
        let backend = StubBackend::new(Err(Error::MissingCredential("GEMINI_API_KEY")));
        let result = TurnGenerator::new(backend).summarize("https://example.com").await;
        assert!(matches!(result, Err(Error::MissingCredential(_))));
    }

    #[tokio::test]
    async fn test_summarize_request_shape() {
        let backend = StubBackend::new(Ok(GeneratedReply {
            text: Some("Example Domain is a reserved domain.".into()),
            citations: vec![cite(Some("https://iana.org"), None)],
        }));
        let reply = TurnGenerator::new(backend.clone())
            .summarize("https://example.com")
            .await
            .unwrap();

        assert_eq!(reply.text, "Example Domain is a reserved domain.");
        assert!(reply.citations.is_empty());

        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].prompt.contains("https://example.com"));
        assert!(seen[0].history.is_empty());
    }
}
