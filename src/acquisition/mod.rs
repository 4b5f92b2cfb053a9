//! Content acquisition
//!
//! Resolves a URL to conversational context. Failure is an ordinary outcome
//! here (pages block bots, render client-side, or are unreachable), so
//! [`ContentRetriever::acquire`] never returns an error; callers branch on
//! [`Acquisition::acquired`] instead.

mod extract;
mod fetch;

use async_trait::async_trait;

pub use extract::{ExtractedPage, collapse_whitespace, extract_page};
pub use fetch::{PageFetcher, validate_url};

use crate::Result;
use crate::config::AcquisitionConfig;

/// Outcome of retrieving a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub content: String,
    pub title: String,
    pub acquired: bool,
}

impl Acquisition {
    /// Successful retrieval
    #[must_use]
    pub fn success(content: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            title: title.into(),
            acquired: true,
        }
    }

    /// Failed retrieval: empty content, the URL stands in for the title
    #[must_use]
    pub fn failed(url: &str) -> Self {
        Self {
            content: String::new(),
            title: url.to_string(),
            acquired: false,
        }
    }
}

/// Retrieves page text for a URL
#[async_trait]
pub trait ContentRetriever: Send + Sync {
    /// Retrieve and extract the page at `url`
    async fn acquire(&self, url: &str) -> Acquisition;
}

/// Retriever that fetches pages over HTTP and extracts their text
pub struct PageRetriever {
    fetcher: PageFetcher,
    max_chars: usize,
}

impl PageRetriever {
    /// Create a retriever from acquisition settings
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &AcquisitionConfig) -> Result<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(config.fetch_timeout)?,
            max_chars: config.max_context_chars,
        })
    }

    async fn try_acquire(&self, url: &str) -> Result<ExtractedPage> {
        let body = self.fetcher.fetch(url).await?;

        if body.trim().is_empty() {
            return Err(crate::Error::WebFetch("empty response body".to_string()));
        }

        let extracted = extract_page(&body, url, self.max_chars);
        if extracted.text.is_empty() {
            return Err(crate::Error::WebFetch("no extractable text".to_string()));
        }

        Ok(extracted)
    }
}

#[async_trait]
impl ContentRetriever for PageRetriever {
    async fn acquire(&self, url: &str) -> Acquisition {
        match self.try_acquire(url).await {
            Ok(page) => {
                tracing::info!(
                    url,
                    title = %page.title,
                    chars = page.text.chars().count(),
                    "page content acquired"
                );
                Acquisition::success(page.text, page.title)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "page retrieval failed, falling back to search grounding");
                Acquisition::failed(url)
            }
        }
    }
}
