//! HTTP source for catalogs that expose page lists as JSON.
//!
//! Endpoints, relative to the base URL:
//! - `GET <chapter.url>` returns `[{"index": 0, "url": "...", "image_url": "..."}, ...]`
//! - `GET <page.url>` returns `{"image_url": "..."}` for pages listed without one
//! - image URLs are fetched as-is (relative ones are joined onto the base URL)

use super::{ImageResponse, RemotePage, Source};
use crate::error::{Error, Result, SourceError};
use crate::types::{Chapter, SourceId};
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Request timeout for page lists and image headers
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Deserialize)]
struct ImageUrlResponse {
    image_url: Option<String>,
}

/// [`Source`] backed by a JSON-over-HTTP catalog
#[derive(Clone, Debug)]
pub struct HttpSource {
    id: SourceId,
    name: String,
    lang: String,
    unmetered: bool,
    base_url: Url,
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a source rooted at `base_url`
    ///
    /// # Errors
    /// Returns error if the URL does not parse or the HTTP client cannot be created
    pub fn new(id: SourceId, name: &str, lang: &str, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config("base_url", format!("invalid source URL '{}': {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("chapter-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            id,
            name: name.to_string(),
            lang: lang.to_string(),
            unmetered: false,
            base_url,
            client,
        })
    }

    /// Mark the source as unmetered (e.g. a server on the local network)
    pub fn unmetered(mut self, unmetered: bool) -> Self {
        self.unmetered = unmetered;
        self
    }

    fn resolve(&self, url: &str) -> std::result::Result<Url, SourceError> {
        self.base_url
            .join(url)
            .map_err(|e| SourceError::Parse(format!("invalid URL '{}': {}", url, e)))
    }

    async fn get(&self, url: &str) -> std::result::Result<reqwest::Response, SourceError> {
        let url = self.resolve(url)?;
        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::Http {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Source for HttpSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lang(&self) -> &str {
        &self.lang
    }

    fn is_unmetered(&self) -> bool {
        self.unmetered
    }

    async fn fetch_page_list(
        &self,
        chapter: &Chapter,
    ) -> std::result::Result<Vec<RemotePage>, SourceError> {
        let response = self.get(&chapter.url).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| SourceError::Parse(format!("page list for '{}': {}", chapter.url, e)))
    }

    async fn fetch_image_url(
        &self,
        page_url: &str,
    ) -> std::result::Result<Option<String>, SourceError> {
        let response = self.get(page_url).await?;
        let body = response.bytes().await?;
        let parsed: ImageUrlResponse = serde_json::from_slice(&body)
            .map_err(|e| SourceError::Parse(format!("image URL for '{}': {}", page_url, e)))?;
        Ok(parsed.image_url.filter(|u| !u.is_empty()))
    }

    async fn fetch_image(&self, image_url: &str) -> std::result::Result<ImageResponse, SourceError> {
        let response = self.get(image_url).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SourceError::from))
            .boxed();

        Ok(ImageResponse {
            content_type,
            content_length,
            body,
        })
    }
}
