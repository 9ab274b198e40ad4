//! Content sources: where page lists and images come from.
//!
//! A [`Source`] is supplied by the embedder. Every call is an ordinary future,
//! so dropping it (pipeline stop or pause) cancels the request.

mod http;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_support;

pub use http::HttpSource;

use crate::error::SourceError;
use crate::types::{Chapter, SourceId};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A page as reported by a source, before the pipeline re-indexes it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePage {
    /// Index claimed by the source (not trusted)
    #[serde(default)]
    pub index: usize,
    /// Page locator
    #[serde(default)]
    pub url: String,
    /// Direct image locator, when the page list already carries it
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Response to an image request
pub struct ImageResponse {
    /// Declared content type, e.g. `image/webp`
    pub content_type: Option<String>,
    /// Declared body size, used for byte progress
    pub content_length: Option<u64>,
    /// Body chunks
    pub body: BoxStream<'static, Result<Bytes, SourceError>>,
}

impl ImageResponse {
    /// Response backed by an in-memory buffer
    pub fn from_bytes(content_type: Option<&str>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            content_type: content_type.map(str::to_string),
            content_length: Some(data.len() as u64),
            body: stream::once(async move { Ok(data) }).boxed(),
        }
    }
}

impl std::fmt::Debug for ImageResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageResponse")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A catalog chapters are downloaded from
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier
    fn id(&self) -> SourceId;

    /// Display name, used for the source directory
    fn name(&self) -> &str;

    /// Language code, appended to the source directory name
    fn lang(&self) -> &str {
        ""
    }

    /// Unmetered sources (local files, self-hosted servers) never trigger
    /// queue-size warnings
    fn is_unmetered(&self) -> bool {
        false
    }

    /// Fetch the ordered page list of a chapter
    async fn fetch_page_list(&self, chapter: &Chapter) -> Result<Vec<RemotePage>, SourceError>;

    /// Resolve the image locator of a page that lacks one
    async fn fetch_image_url(&self, _page_url: &str) -> Result<Option<String>, SourceError> {
        Ok(None)
    }

    /// Start fetching an image
    async fn fetch_image(&self, image_url: &str) -> Result<ImageResponse, SourceError>;
}

/// Lookup table of registered sources
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<SourceId, Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source, replacing any previous one with the same id
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id(), source);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, source: Arc<dyn Source>) -> Self {
        self.register(source);
        self
    }

    /// Look up a source
    pub fn get(&self, id: SourceId) -> Option<Arc<dyn Source>> {
        self.sources.get(&id).cloned()
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no source is registered
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.sources.keys().map(|id| id.0).collect();
        ids.sort_unstable();
        f.debug_struct("SourceRegistry").field("sources", &ids).finish()
    }
}
