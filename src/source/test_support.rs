//! In-memory source for unit tests.

use super::{ImageResponse, RemotePage, Source};
use crate::error::SourceError;
use crate::types::{Chapter, SourceId};
use std::collections::HashMap;

/// Serves a fixed page list and fixed image bodies
pub(crate) struct StaticSource {
    id: SourceId,
    name: String,
    pages: Vec<RemotePage>,
    images: HashMap<String, (Option<String>, Vec<u8>)>,
    unmetered: bool,
}

impl StaticSource {
    pub(crate) fn new(id: i64, pages: Vec<RemotePage>) -> Self {
        Self {
            id: SourceId(id),
            name: format!("Source {id}"),
            pages,
            images: HashMap::new(),
            unmetered: false,
        }
    }

    pub(crate) fn unmetered(mut self) -> Self {
        self.unmetered = true;
        self
    }

    pub(crate) fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub(crate) fn with_image(mut self, url: &str, content_type: Option<&str>, data: Vec<u8>) -> Self {
        self.images
            .insert(url.to_string(), (content_type.map(str::to_string), data));
        self
    }
}

#[async_trait::async_trait]
impl Source for StaticSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_unmetered(&self) -> bool {
        self.unmetered
    }

    async fn fetch_page_list(&self, _chapter: &Chapter) -> Result<Vec<RemotePage>, SourceError> {
        Ok(self.pages.clone())
    }

    async fn fetch_image(&self, image_url: &str) -> Result<ImageResponse, SourceError> {
        match self.images.get(image_url) {
            Some((content_type, data)) => Ok(ImageResponse::from_bytes(
                content_type.as_deref(),
                data.clone(),
            )),
            None => Err(SourceError::Http {
                status: 404,
                url: image_url.to_string(),
            }),
        }
    }
}
