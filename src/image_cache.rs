//! Reader-side image cache.
//!
//! Images a reader already displayed are kept on disk under the MD5 of their
//! URL. The download pipeline copies a cached image instead of fetching it
//! again, then evicts the entry since the chapter now owns the file.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Directory of cached images keyed by URL hash
#[derive(Clone, Debug)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    /// Use `dir` as the cache directory, creating it if needed
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key of an image URL (lowercase hex MD5)
    pub fn key(url: &str) -> String {
        format!("{:x}", md5::compute(url.as_bytes()))
    }

    /// Where the image for `url` is (or would be) stored
    pub fn image_path(&self, url: &str) -> PathBuf {
        self.dir.join(Self::key(url))
    }

    /// Whether an image for `url` is cached
    pub async fn is_image_in_cache(&self, url: &str) -> bool {
        tokio::fs::metadata(self.image_path(url))
            .await
            .is_ok_and(|m| m.is_file())
    }

    /// Store an image; the entry appears atomically
    pub async fn put_image(&self, url: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.image_path(url);
        let tmp = path.with_extension(crate::utils::TMP_FILE_EXTENSION);
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    /// Evict an image; returns whether it was present
    pub async fn remove_image(&self, url: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.image_path(url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn key_is_md5_of_url() {
        assert_eq!(ImageCache::key(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_ne!(
            ImageCache::key("https://a/1.jpg"),
            ImageCache::key("https://a/2.jpg")
        );
    }

    #[tokio::test]
    async fn put_lookup_remove() {
        let dir = TempDir::new().unwrap();
        let cache = ImageCache::new(dir.path().join("images")).await.unwrap();
        let url = "https://cdn.example.com/p/1.webp";

        assert!(!cache.is_image_in_cache(url).await);

        let path = cache.put_image(url, b"webp bytes").await.unwrap();
        assert!(cache.is_image_in_cache(url).await);
        assert_eq!(path, cache.image_path(url));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"webp bytes");

        assert!(cache.remove_image(url).await.unwrap());
        assert!(!cache.remove_image(url).await.unwrap());
        assert!(!cache.is_image_in_cache(url).await);
    }
}
