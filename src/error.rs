//! Error types for chapter-dl
//!
//! This module provides the error hierarchy used throughout the library:
//! - [`Error`] is the crate-wide error returned by public operations
//! - [`DownloadError`] covers chapter-level failures (empty page lists, incomplete chapters)
//! - [`DatabaseError`] covers the SQLite-backed queue store and download cache
//! - [`SourceError`] is what a [`Source`](crate::source::Source) implementation reports

use crate::types::ChapterId;
use thiserror::Error;

/// Result type alias for chapter-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chapter-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_pages")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Chapter download error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Error reported by a content source
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CBZ archive could not be written or verified
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Image could not be decoded or re-encoded (tall-image splitting)
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// No source registered for the given id
    #[error("unknown source: {0}")]
    UnknownSource(i64),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required before a chapter may start
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Chapter-level download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The source returned no pages for the chapter
    #[error("page list is empty for chapter {chapter}")]
    EmptyPageList {
        /// The chapter whose page list came back empty
        chapter: ChapterId,
    },

    /// Completion check failed: the page counts do not agree
    #[error(
        "chapter {chapter} incomplete: expected {expected} pages, {ready} ready, {on_disk} on disk"
    )]
    Incomplete {
        /// The chapter that failed the completion check
        chapter: ChapterId,
        /// Page list size
        expected: usize,
        /// Number of pages that reported ready
        ready: usize,
        /// Number of primary image files found in the temp workspace
        on_disk: usize,
    },

    /// Archive entry did not match the file it was written from
    #[error("archive entry {entry} failed verification: {reason}")]
    ArchiveVerification {
        /// Entry name inside the archive
        entry: String,
        /// What did not match
        reason: String,
    },

    /// The page has no image URL and the source could not resolve one
    #[error("page {index} has no image URL")]
    MissingImageUrl {
        /// The re-indexed page number
        index: usize,
    },
}

/// Errors reported by [`Source`](crate::source::Source) implementations
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The response could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),

    /// Source-specific failure
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
