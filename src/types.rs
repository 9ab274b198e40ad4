//! Core types for chapter-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

id_type!(
    /// Identifier of a content source
    SourceId
);
id_type!(
    /// Identifier of a manga within the library
    MangaId
);
id_type!(
    /// Identifier of a chapter; the queue is unique by this value
    ChapterId
);

/// A manga whose chapters can be downloaded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manga {
    /// Library identifier
    pub id: MangaId,
    /// Source the manga belongs to
    pub source: SourceId,
    /// Display title, used to build the manga directory name
    pub title: String,
}

/// One downloadable chapter of a manga
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Library identifier
    pub id: ChapterId,
    /// Owning manga
    pub manga_id: MangaId,
    /// Chapter name as shown by the source
    pub name: String,
    /// Scanlation group, prefixed onto the directory name when present
    pub scanlator: Option<String>,
    /// Source-relative chapter URL
    pub url: String,
    /// Position in the source's chapter list (higher = newer)
    pub source_order: i64,
}

/// Lifecycle state of a chapter download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Not queued
    #[default]
    NotDownloaded,
    /// Waiting in the queue
    Queue,
    /// Pages are being fetched
    Downloading,
    /// Materialized on disk
    Downloaded,
    /// Failed; eligible for retry
    Error,
}

impl DownloadState {
    /// Convert integer state code to DownloadState
    pub fn from_i32(state: i32) -> Self {
        match state {
            0 => DownloadState::NotDownloaded,
            1 => DownloadState::Queue,
            2 => DownloadState::Downloading,
            3 => DownloadState::Downloaded,
            4 => DownloadState::Error,
            _ => DownloadState::Error, // Unknown codes are treated as failures
        }
    }

    /// Convert DownloadState to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            DownloadState::NotDownloaded => 0,
            DownloadState::Queue => 1,
            DownloadState::Downloading => 2,
            DownloadState::Downloaded => 3,
            DownloadState::Error => 4,
        }
    }

    /// Whether a download in this state still has work ahead of it
    pub fn is_active(&self) -> bool {
        matches!(self, DownloadState::Queue | DownloadState::Downloading)
    }
}

/// Lifecycle state of a single page
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    /// Not yet started
    #[default]
    Queue,
    /// Resolving the image URL
    LoadPage,
    /// Fetching image bytes
    DownloadImage,
    /// Staged in the temp workspace
    Ready,
    /// Failed after all retries
    Error,
}

impl PageState {
    pub(crate) fn from_u8(state: u8) -> Self {
        match state {
            0 => PageState::Queue,
            1 => PageState::LoadPage,
            2 => PageState::DownloadImage,
            3 => PageState::Ready,
            _ => PageState::Error,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            PageState::Queue => 0,
            PageState::LoadPage => 1,
            PageState::DownloadImage => 2,
            PageState::Ready => 3,
            PageState::Error => 4,
        }
    }
}

/// Latest progress of a chapter download, published through a `watch` channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Current state
    pub state: DownloadState,
    /// Pages that reached [`PageState::Ready`]
    pub downloaded_pages: usize,
    /// Page list size (0 while unknown)
    pub total_pages: usize,
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Chapter added to the queue
    Queued {
        /// Chapter id
        chapter_id: ChapterId,
        /// Chapter name
        name: String,
    },

    /// Chapter removed from the queue without being downloaded
    Removed {
        /// Chapter id
        chapter_id: ChapterId,
    },

    /// Chapter progress update (coalesced; intermediate ticks may be skipped)
    Progress {
        /// Chapter id
        chapter_id: ChapterId,
        /// Pages ready so far
        downloaded_pages: usize,
        /// Page list size
        total_pages: usize,
    },

    /// Byte progress of a single page (coalesced like [`Event::Progress`])
    PageProgress {
        /// Chapter id
        chapter_id: ChapterId,
        /// Re-indexed page number
        page: usize,
        /// Percentage (0-100)
        percent: u8,
    },

    /// Chapter materialized on disk
    Downloaded {
        /// Chapter id
        chapter_id: ChapterId,
        /// Final directory or archive
        path: PathBuf,
    },

    /// Chapter or page failure
    Failed {
        /// Chapter id, if the failure is scoped to one
        chapter_id: Option<ChapterId>,
        /// Error message
        error: String,
        /// Chapter name
        #[serde(skip_serializing_if = "Option::is_none")]
        chapter_name: Option<String>,
        /// Manga title
        #[serde(skip_serializing_if = "Option::is_none")]
        manga_title: Option<String>,
    },

    /// Warning for the user (queue size, pipeline stopped with a reason)
    Warning {
        /// Warning text
        message: String,
        /// How long the warning should stay visible
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Pipeline started
    Started,

    /// Pipeline paused with work left in the queue
    Paused,

    /// Pipeline stopped
    Stopped,

    /// Every queued chapter finished
    Completed,

    /// Queue cleared by the user
    QueueCleared,

    /// Graceful shutdown initiated
    Shutdown,
}

/// Snapshot of queue counts per state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Total entries
    pub total: usize,
    /// Entries waiting
    pub queued: usize,
    /// Entries currently downloading
    pub downloading: usize,
    /// Entries downloaded but not yet reconciled
    pub downloaded: usize,
    /// Entries in error
    pub errored: usize,
}
