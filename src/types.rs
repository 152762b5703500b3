use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single content blob within an entry, as reported by the feed store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub value: String,
    pub mime_type: Option<String>,
    pub language: Option<String>,
}

/// An entry within a feed, as reported by the feed store.
///
/// The read/unread flag is owned by the store and never appears here:
/// everything the store hands back is, by definition, new or updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identifier assigned by the feed/store.
    pub id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub content: Vec<Content>,
}

impl Entry {
    /// The timestamp used for ordering: the update time, falling back
    /// to the publication time.
    pub fn effective_updated(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.published_at)
    }
}

/// An opaque per-feed cursor owned by the feed store.
///
/// The bundled stores encode an RFC 3339 timestamp, but nothing outside
/// the store may rely on that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker(pub String);

impl Marker {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Marker(dt.to_rfc3339())
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// A per-feed failure recorded in the digest context instead of
/// aborting the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedError {
    pub url: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("bad configuration: {0}")]
    Config(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("invalid profile name: {0}")]
    InvalidProfileName(String),

    #[error("profile already exists: {0}")]
    ProfileExists(String),

    #[error("feed with URL already exists: {0}")]
    DuplicateFeed(String),

    #[error("feed not found: {0}")]
    FeedNotFound(String),

    #[error("invalid OPML document: {0}")]
    BadOpml(String),

    #[error("feed store error: {0}")]
    Store(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DigestError>;
