use crate::types::{Entry, FeedError};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single updated feed within the digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedDigest {
    pub url: String,
    pub title: String,
    /// Owning category name, `None` for uncategorized.
    pub category: Option<String>,
    /// Entries to display, already capped and ordered (update time
    /// descending, id ascending as tie-break).
    pub visible_entries: Vec<Entry>,
    /// Qualifying entries beyond the display cap.
    pub hidden_entries: usize,
}

impl FeedDigest {
    pub fn total_entries(&self) -> usize {
        self.visible_entries.len() + self.hidden_entries
    }
}

/// A category that contained at least one updated feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDigest {
    pub name: Option<String>,
    /// The name to render: the category name, or the configured
    /// uncategorized label.
    pub display_name: String,
    /// Updated feeds to display, in feed-list order.
    pub visible_feeds: Vec<FeedDigest>,
    /// Updated feeds beyond the per-category display cap.
    pub hidden_feeds: usize,
}

impl CategoryDigest {
    pub fn updated_feeds(&self) -> usize {
        self.visible_feeds.len() + self.hidden_feeds
    }
}

/// The root output structure for one digest run.
///
/// Created fresh per run, handed read-only to the renderer, never
/// persisted. Category order and in-category feed order mirror the
/// profile's feed list, so the digest layout is stable run over run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub profile_name: String,
    pub run_started_utc: DateTime<Utc>,
    pub last_run_utc: Option<DateTime<Utc>>,
    /// Total number of subscribed feeds, updated or not.
    pub subscribed_feeds: usize,
    /// Categories with at least one updated feed, in feed-list order.
    pub categories: Vec<CategoryDigest>,
    /// Per-feed failures encountered during the run.
    pub errors: Vec<FeedError>,
}

impl Context {
    /// All updated feeds, visible or hidden, across categories.
    pub fn updated_feeds(&self) -> usize {
        self.categories.iter().map(CategoryDigest::updated_feeds).sum()
    }

    /// All qualifying entries, visible or hidden, across feeds.
    pub fn updated_entries(&self) -> usize {
        self.categories
            .iter()
            .flat_map(|c| c.visible_feeds.iter())
            .map(FeedDigest::total_entries)
            .sum()
    }

    /// True when nothing updated and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.errors.is_empty()
    }
}
