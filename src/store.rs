use crate::types::{DigestError, Entry, Marker, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Result of a single feed-store query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Entries that are unread or were updated after the marker.
    pub entries: Vec<Entry>,
    /// Candidate new marker for the feed. The store does not commit it
    /// until `mark_read` is called.
    pub marker: Option<Marker>,
}

/// The consumed feed-store interface.
///
/// Fetching feed content over the network and parsing feed formats
/// happen behind this trait; the engine only queries, marks read, and
/// keeps the subscription set in sync.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Entries for `feed_url` that are unread or were updated after the
    /// given marker. `None` means "use the store's own marker".
    async fn query_updated(&self, feed_url: &str, marker: Option<&Marker>) -> Result<QueryResult>;

    /// Mark the given entries read and advance the feed's marker.
    async fn mark_read(&self, feed_url: &str, entry_ids: &[String]) -> Result<()>;

    async fn add_subscription(&self, feed_url: &str) -> Result<()>;

    async fn remove_subscription(&self, feed_url: &str) -> Result<()>;
}

/// Per-feed state shared by the bundled store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FeedState {
    entries: Vec<Entry>,
    read: BTreeSet<String>,
    marker: Option<Marker>,
}

impl FeedState {
    fn qualifying(&self, marker: Option<&Marker>) -> Vec<Entry> {
        let since = marker
            .or(self.marker.as_ref())
            .and_then(Marker::as_datetime);
        self.entries
            .iter()
            .filter(|e| {
                !self.read.contains(&e.id)
                    || matches!(
                        (since, e.effective_updated()),
                        (Some(s), Some(u)) if u > s
                    )
            })
            .cloned()
            .collect()
    }

    fn candidate_marker(&self, entries: &[Entry]) -> Option<Marker> {
        entries
            .iter()
            .filter_map(Entry::effective_updated)
            .max()
            .map(Marker::from_datetime)
            .or_else(|| self.marker.clone())
    }

    /// Upsert entries by id. A re-ingested id replaces the stored entry
    /// and clears its read flag, so an updated entry surfaces again.
    fn ingest(&mut self, entries: Vec<Entry>) {
        for entry in entries {
            self.read.remove(&entry.id);
            if let Some(existing) = self.entries.iter_mut().find(|e| e.id == entry.id) {
                *existing = entry;
            } else {
                self.entries.push(entry);
            }
        }
    }

    fn mark_read(&mut self, entry_ids: &[String]) {
        let marked: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|e| entry_ids.contains(&e.id))
            .collect();
        let advanced = marked
            .iter()
            .filter_map(|e| e.effective_updated())
            .max()
            .map(Marker::from_datetime);
        for id in entry_ids {
            self.read.insert(id.clone());
        }
        // Only ever move the marker forward.
        match (&self.marker, advanced) {
            (Some(old), Some(new)) if new.as_datetime() > old.as_datetime() => {
                self.marker = Some(new)
            }
            (None, Some(new)) => self.marker = Some(new),
            _ => {}
        }
    }
}

fn unknown_feed(url: &str) -> DigestError {
    DigestError::Store(format!("not subscribed to feed: {}", url))
}

/// In-memory feed store for tests and embedding. Entries are seeded
/// through `ingest`; `set_failing` injects per-feed query failures.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    feeds: BTreeMap<String, FeedState>,
    failing: BTreeSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or update entries for a feed, subscribing to it if needed.
    pub async fn ingest(&self, feed_url: &str, entries: Vec<Entry>) {
        let mut state = self.inner.lock().await;
        state
            .feeds
            .entry(feed_url.to_string())
            .or_default()
            .ingest(entries);
    }

    /// Make every subsequent query for `feed_url` fail.
    pub async fn set_failing(&self, feed_url: &str, failing: bool) {
        let mut state = self.inner.lock().await;
        if failing {
            state.failing.insert(feed_url.to_string());
        } else {
            state.failing.remove(feed_url);
        }
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn query_updated(&self, feed_url: &str, marker: Option<&Marker>) -> Result<QueryResult> {
        let state = self.inner.lock().await;
        if state.failing.contains(feed_url) {
            return Err(DigestError::Store(format!(
                "injected failure for feed: {}",
                feed_url
            )));
        }
        let feed = state.feeds.get(feed_url).ok_or_else(|| unknown_feed(feed_url))?;
        let entries = feed.qualifying(marker);
        let marker = feed.candidate_marker(&entries);
        Ok(QueryResult { entries, marker })
    }

    async fn mark_read(&self, feed_url: &str, entry_ids: &[String]) -> Result<()> {
        let mut state = self.inner.lock().await;
        let feed = state
            .feeds
            .get_mut(feed_url)
            .ok_or_else(|| unknown_feed(feed_url))?;
        feed.mark_read(entry_ids);
        Ok(())
    }

    async fn add_subscription(&self, feed_url: &str) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.feeds.entry(feed_url.to_string()).or_default();
        Ok(())
    }

    async fn remove_subscription(&self, feed_url: &str) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.feeds.remove(feed_url);
        state.failing.remove(feed_url);
        Ok(())
    }
}

/// File-backed feed store: entries, read flags and per-feed markers
/// persisted as a JSON state file under the profile's data directory.
///
/// An external fetcher populates the file through `ingest`; this store
/// only persists and answers queries, it performs no network or feed
/// parsing work.
pub struct JsonStore {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, FeedState>>,
}

impl JsonStore {
    /// Open the store at `path`, creating empty state if the file does
    /// not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let feeds = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store state at {}; starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            inner: Mutex::new(feeds),
        })
    }

    fn persist(&self, feeds: &BTreeMap<String, FeedState>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(feeds)?)?;
        Ok(())
    }

    /// Seed or update entries for a feed and persist immediately.
    pub async fn ingest(&self, feed_url: &str, entries: Vec<Entry>) -> Result<()> {
        let mut feeds = self.inner.lock().await;
        feeds
            .entry(feed_url.to_string())
            .or_default()
            .ingest(entries);
        self.persist(&feeds)
    }
}

#[async_trait]
impl FeedStore for JsonStore {
    async fn query_updated(&self, feed_url: &str, marker: Option<&Marker>) -> Result<QueryResult> {
        let feeds = self.inner.lock().await;
        let feed = feeds.get(feed_url).ok_or_else(|| unknown_feed(feed_url))?;
        let entries = feed.qualifying(marker);
        let marker = feed.candidate_marker(&entries);
        Ok(QueryResult { entries, marker })
    }

    async fn mark_read(&self, feed_url: &str, entry_ids: &[String]) -> Result<()> {
        let mut feeds = self.inner.lock().await;
        let feed = feeds
            .get_mut(feed_url)
            .ok_or_else(|| unknown_feed(feed_url))?;
        feed.mark_read(entry_ids);
        self.persist(&feeds)
    }

    async fn add_subscription(&self, feed_url: &str) -> Result<()> {
        let mut feeds = self.inner.lock().await;
        feeds.entry(feed_url.to_string()).or_default();
        self.persist(&feeds)?;
        info!("Subscribed to {}", feed_url);
        Ok(())
    }

    async fn remove_subscription(&self, feed_url: &str) -> Result<()> {
        let mut feeds = self.inner.lock().await;
        feeds.remove(feed_url);
        self.persist(&feeds)?;
        info!("Unsubscribed from {}", feed_url);
        Ok(())
    }
}
