use crate::context::{CategoryDigest, Context, FeedDigest};
use crate::feedlist::FeedList;
use crate::settings::Settings;
use crate::store::FeedStore;
use crate::types::{Entry, FeedError, Marker};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Compiles one profile's qualifying entries into a [`Context`].
///
/// The build never fails outright: a feed whose query fails is recorded
/// in the context's error list and skipped, and the caller gets partial
/// results plus errors.
pub struct DigestBuilder<'a> {
    settings: &'a Settings,
    store: &'a dyn FeedStore,
}

/// Per-feed result of the query phase, before grouping.
struct Updated {
    /// Every qualifying entry id, visible or hidden. This is the set
    /// that gets marked read.
    ids: Vec<String>,
    visible: Vec<Entry>,
    hidden: usize,
}

impl<'a> DigestBuilder<'a> {
    pub fn new(settings: &'a Settings, store: &'a dyn FeedStore) -> Self {
        Self { settings, store }
    }

    /// Run the aggregation algorithm over every subscribed feed.
    ///
    /// `markers` optionally overrides the store's own per-feed cursors.
    /// In forget mode nothing is marked read, so a subsequent run sees
    /// the same entries again.
    pub async fn build(
        &self,
        profile_name: &str,
        feedlist: &FeedList,
        markers: &HashMap<String, Marker>,
        last_run: Option<DateTime<Utc>>,
        forget: bool,
    ) -> Context {
        let run_started = Utc::now();
        let concurrency = self.settings.fetch_concurrency.max(1);

        // Per-feed queries are independent; issue them through a
        // bounded pool. `buffered` keeps results in feed-list order, so
        // aggregation below stays deterministic.
        let results: Vec<_> = stream::iter(feedlist.feeds().map(|feed| {
            let url = feed.url.clone();
            let marker = markers.get(&url);
            async move {
                let result = self.store.query_updated(&url, marker).await;
                (url, result)
            }
        }))
        .buffered(concurrency)
        .collect()
        .await;

        // Single-threaded aggregation over the collected results.
        let mut errors = Vec::new();
        let mut updated: HashMap<String, Updated> = HashMap::new();
        for (url, result) in results {
            match result {
                Err(e) => {
                    warn!("Query failed for {}: {}", url, e);
                    errors.push(FeedError {
                        url,
                        message: e.to_string(),
                    });
                }
                Ok(qr) => {
                    let mut entries = qr.entries;
                    if entries.is_empty() {
                        debug!("No updates for {}", url);
                        continue;
                    }
                    entries.sort_by(|a, b| {
                        b.effective_updated()
                            .cmp(&a.effective_updated())
                            .then_with(|| a.id.cmp(&b.id))
                    });
                    let ids = entries.iter().map(|e| e.id.clone()).collect();
                    let (visible, hidden) =
                        apply_entry_cap(entries, self.settings.max_displayed_entries);
                    updated.insert(url, Updated { ids, visible, hidden });
                }
            }
        }

        // Group by category, preserving feed-list order throughout.
        // Categories with no updated feed are omitted entirely.
        let mut categories = Vec::new();
        for category in feedlist.categories() {
            let mut digests = Vec::new();
            for feed in &category.feeds {
                if let Some(u) = updated.get_mut(&feed.url) {
                    digests.push(FeedDigest {
                        url: feed.url.clone(),
                        title: feed.title.clone(),
                        category: category.name.clone(),
                        visible_entries: std::mem::take(&mut u.visible),
                        hidden_entries: u.hidden,
                    });
                }
            }
            if digests.is_empty() {
                continue;
            }
            let (visible_feeds, hidden_feeds) =
                apply_feed_cap(digests, self.settings.max_displayed_feeds);
            categories.push(CategoryDigest {
                display_name: category
                    .name
                    .clone()
                    .unwrap_or_else(|| self.settings.uncategorized_name.clone()),
                name: category.name.clone(),
                visible_feeds,
                hidden_feeds,
            });
        }

        // Every digest slice is final now; commit read marks, covering
        // all qualifying entries whether displayed or not. Nothing was
        // marked speculatively, so an interrupted run leaves untouched
        // feeds' markers alone.
        if !forget {
            for feed in feedlist.feeds() {
                let Some(u) = updated.get(&feed.url) else {
                    continue;
                };
                if let Err(e) = self.store.mark_read(&feed.url, &u.ids).await {
                    warn!("Failed to mark {} entries read for {}: {}", u.ids.len(), feed.url, e);
                    errors.push(FeedError {
                        url: feed.url.clone(),
                        message: format!("failed to mark read: {}", e),
                    });
                }
            }
        }

        let context = Context {
            profile_name: profile_name.to_string(),
            run_started_utc: run_started,
            last_run_utc: last_run,
            subscribed_feeds: feedlist.len(),
            categories,
            errors,
        };
        info!(
            "Compiled digest for {}: {} updated feeds in {} categories, {} errors",
            profile_name,
            context.updated_feeds(),
            context.categories.len(),
            context.errors.len()
        );
        context
    }
}

/// Split sorted entries into the visible prefix and a hidden count.
/// A negative cap means unlimited; zero means nothing visible but the
/// full count reported hidden.
fn apply_entry_cap(mut entries: Vec<Entry>, cap: i64) -> (Vec<Entry>, usize) {
    if cap < 0 {
        return (entries, 0);
    }
    let visible = (cap as usize).min(entries.len());
    let hidden = entries.len() - visible;
    entries.truncate(visible);
    (entries, hidden)
}

/// Same split for updated feeds within a category.
fn apply_feed_cap(mut feeds: Vec<FeedDigest>, cap: i64) -> (Vec<FeedDigest>, usize) {
    if cap < 0 {
        return (feeds, 0);
    }
    let visible = (cap as usize).min(feeds.len());
    let hidden = feeds.len() - visible;
    feeds.truncate(visible);
    (feeds, hidden)
}
