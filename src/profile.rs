use crate::context::Context;
use crate::digest::DigestBuilder;
use crate::feedlist::FeedList;
use crate::render;
use crate::settings::{ConfigResolver, Settings};
use crate::store::FeedStore;
use crate::types::{DigestError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// On-disk layout of the application: a configuration tree and a data
/// (state) tree, each with a per-profile subdirectory.
///
/// Locating per-OS directories is the caller's problem; this type only
/// derives paths under the two roots it is given.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Paths {
    pub fn new(config_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    pub fn profiles_config_dir(&self) -> PathBuf {
        self.config_dir.join("profiles")
    }

    pub fn profile_config_dir(&self, profile: &str) -> PathBuf {
        self.profiles_config_dir().join(profile)
    }

    /// The profile's feed list in the OPML exchange format.
    pub fn opml_file(&self, profile: &str) -> PathBuf {
        self.profile_config_dir(profile).join("feeds.opml")
    }

    pub fn profile_data_dir(&self, profile: &str) -> PathBuf {
        self.data_dir.join("profiles").join(profile)
    }

    /// State file for the bundled JSON feed store.
    pub fn state_file(&self, profile: &str) -> PathBuf {
        self.profile_data_dir(profile).join("state.json")
    }

    fn last_run_file(&self, profile: &str) -> PathBuf {
        self.profile_data_dir(profile).join("last_run")
    }
}

/// The coordinator tying everything together: profile management, feed
/// list edits, and digest runs. Different front ends (the CLI, tests,
/// embedders) all drive this one interface.
pub struct RssDigest {
    paths: Paths,
    resolver: ConfigResolver,
}

impl RssDigest {
    pub fn new(paths: Paths) -> Self {
        let resolver = ConfigResolver::new(paths.config_dir.clone());
        Self { paths, resolver }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Names of all existing profiles, sorted.
    pub fn profiles(&self) -> Result<Vec<String>> {
        let dir = self.paths.profiles_config_dir();
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn profile_exists(&self, profile: &str) -> bool {
        self.paths.profile_config_dir(profile).is_dir()
    }

    /// Create a new profile's config and data directories.
    pub fn add_profile(&self, profile: &str) -> Result<()> {
        validate_profile_name(profile)?;
        if self.profile_exists(profile) {
            return Err(DigestError::ProfileExists(profile.to_string()));
        }
        std::fs::create_dir_all(self.paths.profile_config_dir(profile))?;
        std::fs::create_dir_all(self.paths.profile_data_dir(profile))?;
        info!("Created profile {}", profile);
        Ok(())
    }

    /// Permanently delete a profile together with its configuration,
    /// feed list and state.
    pub fn delete_profile(&self, profile: &str) -> Result<()> {
        self.require_profile(profile)?;
        std::fs::remove_dir_all(self.paths.profile_config_dir(profile))?;
        let data_dir = self.paths.profile_data_dir(profile);
        if data_dir.exists() {
            std::fs::remove_dir_all(data_dir)?;
        }
        info!("Deleted profile {}", profile);
        Ok(())
    }

    fn require_profile(&self, profile: &str) -> Result<()> {
        if self.profile_exists(profile) {
            Ok(())
        } else {
            Err(DigestError::ProfileNotFound(profile.to_string()))
        }
    }

    pub fn load_feedlist(&self, profile: &str) -> Result<FeedList> {
        self.require_profile(profile)?;
        FeedList::load(&self.paths.opml_file(profile))
    }

    pub fn resolve_settings(&self, profile: &str) -> Result<Settings> {
        self.require_profile(profile)?;
        self.resolver.resolve(profile)
    }

    /// Add a feed to the profile's list and subscribe the store to it.
    pub async fn add_feed(
        &self,
        store: &dyn FeedStore,
        profile: &str,
        url: &str,
        title: Option<String>,
        category: Option<String>,
    ) -> Result<()> {
        url::Url::parse(url)?;
        let mut feedlist = self.load_feedlist(profile)?;
        feedlist.add_feed(url, title, category)?;
        feedlist.save(&self.paths.opml_file(profile))?;
        store.add_subscription(url).await?;
        info!("Added feed {} to profile {}", url, profile);
        Ok(())
    }

    /// Remove a feed from the profile's list and unsubscribe the store.
    pub async fn delete_feed(&self, store: &dyn FeedStore, profile: &str, url: &str) -> Result<()> {
        let mut feedlist = self.load_feedlist(profile)?;
        feedlist.delete_feed(url)?;
        feedlist.save(&self.paths.opml_file(profile))?;
        store.remove_subscription(url).await?;
        info!("Removed feed {} from profile {}", url, profile);
        Ok(())
    }

    /// When the profile's feeds were last processed, if ever.
    pub fn last_run(&self, profile: &str) -> Option<DateTime<Utc>> {
        let path = self.paths.last_run_file(profile);
        let text = std::fs::read_to_string(path).ok()?;
        match DateTime::parse_from_rfc3339(text.trim()) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                warn!("Unreadable last-run timestamp for {}: {}", profile, e);
                None
            }
        }
    }

    fn set_last_run(&self, profile: &str, dt: DateTime<Utc>) -> Result<()> {
        let path = self.paths.last_run_file(profile);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, dt.to_rfc3339())?;
        Ok(())
    }

    /// Perform a digest run and return the compiled context.
    ///
    /// A configuration error aborts before any feed work; per-feed
    /// failures end up inside the context instead. In forget mode no
    /// entries are marked read and the last-run timestamp stays put.
    pub async fn run(&self, store: &dyn FeedStore, profile: &str, forget: bool) -> Result<Context> {
        let (context, _) = self.run_inner(store, profile, forget).await?;
        Ok(context)
    }

    /// Perform a digest run, render it with the configured template and
    /// hand it to the configured delivery method.
    pub async fn run_and_deliver(
        &self,
        store: &dyn FeedStore,
        profile: &str,
        forget: bool,
    ) -> Result<Context> {
        let (context, settings) = self.run_inner(store, profile, forget).await?;
        let renderer = render::renderer_for(&settings.template)?;
        let body = renderer.render(&context, &settings)?;
        let subject = format!(
            "{}, your RSS digest for {}",
            settings.name.as_deref().unwrap_or(profile),
            settings.format_date(context.run_started_utc)
        );
        settings.delivery.deliver(&subject, &body)?;
        Ok(context)
    }

    async fn run_inner(
        &self,
        store: &dyn FeedStore,
        profile: &str,
        forget: bool,
    ) -> Result<(Context, Settings)> {
        self.require_profile(profile)?;
        let settings = self.resolver.resolve(profile)?;
        let feedlist = FeedList::load(&self.paths.opml_file(profile))?;
        let last_run = self.last_run(profile);

        let builder = DigestBuilder::new(&settings, store);
        let context = builder
            .build(profile, &feedlist, &HashMap::new(), last_run, forget)
            .await;

        if !forget {
            self.set_last_run(profile, context.run_started_utc)?;
        }
        Ok((context, settings))
    }
}

/// Profile names become directory names, so only a conservative
/// character set is allowed.
fn validate_profile_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok && name != "." && name != ".." {
        Ok(())
    } else {
        Err(DigestError::InvalidProfileName(name.to_string()))
    }
}
