use crate::deliver::Delivery;
use crate::types::{DigestError, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Effective settings for one run, fully resolved and immutable.
///
/// Every option has a built-in default, so resolution always produces a
/// value for every recognized key.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// User-facing display name for the profile.
    pub name: Option<String>,
    pub date_format: String,
    pub time_format: String,
    pub datetime_format: String,
    /// Per-feed cap on visible entries. Negative means unlimited; zero
    /// means show none but still report the feed as updated.
    pub max_displayed_entries: i64,
    /// Per-category cap on visible updated feeds. Negative means
    /// unlimited.
    pub max_displayed_feeds: i64,
    /// Label used for feeds that belong to no category.
    pub uncategorized_name: String,
    pub timezone: Tz,
    /// Output template selector, consumed by the renderer.
    pub template: String,
    /// MIME type of the rendered output.
    pub output_format: String,
    pub delivery: Delivery,
    /// Bounded worker pool size for per-feed store queries.
    pub fetch_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: None,
            date_format: "%A %d %B %Y".to_string(),
            time_format: "%H:%M".to_string(),
            datetime_format: "%A %d %B %Y at %H:%M".to_string(),
            max_displayed_entries: -1,
            max_displayed_feeds: -1,
            uncategorized_name: "Uncategorized".to_string(),
            timezone: chrono_tz::UTC,
            template: "plain".to_string(),
            output_format: "text/plain".to_string(),
            delivery: Delivery::Stdout,
            fetch_concurrency: 8,
        }
    }
}

impl Settings {
    /// Convert a UTC timestamp to the configured timezone and format it
    /// with the configured datetime pattern.
    pub fn format_datetime(&self, dt: DateTime<Utc>) -> String {
        dt.with_timezone(&self.timezone)
            .format(&self.datetime_format)
            .to_string()
    }

    /// Format a UTC timestamp as a date only.
    pub fn format_date(&self, dt: DateTime<Utc>) -> String {
        dt.with_timezone(&self.timezone)
            .format(&self.date_format)
            .to_string()
    }
}

/// One configuration layer: every key optional, unknown keys ignored.
///
/// Ignoring unrecognized keys (rather than rejecting them) is the
/// documented strictness policy; a later version can introduce keys
/// without breaking older installs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsOverlay {
    pub name: Option<String>,
    pub date_format: Option<String>,
    pub time_format: Option<String>,
    pub datetime_format: Option<String>,
    pub max_displayed_entries: Option<i64>,
    pub max_displayed_feeds: Option<i64>,
    pub uncategorized_name: Option<String>,
    pub timezone: Option<String>,
    pub template: Option<String>,
    pub output_format: Option<String>,
    pub delivery: Option<Delivery>,
    pub fetch_concurrency: Option<usize>,
}

impl SettingsOverlay {
    /// Load an overlay from a TOML file. A missing file is not an
    /// error: it simply contributes no overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration file at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text)
            .map_err(|e| DigestError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Layered configuration resolution: profile value, else global value,
/// else built-in default. Values are atomic; there is no merging within
/// a single key.
pub struct ConfigResolver {
    config_dir: PathBuf,
}

impl ConfigResolver {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn global_config_file(&self) -> PathBuf {
        self.config_dir.join("rss-digest.toml")
    }

    pub fn profile_config_file(&self, profile: &str) -> PathBuf {
        self.config_dir
            .join("profiles")
            .join(profile)
            .join("rss-digest.toml")
    }

    /// Produce the effective settings for a profile. Pure read: no file
    /// is created or modified.
    pub fn resolve(&self, profile: &str) -> Result<Settings> {
        let global = SettingsOverlay::load(&self.global_config_file())?;
        let local = SettingsOverlay::load(&self.profile_config_file(profile))?;
        resolve_layers(local, global)
    }
}

/// First value wins: profile overlay, then global overlay, then the
/// built-in default.
fn resolve_layers(profile: SettingsOverlay, global: SettingsOverlay) -> Result<Settings> {
    let defaults = Settings::default();

    let timezone = match profile.timezone.or(global.timezone) {
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| DigestError::Config(format!("unknown timezone: {}", name)))?,
        None => defaults.timezone,
    };

    let fetch_concurrency = profile
        .fetch_concurrency
        .or(global.fetch_concurrency)
        .unwrap_or(defaults.fetch_concurrency);
    if fetch_concurrency == 0 {
        return Err(DigestError::Config(
            "fetch_concurrency must be at least 1".to_string(),
        ));
    }

    Ok(Settings {
        name: profile.name.or(global.name).or(defaults.name),
        date_format: profile
            .date_format
            .or(global.date_format)
            .unwrap_or(defaults.date_format),
        time_format: profile
            .time_format
            .or(global.time_format)
            .unwrap_or(defaults.time_format),
        datetime_format: profile
            .datetime_format
            .or(global.datetime_format)
            .unwrap_or(defaults.datetime_format),
        max_displayed_entries: profile
            .max_displayed_entries
            .or(global.max_displayed_entries)
            .unwrap_or(defaults.max_displayed_entries),
        max_displayed_feeds: profile
            .max_displayed_feeds
            .or(global.max_displayed_feeds)
            .unwrap_or(defaults.max_displayed_feeds),
        uncategorized_name: profile
            .uncategorized_name
            .or(global.uncategorized_name)
            .unwrap_or(defaults.uncategorized_name),
        timezone,
        template: profile
            .template
            .or(global.template)
            .unwrap_or(defaults.template),
        output_format: profile
            .output_format
            .or(global.output_format)
            .unwrap_or(defaults.output_format),
        delivery: profile
            .delivery
            .or(global.delivery)
            .unwrap_or(defaults.delivery),
        fetch_concurrency,
    })
}
