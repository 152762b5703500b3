use crate::types::{DigestError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::path::Path;
use tracing::{debug, info, warn};

/// A single subscription entry. The URL is the unique key within a
/// profile's feed list.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub url: String,
    pub title: String,
    /// Owning category; `None` means uncategorized.
    pub category: Option<String>,
}

/// A named group of feeds, or the uncategorized group (`name == None`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedCategory {
    pub name: Option<String>,
    pub feeds: Vec<Feed>,
}

/// In-memory model of a profile's subscriptions.
///
/// Categories are exactly one level deep. Each feed is owned by exactly
/// one category slot; the flat view iterates the same storage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedList {
    pub title: Option<String>,
    categories: Vec<FeedCategory>,
}

impl FeedList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Categories in insertion order.
    pub fn categories(&self) -> &[FeedCategory] {
        &self.categories
    }

    /// Flat iteration over every feed, in category order then
    /// in-category order.
    pub fn feeds(&self) -> impl Iterator<Item = &Feed> {
        self.categories.iter().flat_map(|c| c.feeds.iter())
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.feeds.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.feeds().any(|f| f.url == url)
    }

    pub fn get_feed(&self, url: &str) -> Option<&Feed> {
        self.feeds().find(|f| f.url == url)
    }

    /// Add a subscription. Re-adding an existing URL is rejected with
    /// `DuplicateFeed`, never an in-place update. A missing title
    /// defaults to the URL; a missing category means uncategorized.
    pub fn add_feed(
        &mut self,
        url: &str,
        title: Option<String>,
        category: Option<String>,
    ) -> Result<()> {
        if self.contains_url(url) {
            return Err(DigestError::DuplicateFeed(url.to_string()));
        }
        let feed = Feed {
            url: url.to_string(),
            title: title.unwrap_or_else(|| url.to_string()),
            category: category.clone(),
        };
        let idx = self.ensure_category(category);
        self.categories[idx].feeds.push(feed);
        Ok(())
    }

    /// Remove a subscription by URL. A named category emptied by the
    /// removal is dropped from the list.
    pub fn delete_feed(&mut self, url: &str) -> Result<()> {
        for (ci, category) in self.categories.iter_mut().enumerate() {
            if let Some(fi) = category.feeds.iter().position(|f| f.url == url) {
                category.feeds.remove(fi);
                if category.feeds.is_empty() && category.name.is_some() {
                    debug!("Category {:?} is empty; removing", category.name);
                    self.categories.remove(ci);
                }
                return Ok(());
            }
        }
        Err(DigestError::FeedNotFound(url.to_string()))
    }

    fn ensure_category(&mut self, name: Option<String>) -> usize {
        if let Some(idx) = self.categories.iter().position(|c| c.name == name) {
            return idx;
        }
        self.categories.push(FeedCategory {
            name,
            feeds: Vec::new(),
        });
        self.categories.len() - 1
    }

    /// Used during parsing: silently skips duplicate URLs instead of
    /// failing, so a sloppy source document still loads.
    fn push_feed_lossy(&mut self, feed: Feed) {
        if self.contains_url(&feed.url) {
            warn!("Duplicate feed URL {} in OPML; ignoring", feed.url);
            return;
        }
        let idx = self.ensure_category(feed.category.clone());
        self.categories[idx].feeds.push(feed);
    }

    /// Parse an OPML document.
    ///
    /// Only two outline kinds are recognized: `category` containers and
    /// `rss` leaves. Categories nested below the first level are
    /// flattened into their top-level ancestor; outlines of any other
    /// kind are dropped with a warning. Re-saving a loaded list will
    /// therefore not reproduce dropped structure, by design.
    pub fn from_opml_str(text: &str) -> Result<FeedList> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut list = FeedList::new();
        let mut in_head = false;
        let mut in_title = false;
        let mut in_body = false;
        let mut saw_body = false;
        // Name of the top-level category element we are currently
        // inside, if any.
        let mut current_category: Option<String> = None;
        let mut outline_depth: usize = 0;
        // Number of open outline elements in a dropped subtree.
        let mut skip: usize = 0;

        loop {
            match reader.read_event().map_err(xml_err)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"head" => in_head = true,
                    b"title" if in_head => in_title = true,
                    b"body" => {
                        in_body = true;
                        saw_body = true;
                    }
                    b"outline" if in_body => {
                        if skip > 0 {
                            skip += 1;
                            continue;
                        }
                        match outline_kind(&e)?.as_str() {
                            "category" => {
                                if outline_depth == 0 {
                                    let name = attr(&e, "text")?;
                                    current_category = name.clone();
                                    list.ensure_category(name);
                                } else {
                                    debug!("Flattening nested category into its parent");
                                }
                                outline_depth += 1;
                            }
                            "rss" => {
                                if let Some(feed) = feed_from_outline(&e, &current_category)? {
                                    list.push_feed_lossy(feed);
                                }
                                // An rss outline should be a leaf; drop
                                // whatever it wraps.
                                skip += 1;
                            }
                            other => {
                                warn!("Ignoring outline of unrecognized kind {:?}", other);
                                skip += 1;
                            }
                        }
                    }
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    b"outline" if in_body && skip == 0 => match outline_kind(&e)?.as_str() {
                        "category" => {
                            if outline_depth == 0 {
                                list.ensure_category(attr(&e, "text")?);
                            }
                        }
                        "rss" => {
                            if let Some(feed) = feed_from_outline(&e, &current_category)? {
                                list.push_feed_lossy(feed);
                            }
                        }
                        other => {
                            warn!("Ignoring outline of unrecognized kind {:?}", other);
                        }
                    },
                    _ => {}
                },
                Event::Text(t) => {
                    if in_title {
                        list.title = Some(t.unescape().map_err(xml_err)?.into_owned());
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"title" => in_title = false,
                    b"head" => in_head = false,
                    b"body" => in_body = false,
                    b"outline" => {
                        if skip > 0 {
                            skip -= 1;
                        } else if outline_depth > 0 {
                            outline_depth -= 1;
                            if outline_depth == 0 {
                                current_category = None;
                            }
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_body {
            return Err(DigestError::BadOpml("document has no body element".to_string()));
        }
        Ok(list)
    }

    /// Serialize to OPML: always flat, one level of categories, in
    /// insertion order.
    pub fn to_opml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::Start(
                BytesStart::new("opml").with_attributes([("version", "1.0")]),
            ))
            .map_err(xml_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("head")))
            .map_err(xml_err)?;
        if let Some(title) = &self.title {
            writer
                .write_event(Event::Start(BytesStart::new("title")))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(title)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("title")))
                .map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("head")))
            .map_err(xml_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("body")))
            .map_err(xml_err)?;
        for category in &self.categories {
            match &category.name {
                Some(name) => {
                    writer
                        .write_event(Event::Start(BytesStart::new("outline").with_attributes([
                            ("type", "category"),
                            ("text", name.as_str()),
                        ])))
                        .map_err(xml_err)?;
                    for feed in &category.feeds {
                        write_feed_outline(&mut writer, feed)?;
                    }
                    writer
                        .write_event(Event::End(BytesEnd::new("outline")))
                        .map_err(xml_err)?;
                }
                None => {
                    for feed in &category.feeds {
                        write_feed_outline(&mut writer, feed)?;
                    }
                }
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new("body")))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("opml")))
            .map_err(xml_err)?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| DigestError::BadOpml(e.to_string()))
    }

    /// Load the list from an OPML file. A missing file yields an empty
    /// list; a new file will be created on save.
    pub fn load(path: &Path) -> Result<FeedList> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let list = Self::from_opml_str(&text)?;
                info!("Loaded {} feeds from {}", list.len(), path.display());
                Ok(list)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No OPML file at {}; starting with an empty feed list",
                    path.display()
                );
                Ok(FeedList::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_opml_string()?)?;
        Ok(())
    }
}

fn write_feed_outline(writer: &mut Writer<Vec<u8>>, feed: &Feed) -> Result<()> {
    writer
        .write_event(Event::Empty(BytesStart::new("outline").with_attributes([
            ("type", "rss"),
            ("text", feed.title.as_str()),
            ("xmlUrl", feed.url.as_str()),
        ])))
        .map_err(xml_err)
}

/// An outline without a type attribute is assumed to be a category, as
/// some OPML emitters leave it off.
fn outline_kind(e: &BytesStart) -> Result<String> {
    Ok(attr(e, "type")?.unwrap_or_else(|| "category".to_string()))
}

fn feed_from_outline(e: &BytesStart, category: &Option<String>) -> Result<Option<Feed>> {
    let url = match attr(e, "xmlUrl")? {
        Some(url) => url,
        None => {
            warn!("rss outline has no xmlUrl attribute; ignoring");
            return Ok(None);
        }
    };
    let title = match attr(e, "text")?.or(attr(e, "title")?) {
        Some(title) if !title.is_empty() => title,
        _ => {
            warn!("rss outline for {} has no title; using the URL", url);
            url.clone()
        }
    };
    Ok(Some(Feed {
        url,
        title,
        category: category.clone(),
    }))
}

fn attr(e: &BytesStart, name: &str) -> Result<Option<String>> {
    match e.try_get_attribute(name).map_err(xml_err)? {
        Some(a) => Ok(Some(a.unescape_value().map_err(xml_err)?.into_owned())),
        None => Ok(None),
    }
}

fn xml_err<E: std::fmt::Display>(e: E) -> DigestError {
    DigestError::BadOpml(e.to_string())
}
