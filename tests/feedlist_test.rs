use rss_digest::feedlist::FeedList;
use rss_digest::types::DigestError;

const SAMPLE_OPML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="1.0">
  <head><title>My feeds</title></head>
  <body>
    <outline type="rss" text="Rust Blog" xmlUrl="https://blog.rust-lang.org/feed.xml"/>
    <outline type="category" text="News">
      <outline type="rss" text="BBC" xmlUrl="https://feeds.bbci.co.uk/news/rss.xml"/>
      <outline type="category" text="Nested">
        <outline type="rss" text="NPR" xmlUrl="https://feeds.npr.org/1001/rss.xml"/>
      </outline>
      <outline type="link" text="Not a feed" url="https://example.com"/>
    </outline>
  </body>
</opml>"#;

#[test]
fn load_flattens_nesting_and_drops_unknown_outlines() {
    let list = FeedList::from_opml_str(SAMPLE_OPML).unwrap();

    assert_eq!(list.title.as_deref(), Some("My feeds"));
    assert_eq!(list.len(), 3, "the link outline must not become a feed");

    let categories = list.categories();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].name, None);
    assert_eq!(categories[0].feeds[0].title, "Rust Blog");

    // NPR was nested two levels deep; it gets flattened into News.
    assert_eq!(categories[1].name.as_deref(), Some("News"));
    let urls: Vec<&str> = categories[1].feeds.iter().map(|f| f.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://feeds.bbci.co.uk/news/rss.xml",
            "https://feeds.npr.org/1001/rss.xml"
        ]
    );
    for feed in &categories[1].feeds {
        assert_eq!(feed.category.as_deref(), Some("News"));
    }
}

#[test]
fn round_trip_preserves_triples_and_is_deterministic() {
    let list = FeedList::from_opml_str(SAMPLE_OPML).unwrap();
    let saved = list.to_opml_string().unwrap();
    let reloaded = FeedList::from_opml_str(&saved).unwrap();

    let triples = |l: &FeedList| -> Vec<(Option<String>, String, String)> {
        l.feeds()
            .map(|f| (f.category.clone(), f.url.clone(), f.title.clone()))
            .collect()
    };
    assert_eq!(triples(&list), triples(&reloaded));
    assert_eq!(reloaded.title, list.title);

    // Saving the same model twice produces identical bytes.
    assert_eq!(saved, reloaded.to_opml_string().unwrap());
}

#[test]
fn document_without_body_is_rejected() {
    let err = FeedList::from_opml_str(r#"<opml version="1.0"><head/></opml>"#).unwrap_err();
    assert!(matches!(err, DigestError::BadOpml(_)), "got {:?}", err);
}

#[test]
fn outline_without_type_is_treated_as_category() {
    let doc = r#"<opml version="1.0"><body>
        <outline text="Stuff">
          <outline type="rss" text="A" xmlUrl="https://a.example/feed"/>
        </outline>
    </body></opml>"#;
    let list = FeedList::from_opml_str(doc).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(
        list.get_feed("https://a.example/feed").unwrap().category.as_deref(),
        Some("Stuff")
    );
}

#[test]
fn add_feed_rejects_duplicates_and_defaults_title() {
    let mut list = FeedList::new();
    list.add_feed("https://a.example/feed", None, None).unwrap();
    list.add_feed(
        "https://b.example/feed",
        Some("B".to_string()),
        Some("News".to_string()),
    )
    .unwrap();

    // Title defaults to the URL when unset.
    assert_eq!(
        list.get_feed("https://a.example/feed").unwrap().title,
        "https://a.example/feed"
    );

    let err = list
        .add_feed("https://a.example/feed", Some("again".to_string()), None)
        .unwrap_err();
    assert!(matches!(err, DigestError::DuplicateFeed(_)), "got {:?}", err);
    assert_eq!(list.len(), 2, "a duplicate add must not change the list");
}

#[test]
fn delete_feed_drops_emptied_category() {
    let mut list = FeedList::new();
    list.add_feed("https://a.example/feed", None, Some("News".to_string()))
        .unwrap();
    list.add_feed("https://b.example/feed", None, None).unwrap();

    list.delete_feed("https://a.example/feed").unwrap();
    assert!(
        list.categories().iter().all(|c| c.name.is_none()),
        "emptied named category must be removed"
    );

    let err = list.delete_feed("https://a.example/feed").unwrap_err();
    assert!(matches!(err, DigestError::FeedNotFound(_)), "got {:?}", err);
}

#[test]
fn duplicate_urls_in_source_document_are_dropped() {
    let doc = r#"<opml version="1.0"><body>
        <outline type="rss" text="A" xmlUrl="https://a.example/feed"/>
        <outline type="category" text="News">
          <outline type="rss" text="A again" xmlUrl="https://a.example/feed"/>
        </outline>
    </body></opml>"#;
    let list = FeedList::from_opml_str(doc).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list.get_feed("https://a.example/feed").unwrap().title, "A");
}
