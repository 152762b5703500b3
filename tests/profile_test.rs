use chrono::{DateTime, Utc};
use rss_digest::profile::{Paths, RssDigest};
use rss_digest::store::JsonStore;
use rss_digest::types::{DigestError, Entry};
use tempfile::TempDir;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Fixture {
    _config: TempDir,
    _data: TempDir,
    app: RssDigest,
}

fn fixture() -> Fixture {
    init_logging();
    let config = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let app = RssDigest::new(Paths::new(config.path(), data.path()));
    Fixture {
        _config: config,
        _data: data,
        app,
    }
}

fn entry(id: &str, updated: &str) -> Entry {
    Entry {
        id: id.to_string(),
        title: Some(format!("Entry {}", id)),
        link: Some(format!("https://example.com/{}", id)),
        author: None,
        published_at: None,
        updated_at: Some(updated.parse::<DateTime<Utc>>().unwrap()),
        summary: None,
        content: Vec::new(),
    }
}

#[test]
fn profile_lifecycle() {
    let fx = fixture();

    assert!(fx.app.profiles().unwrap().is_empty());
    fx.app.add_profile("alice").unwrap();
    fx.app.add_profile("bob").unwrap();
    assert!(fx.app.profile_exists("alice"));
    assert_eq!(fx.app.profiles().unwrap(), vec!["alice", "bob"]);

    assert!(matches!(
        fx.app.add_profile("alice"),
        Err(DigestError::ProfileExists(_))
    ));

    fx.app.delete_profile("alice").unwrap();
    assert!(!fx.app.profile_exists("alice"));
    assert_eq!(fx.app.profiles().unwrap(), vec!["bob"]);

    assert!(matches!(
        fx.app.delete_profile("alice"),
        Err(DigestError::ProfileNotFound(_))
    ));
}

#[test]
fn profile_names_that_escape_the_tree_are_rejected() {
    let fx = fixture();
    for name in ["../evil", "a/b", "", ".", ".."] {
        assert!(
            matches!(fx.app.add_profile(name), Err(DigestError::InvalidProfileName(_))),
            "accepted {:?}",
            name
        );
    }
}

#[tokio::test]
async fn feed_management_persists_to_opml() {
    let fx = fixture();
    fx.app.add_profile("alice").unwrap();
    let store = JsonStore::open(fx.app.paths().state_file("alice")).unwrap();

    fx.app
        .add_feed(
            &store,
            "alice",
            "https://example.com/a.xml",
            Some("Feed A".to_string()),
            Some("News".to_string()),
        )
        .await
        .unwrap();
    assert!(fx.app.paths().opml_file("alice").exists());

    let err = fx
        .app
        .add_feed(&store, "alice", "https://example.com/a.xml", None, None)
        .await;
    assert!(matches!(err, Err(DigestError::DuplicateFeed(_))));

    let err = fx.app.add_feed(&store, "alice", "not a url", None, None).await;
    assert!(matches!(err, Err(DigestError::InvalidUrl(_))));

    let list = fx.app.load_feedlist("alice").unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(
        list.get_feed("https://example.com/a.xml").unwrap().category,
        Some("News".to_string())
    );

    fx.app
        .delete_feed(&store, "alice", "https://example.com/a.xml")
        .await
        .unwrap();
    assert!(fx.app.load_feedlist("alice").unwrap().is_empty());
}

#[tokio::test]
async fn run_requires_an_existing_profile() {
    let fx = fixture();
    let store = JsonStore::open(fx.app.paths().state_file("ghost")).unwrap();
    let err = fx.app.run(&store, "ghost", false).await;
    assert!(matches!(err, Err(DigestError::ProfileNotFound(_))));
}

#[tokio::test]
async fn bad_profile_config_aborts_before_feed_work() {
    let fx = fixture();
    fx.app.add_profile("alice").unwrap();
    let config_file = fx.app.paths().profile_config_dir("alice").join("rss-digest.toml");
    std::fs::write(&config_file, "max_displayed_entries = \"lots\"\n").unwrap();

    let store = JsonStore::open(fx.app.paths().state_file("alice")).unwrap();
    let err = fx.app.run(&store, "alice", false).await;
    assert!(matches!(err, Err(DigestError::Config(_))));
}

#[tokio::test]
async fn end_to_end_run_with_persistent_state() {
    let fx = fixture();
    fx.app.add_profile("alice").unwrap();
    let state_file = fx.app.paths().state_file("alice");

    let store = JsonStore::open(&state_file).unwrap();
    fx.app
        .add_feed(&store, "alice", "https://example.com/a.xml", None, None)
        .await
        .unwrap();
    store
        .ingest(
            "https://example.com/a.xml",
            vec![
                entry("one", "2026-08-01T09:00:00Z"),
                entry("two", "2026-08-02T09:00:00Z"),
            ],
        )
        .await
        .unwrap();

    let context = fx.app.run(&store, "alice", false).await.unwrap();
    assert_eq!(context.updated_feeds(), 1);
    assert_eq!(context.updated_entries(), 2);
    assert_eq!(context.last_run_utc, None);
    assert!(fx.app.last_run("alice").is_some());

    // Read state survives reopening the store from disk.
    let reopened = JsonStore::open(&state_file).unwrap();
    let again = fx.app.run(&reopened, "alice", false).await.unwrap();
    assert!(again.is_empty());
    assert!(again.last_run_utc.is_some());
}

#[tokio::test]
async fn forget_run_leaves_state_and_last_run_untouched() {
    let fx = fixture();
    fx.app.add_profile("alice").unwrap();
    let store = JsonStore::open(fx.app.paths().state_file("alice")).unwrap();
    fx.app
        .add_feed(&store, "alice", "https://example.com/a.xml", None, None)
        .await
        .unwrap();
    store
        .ingest("https://example.com/a.xml", vec![entry("one", "2026-08-01T09:00:00Z")])
        .await
        .unwrap();

    let first = fx.app.run(&store, "alice", true).await.unwrap();
    assert_eq!(first.updated_entries(), 1);
    assert!(fx.app.last_run("alice").is_none());

    let second = fx.app.run(&store, "alice", true).await.unwrap();
    assert_eq!(second.updated_entries(), 1);
}

#[tokio::test]
async fn run_and_deliver_writes_the_digest_file() {
    let fx = fixture();
    fx.app.add_profile("alice").unwrap();

    let out_path = fx.app.paths().profile_data_dir("alice").join("digest.txt");
    let config_file = fx.app.paths().profile_config_dir("alice").join("rss-digest.toml");
    std::fs::write(
        &config_file,
        format!(
            "name = \"Alice\"\n\n[delivery]\nmethod = \"file\"\npath = \"{}\"\n",
            out_path.display()
        ),
    )
    .unwrap();

    let store = JsonStore::open(fx.app.paths().state_file("alice")).unwrap();
    fx.app
        .add_feed(
            &store,
            "alice",
            "https://example.com/a.xml",
            Some("Feed A".to_string()),
            None,
        )
        .await
        .unwrap();
    store
        .ingest("https://example.com/a.xml", vec![entry("one", "2026-08-01T09:00:00Z")])
        .await
        .unwrap();

    fx.app.run_and_deliver(&store, "alice", false).await.unwrap();

    let body = std::fs::read_to_string(&out_path).unwrap();
    assert!(body.contains("Feed A"), "digest body was: {}", body);
    assert!(body.contains("Entry one"));
}
