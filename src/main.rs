use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rss_digest::profile::{Paths, RssDigest};
use rss_digest::store::JsonStore;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rss-digest", about = "Profile-based RSS/Atom digest compiler")]
struct Cli {
    /// Configuration directory (falls back to $RSS_DIGEST_CONFIG_DIR,
    /// then ./rss-digest/config)
    #[arg(global = true, long)]
    config_dir: Option<PathBuf>,

    /// State directory (falls back to $RSS_DIGEST_DATA_DIR, then
    /// ./rss-digest/data)
    #[arg(global = true, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage profiles
    Profile(ProfileCmd),
    /// Manage a profile's feed subscriptions
    Feed(FeedCmd),
    /// Compile and deliver a digest for a profile
    Run {
        profile: String,
        /// Do not mark entries read; the next run sees them again
        #[arg(long, default_value_t = false)]
        forget: bool,
    },
}

#[derive(Args)]
struct ProfileCmd {
    #[command(subcommand)]
    cmd: ProfileSub,
}

#[derive(Subcommand)]
enum ProfileSub {
    /// Create a new profile
    Add { name: String },
    /// Permanently delete a profile and its state
    Delete { name: String },
    /// List profiles
    Ls,
}

#[derive(Args)]
struct FeedCmd {
    #[command(subcommand)]
    cmd: FeedSub,
}

#[derive(Subcommand)]
enum FeedSub {
    /// Add a feed subscription
    Add {
        profile: String,
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Remove a feed subscription
    Delete { profile: String, url: String },
    /// List a profile's feeds by category
    Ls { profile: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = cli
        .config_dir
        .or_else(|| env::var_os("RSS_DIGEST_CONFIG_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("rss-digest/config"));
    let data_dir = cli
        .data_dir
        .or_else(|| env::var_os("RSS_DIGEST_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("rss-digest/data"));

    let app = RssDigest::new(Paths::new(config_dir, data_dir));

    match cli.command {
        Commands::Profile(args) => match args.cmd {
            ProfileSub::Add { name } => {
                app.add_profile(&name)?;
                println!("Profile {:?} added. Now add some feeds.", name);
            }
            ProfileSub::Delete { name } => {
                app.delete_profile(&name)?;
                println!("Profile {:?} deleted.", name);
            }
            ProfileSub::Ls => {
                for name in app.profiles()? {
                    println!("{}", name);
                }
            }
        },
        Commands::Feed(args) => match args.cmd {
            FeedSub::Add {
                profile,
                url,
                title,
                category,
            } => {
                let store = JsonStore::open(app.paths().state_file(&profile))?;
                app.add_feed(&store, &profile, &url, title, category).await?;
                println!("Feed added: {}", url);
            }
            FeedSub::Delete { profile, url } => {
                let store = JsonStore::open(app.paths().state_file(&profile))?;
                app.delete_feed(&store, &profile, &url).await?;
                println!("Feed removed: {}", url);
            }
            FeedSub::Ls { profile } => {
                let feedlist = app.load_feedlist(&profile)?;
                for category in feedlist.categories() {
                    println!("{}:", category.name.as_deref().unwrap_or("(uncategorized)"));
                    for feed in &category.feeds {
                        println!("  {} ({})", feed.title, feed.url);
                    }
                }
            }
        },
        Commands::Run { profile, forget } => {
            let store = JsonStore::open(app.paths().state_file(&profile))?;
            let context = app.run_and_deliver(&store, &profile, forget).await?;
            info!(
                "Digest run finished: {} updated feeds, {} errors",
                context.updated_feeds(),
                context.errors.len()
            );
        }
    }

    Ok(())
}
