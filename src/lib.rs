pub mod context;
pub mod deliver;
pub mod digest;
pub mod feedlist;
pub mod profile;
pub mod render;
pub mod settings;
pub mod store;
pub mod types;

pub use context::{CategoryDigest, Context, FeedDigest};
pub use deliver::Delivery;
pub use digest::DigestBuilder;
pub use feedlist::{Feed, FeedCategory, FeedList};
pub use profile::{Paths, RssDigest};
pub use render::{renderer_for, PlainRenderer, Render};
pub use settings::{ConfigResolver, Settings, SettingsOverlay};
pub use store::{FeedStore, JsonStore, MemoryStore, QueryResult};
pub use types::*;
