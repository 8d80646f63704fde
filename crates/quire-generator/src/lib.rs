//! Quire Generator Library
//!
//! Static site generation engine for Quire.
//!
//! # Modules
//!
//! - [`collector`] - Data, page and post loading
//! - [`layout`] - Layout and include registry
//! - [`template`] - Tera template set with site helpers
//! - [`collections`] - Post ordering, pagination, archives and tag cloud
//! - [`trie`] - Path-segment URL trie
//! - [`site`] - The built site model
//! - [`rss`] - RSS feed generation
//! - [`sitemap`] - XML sitemap generation
//! - [`assets`] - Static asset copying
//! - [`build`] - Build orchestration

pub mod assets;
pub mod build;
pub mod collections;
pub mod collector;
pub mod layout;
pub mod rss;
pub mod site;
pub mod sitemap;
pub mod template;
pub mod trie;

pub use assets::{AssetCopier, AssetError};
pub use build::{BuildError, BuildStats, Builder};
pub use collector::ContentCollector;
pub use layout::{Layout, LayoutError, LayoutKind, LayoutRegistry};
pub use rss::RssGenerator;
pub use site::Site;
pub use sitemap::SitemapGenerator;
pub use template::{TemplateEngine, TemplateError};
pub use trie::UrlTrie;
