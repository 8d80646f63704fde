//! Quire Core Library
//!
//! Configuration, front matter, permalinks and the page/post model for the
//! Quire static site generator.

pub mod config;
pub mod content;
pub mod error;
pub mod frontmatter;
pub mod permalink;

pub use config::{Config, ConfigOverrides, Permalink};
pub use content::{Page, Post};
pub use error::{CoreError, Result};
pub use frontmatter::{FrontMatter, HeaderValue, ParsedDocument, parse_front_matter};
