//! Quire Parser Library
//!
//! Markdown conversion and format validation.

pub mod markdown;
pub mod validate;

pub use markdown::{MarkdownConverter, html_escape, slugify};
pub use validate::{Finding, FindingKind, validate};
