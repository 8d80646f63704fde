//! Page and post records.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use chrono::{DateTime, FixedOffset, Local};
use regex::Regex;
use serde::Serialize;

use crate::{
    config::Config,
    error::{CoreError, Result},
    frontmatter::{FrontMatter, parse_front_matter, parse_timestamp},
    permalink,
};

/// `YYYY-MM-DD-<slug>.<ext>`
static POST_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{4})-([0-9]{2})-([0-9]{2})-(.+)\.([^.]+)$").expect("valid regex")
});

/// A date prefix repeated inside the slug part of a post filename.
static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}-").expect("valid regex"));

/// A standalone document.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    /// Source file path.
    pub path: PathBuf,

    /// Raw markup body, without the header block.
    #[serde(skip)]
    pub body: String,

    /// Parsed header.
    pub front_matter: FrontMatter,

    pub title: String,
    pub layout: String,

    /// Site-relative URL, e.g. `/about.html`.
    pub url: String,

    pub date: DateTime<FixedOffset>,
    pub description: String,
    pub excerpt: String,

    /// Final HTML, filled in once during rendering.
    #[serde(skip)]
    pub rendered: String,
}

impl Page {
    /// Build a page from its source text.
    ///
    /// `relative` is the path below the source root; `modified` is the file
    /// mtime, used when the header has no date.
    pub fn from_source(
        path: impl Into<PathBuf>,
        relative: &Path,
        raw: &str,
        modified: Option<DateTime<FixedOffset>>,
        config: &Config,
    ) -> Self {
        let path = path.into();
        let doc = parse_front_matter(raw, &path);
        let header = doc.header;

        let title = header
            .non_empty_str("title")
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&path));
        let layout = header
            .non_empty_str("layout")
            .unwrap_or("default")
            .to_string();
        let date = header
            .timestamp("date")
            .or(modified)
            .unwrap_or_else(|| Local::now().fixed_offset());
        let separator = header
            .str("excerpt_separator")
            .unwrap_or(&config.excerpt_separator);
        let excerpt = excerpt_of(&doc.body, separator);

        Self {
            url: permalink::page_path(relative),
            description: header.str("description").unwrap_or_default().to_string(),
            path,
            body: doc.body,
            front_matter: header,
            title,
            layout,
            date,
            excerpt,
            rendered: String::new(),
        }
    }
}

/// A dated blog post.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    /// Source file path.
    pub path: PathBuf,

    /// Raw markup body, without the header block.
    #[serde(skip)]
    pub body: String,

    /// Parsed header.
    pub front_matter: FrontMatter,

    pub title: String,
    pub layout: String,
    pub slug: String,
    pub date: DateTime<FixedOffset>,

    /// Absolute URL.
    pub url: String,

    /// Site-relative URL; also the emitted file path below the destination.
    pub relative_url: String,

    /// Header `permalink` override, if any.
    pub permalink: Option<String>,

    pub description: String,
    pub excerpt: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,

    /// Final HTML, filled in once during rendering.
    #[serde(skip)]
    pub rendered: String,
}

impl Post {
    /// Build a post from its source text.
    ///
    /// The header date wins over the filename date. Fails when neither
    /// yields a date or no slug can be derived.
    pub fn from_source(path: impl Into<PathBuf>, raw: &str, config: &Config) -> Result<Self> {
        let path = path.into();
        let doc = parse_front_matter(raw, &path);
        let header = doc.header;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (filename_date, slug) = match POST_FILENAME.captures(&file_name) {
            Some(caps) => {
                let date = parse_timestamp(&format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]));
                let slug = DATE_PREFIX.replace(&caps[4], "").into_owned();
                (date, slug)
            }
            None => (None, file_stem(&path)),
        };

        if slug.is_empty() {
            return Err(CoreError::load(&path, "cannot derive a slug from the file name"));
        }

        let header_date = header.timestamp("date");
        if let (None, Some(text)) = (header_date, header.non_empty_str("date")) {
            tracing::warn!(path = %path.display(), date = text, "unrecognized date in header");
        }
        let Some(date) = header_date.or(filename_date) else {
            return Err(CoreError::load(&path, "post has no date"));
        };

        let title = header
            .non_empty_str("title")
            .map(str::to_string)
            .unwrap_or_else(|| slug.replace('-', " "));
        let layout = match header.non_empty_str("layout") {
            Some(layout) if layout != "default" => layout.to_string(),
            _ => "post".to_string(),
        };
        let permalink_override = header.non_empty_str("permalink").map(str::to_string);

        let relative_url = match &permalink_override {
            Some(custom) => permalink::url_path(&permalink::override_path(custom)),
            None => permalink::post_path(&config.permalink, Some(&date), &slug),
        };
        let url = match &permalink_override {
            Some(custom) => config.absolute_url(&permalink::override_path(custom)),
            None => config.absolute_url(&relative_url),
        };

        let separator = header
            .str("excerpt_separator")
            .unwrap_or(&config.excerpt_separator);
        let excerpt = excerpt_of(&doc.body, separator);

        Ok(Self {
            description: header.str("description").unwrap_or_default().to_string(),
            categories: header.list("categories"),
            tags: header.list("tags"),
            path,
            body: doc.body,
            front_matter: header,
            title,
            layout,
            slug,
            date,
            url,
            relative_url,
            permalink: permalink_override,
            excerpt,
            rendered: String::new(),
        })
    }

    /// Mirror path under `/archives/`.
    pub fn archive_url(&self) -> String {
        permalink::archive_path(&self.date, &self.relative_url)
    }

    /// Body with a leading level-1 heading removed, since layouts print
    /// the title themselves.
    pub fn body_without_title(&self) -> Cow<'_, str> {
        let mut offset = 0;
        for line in self.body.split_inclusive('\n') {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                offset += line.len();
                continue;
            }
            if trimmed.starts_with("# ") || trimmed.starts_with("#\t") {
                let mut rest = String::with_capacity(self.body.len());
                rest.push_str(&self.body[..offset]);
                rest.push_str(&self.body[offset + line.len()..]);
                return Cow::Owned(rest);
            }
            break;
        }
        Cow::Borrowed(&self.body)
    }
}

/// Text before the first `separator`, trimmed.
pub fn excerpt_of(body: &str, separator: &str) -> String {
    if separator.is_empty() {
        return String::new();
    }
    body.trim_start()
        .split(separator)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
