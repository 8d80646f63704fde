//! Permalink policy and URL derivation.

use std::path::{Component, Path};

use chrono::{DateTime, Datelike, FixedOffset};

use crate::config::Permalink;

const INDEX_FILE: &str = "index.html";

/// Site-relative path for a post.
///
/// Without a date the path degrades to `/slug.html`, or `/slug/index.html`
/// for the indexed policies.
pub fn post_path(policy: &Permalink, date: Option<&DateTime<FixedOffset>>, slug: &str) -> String {
    let Some(date) = date else {
        return match policy {
            Permalink::Date | Permalink::Custom(_) => format!("/{slug}.html"),
            Permalink::Pretty | Permalink::None => format!("/{slug}/{INDEX_FILE}"),
        };
    };

    let (year, month, day) = date_parts(date);
    match policy {
        Permalink::Date => format!("/{year}/{month}/{day}/{slug}.html"),
        Permalink::Pretty | Permalink::None => {
            format!("/{year}/{month}/{day}/{slug}/{INDEX_FILE}")
        }
        Permalink::Custom(pattern) => {
            let expanded = pattern
                .replace(":year", &year)
                .replace(":month", &month)
                .replace(":day", &day)
                .replace(":title", slug)
                .replace(":slug", slug);
            with_html_suffix(&expanded)
        }
    }
}

/// Normalize a header `permalink` override.
///
/// Absolute URLs are kept as they are; anything else gets a leading `/`.
/// A trailing `.html` is appended when absent.
pub fn override_path(permalink: &str) -> String {
    with_html_suffix(permalink.trim())
}

fn with_html_suffix(path: &str) -> String {
    let mut path = if path.starts_with('/') || is_absolute(path) {
        path.to_string()
    } else {
        format!("/{path}")
    };
    if path.ends_with('/') {
        path.push_str(INDEX_FILE);
    } else if !path.ends_with(".html") {
        path.push_str(".html");
    }
    path
}

/// Whether `url` carries an `http://` or `https://` scheme.
pub fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Path component of a URL. Relative inputs are returned unchanged.
pub fn url_path(url: &str) -> String {
    let Some((_, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let path = match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "/",
    };
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.to_string()
}

/// Site-relative URL of a page: source-relative path with the markup
/// extension swapped for `.html` and separators normalized to `/`.
pub fn page_path(relative: &Path) -> String {
    let stem = relative.with_extension("");
    let segments: Vec<String> = stem
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}.html", segments.join("/"))
}

/// Mirror location of a post under `/archives/Y/M/D/`, keyed by the last
/// segment of its canonical URL.
///
/// Pretty URLs all end in `index.html`, so same-day pretty posts share one
/// mirror path and the last one emitted owns it.
pub fn archive_path(date: &DateTime<FixedOffset>, relative_url: &str) -> String {
    let (year, month, day) = date_parts(date);
    let basename = relative_url
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(INDEX_FILE);
    format!("/archives/{year}/{month}/{day}/{basename}")
}

fn date_parts(date: &DateTime<FixedOffset>) -> (String, String, String) {
    (
        format!("{:04}", date.year()),
        format!("{:02}", date.month()),
        format!("{:02}", date.day()),
    )
}
