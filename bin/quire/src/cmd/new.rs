//! New command - scaffold a post or a page

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use chrono::{DateTime, Local};
use color_eyre::eyre::{Result, WrapErr, bail};
use quire_core::Config;
use quire_parser::slugify;

const HEADER_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Create `<posts_dir>/<today>-<slug>.md` for `title`.
pub fn post(config: &Config, title: &str) -> Result<PathBuf> {
    let now = Local::now();
    let slug = slugify(title);
    if slug.is_empty() {
        bail!("Cannot derive a file name from title {title:?}");
    }

    let path = config
        .posts_path()
        .join(format!("{}-{slug}.md", now.format("%Y-%m-%d")));
    write_new(&path, &post_template(title, &now))?;

    tracing::info!(path = %path.display(), "Created new post");
    println!("Created: {}", path.display());
    Ok(path)
}

/// Create `<source>/<name>/index.md`.
pub fn page(config: &Config, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name.trim_matches('/'));
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        bail!("Invalid page name {name:?}");
    }
    let Some(title) = relative.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        bail!("Invalid page name {name:?}");
    };

    let path = config.source.join(relative).join("index.md");
    write_new(&path, &page_template(&title, &Local::now()))?;

    tracing::info!(path = %path.display(), "Created new page");
    println!("Created: {}", path.display());
    Ok(path)
}

fn write_new(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        bail!("File already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).wrap_err("Failed to create directories")?;
    }
    fs::write(path, content).wrap_err("Failed to write file")
}

fn quoted(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

fn post_template(title: &str, now: &DateTime<Local>) -> String {
    format!(
        r#"---
layout: post
title: {title}
date: {date}
categories: []
tags: []
comments: true
---

这里是正文内容。
"#,
        title = quoted(title),
        date = now.format(HEADER_DATE_FORMAT),
    )
}

fn page_template(title: &str, now: &DateTime<Local>) -> String {
    format!(
        r#"---
layout: page
title: {title}
date: {date}
comments: true
sharing: true
footer: true
---

这里是页面内容。
"#,
        title = quoted(title),
        date = now.format(HEADER_DATE_FORMAT),
    )
}
