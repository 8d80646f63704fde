//! Doctor command - check the project layout and content

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use color_eyre::eyre::{Result, WrapErr};
use quire_core::{Config, parse_front_matter};
use quire_generator::assets::REQUIRED_DIR;
use quire_parser::validate;
use walkdir::WalkDir;

const EXPECTED_LAYOUTS: [&str; 6] = ["default", "post", "index", "archive", "tag", "category"];
const STYLESHEETS: [&str; 2] = ["site.css", "site.scss"];
const CONFIG_KEYS: [&str; 4] = ["title", "description", "author", "url"];

/// Doctor findings, one printable line each.
#[derive(Debug, Default)]
pub struct Report {
    pub lines: Vec<String>,
    /// Whether anything was created.
    pub fixed: bool,
}

impl Report {
    fn section(&mut self, title: &str) {
        if !self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.lines.push(format!("=== {title} ==="));
    }

    fn ok(&mut self, msg: impl AsRef<str>) {
        self.lines.push(format!("✓ {}", msg.as_ref()));
    }

    fn missing(&mut self, msg: impl AsRef<str>) {
        self.lines.push(format!("✗ {}", msg.as_ref()));
    }

    fn warn(&mut self, msg: impl AsRef<str>) {
        self.lines.push(format!("  ⚠ {}", msg.as_ref()));
    }

    fn detail(&mut self, msg: impl AsRef<str>) {
        self.lines.push(format!("  ✓ {}", msg.as_ref()));
    }

    fn warnings(&self) -> usize {
        self.lines.iter().filter(|line| line.contains('⚠')).count()
    }
}

/// Run the doctor command.
pub fn run(config: &Config) -> Result<()> {
    tracing::info!(source = %config.source.display(), "Checking project");

    let report = check(config)?;
    for line in &report.lines {
        println!("{line}");
    }
    println!();
    if report.fixed {
        println!("  Missing directories were created.");
    }
    println!("  {} warning(s)", report.warnings());
    Ok(())
}

/// Inspect the project, creating missing framework directories.
pub fn check(config: &Config) -> Result<Report> {
    let mut report = Report::default();

    report.section("Directories");
    check_directories(config, &mut report)?;

    report.section("Layouts");
    check_layouts(&config.layouts_path(), &mut report);

    report.section("Content");
    check_content(config, &mut report);

    report.section("Stylesheets");
    check_stylesheets(&config.source.join(REQUIRED_DIR), &mut report);

    report.section("Configuration");
    check_config_file(config, &mut report);

    Ok(report)
}

fn check_directories(config: &Config, report: &mut Report) -> Result<()> {
    let dirs = [
        config.layouts_path(),
        config.posts_path(),
        config.data_path(),
        config.includes_path(),
        config.source.join(REQUIRED_DIR),
    ];
    for dir in dirs {
        if dir.is_dir() {
            report.ok(format!("Directory exists: {}", dir.display()));
        } else {
            fs::create_dir_all(&dir)
                .wrap_err_with(|| format!("Failed to create {}", dir.display()))?;
            report.ok(format!("Created directory: {}", dir.display()));
            report.fixed = true;
        }
    }
    Ok(())
}

fn check_layouts(layouts: &Path, report: &mut Report) {
    let mut found = 0;
    for name in EXPECTED_LAYOUTS {
        let path = layouts.join(format!("{name}.html"));
        match fs::read_to_string(&path) {
            Ok(content) => {
                report.ok(format!("Layout: {name}.html"));
                found += 1;
                check_layout_structure(&content, report);
            }
            Err(_) => report.missing(format!("Missing layout: {name}.html")),
        }
    }
    if found == 0 {
        report.warn("No layouts found");
    }
}

fn check_layout_structure(content: &str, report: &mut Report) {
    let markers = [
        ("<!DOCTYPE html>", "missing DOCTYPE declaration"),
        ("<html", "missing <html> tag"),
        ("<head>", "missing <head> tag"),
        ("<body>", "missing <body> tag"),
        ("{{", "no template expressions"),
    ];
    for (needle, problem) in markers {
        if !content.contains(needle) {
            report.warn(problem);
        }
    }
    if !content.contains("{{ content") {
        report.warn("no {{ content }} placeholder");
    }
}

fn check_content(config: &Config, report: &mut Report) {
    for path in page_files(config) {
        check_markup_file(&path, false, report);
    }

    let posts = config.posts_path();
    if !posts.is_dir() {
        report.warn(format!("Posts directory missing: {}", posts.display()));
        return;
    }
    let mut files: Vec<PathBuf> = WalkDir::new(&posts)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && config.is_markup_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    for path in files {
        check_markup_file(&path, true, report);
    }
}

/// Markup files outside `_`-prefixed and hidden directories.
fn page_files(config: &Config) -> Vec<PathBuf> {
    let destination = &config.destination;
    let mut files: Vec<PathBuf> = WalkDir::new(&config.source)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            let skipped = entry.file_type().is_dir() && (name.starts_with('_') || name.starts_with('.'));
            !skipped && entry.path() != destination.as_path()
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && config.is_markup_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn check_markup_file(path: &Path, is_post: bool, report: &mut Report) {
    let kind = if is_post { "Post" } else { "Page" };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            report.missing(format!("{kind} {name}: {e}"));
            return;
        }
    };
    report.ok(format!("{kind}: {name}"));

    let doc = parse_front_matter(&raw, path);
    if let Some(warning) = &doc.warning {
        report.warn(format!("front matter: {warning}"));
    }

    match doc.header.non_empty_str("title") {
        Some(title) => report.detail(format!("title: {title}")),
        None => report.warn("missing title"),
    }
    match doc.header.non_empty_str("layout") {
        Some(layout) => report.detail(format!("layout: {layout}")),
        None => report.warn("missing layout"),
    }

    if is_post {
        match doc.header.get("date").and_then(|value| value.as_str()) {
            Some(date) if !date.is_empty() => report.detail(format!("date: {date}")),
            _ => report.warn("missing date"),
        }
        if !has_dated_name(&name) {
            report.warn("file name should look like YYYY-MM-DD-title.md");
        }
    }

    for finding in validate(&raw) {
        report.warn(finding.to_string());
    }
}

fn has_dated_name(name: &str) -> bool {
    name.len() > 11
        && name.is_char_boundary(10)
        && NaiveDate::parse_from_str(&name[..10], "%Y-%m-%d").is_ok()
        && name[10..].starts_with('-')
}

fn check_stylesheets(dir: &Path, report: &mut Report) {
    if !dir.is_dir() {
        report.missing(format!("Stylesheet directory missing: {}", dir.display()));
        return;
    }
    let mut found = 0;
    for name in STYLESHEETS {
        if dir.join(name).is_file() {
            report.ok(format!("Stylesheet: {name}"));
            found += 1;
        } else {
            report.missing(format!("Missing stylesheet: {name}"));
        }
    }
    if found == 0 {
        report.warn("No main stylesheet found");
    }
}

fn check_config_file(config: &Config, report: &mut Report) {
    let Some(path) = Config::discover(&config.source) else {
        report.warn("No config file found, defaults apply");
        return;
    };
    report.ok(format!("Config file: {}", path.display()));

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            report.warn(format!("unreadable: {e}"));
            return;
        }
    };
    for key in CONFIG_KEYS {
        if has_config_key(&content, key) {
            report.detail(format!("key: {key}"));
        } else {
            report.warn(format!("missing key: {key}"));
        }
    }
}

fn has_config_key(content: &str, key: &str) -> bool {
    content.lines().any(|line| {
        line.trim_start()
            .strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with([':', '=']))
    })
}
