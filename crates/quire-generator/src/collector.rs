//! Source collection.
//!
//! Walks the source tree and loads data files, pages and posts. A file that
//! cannot be read or parsed is logged and skipped; it never fails the build.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use quire_core::{Config, Page, Post};
use quire_parser::validate;
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Data file extensions.
const DATA_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Loads site sources for one build.
#[derive(Debug)]
pub struct ContentCollector<'a> {
    config: &'a Config,
}

impl<'a> ContentCollector<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Config `data` merged with `_data/*.{yml,yaml}`, keyed by file stem.
    pub fn load_data(&self) -> BTreeMap<String, Value> {
        let mut data = self.config.data.clone();
        let dir = self.config.data_path();
        if !dir.is_dir() {
            return data;
        }

        for path in walk_files(&dir) {
            let is_data = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| DATA_EXTENSIONS.contains(&ext));
            if !is_data {
                continue;
            }
            let Some(key) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };

            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_yaml::from_str::<Value>(&text).map_err(|e| e.to_string()));
            match parsed {
                Ok(value) => {
                    debug!(key = %key, path = %path.display(), "loaded data file");
                    data.insert(key, value);
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping data file");
                }
            }
        }
        data
    }

    /// Markup files anywhere in the source tree outside `_`/`.` prefixed
    /// top-level entries, the destination and its staging tree.
    pub fn load_pages(&self) -> Vec<Page> {
        let source = &self.config.source;
        let outputs: Vec<PathBuf> = [&self.config.destination, &self.config.staging_path()]
            .into_iter()
            .filter_map(|dir| fs::canonicalize(dir).ok())
            .collect();

        let walker = WalkDir::new(source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry, &outputs));

        let mut pages = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !self.config.is_markup_file(path) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(source) else {
                continue;
            };

            let raw = match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping page");
                    continue;
                }
            };
            let modified = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .map(|at| DateTime::<Local>::from(at).fixed_offset());

            let page = Page::from_source(path, relative, &raw, modified, self.config);
            report_findings(path, &page.body);
            debug!(url = %page.url, "loaded page");
            pages.push(page);
        }

        info!(count = pages.len(), "loaded pages");
        pages
    }

    /// Markup files below the posts directory.
    pub fn load_posts(&self) -> Vec<Post> {
        let dir = self.config.posts_path();
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut posts = Vec::new();
        for path in walk_files(&dir) {
            if !self.config.is_markup_file(&path) {
                continue;
            }
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping post");
                    continue;
                }
            };
            match Post::from_source(&path, &raw, self.config) {
                Ok(post) => {
                    report_findings(&path, &post.body);
                    debug!(url = %post.relative_url, "loaded post");
                    posts.push(post);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping post"),
            }
        }

        info!(count = posts.len(), "loaded posts");
        posts
    }

    fn is_excluded(&self, entry: &DirEntry, outputs: &[PathBuf]) -> bool {
        if entry.depth() == 1 {
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('_') || name.starts_with('.') {
                return true;
            }
        }
        entry.file_type().is_dir()
            && !outputs.is_empty()
            && fs::canonicalize(entry.path()).is_ok_and(|path| outputs.contains(&path))
    }
}

/// Regular files below `dir`, in name order. Unreadable entries are logged.
fn walk_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
        .collect()
}

fn report_findings(path: &Path, body: &str) {
    for finding in validate(body) {
        warn!(path = %path.display(), finding = %finding, "markdown format problem");
    }
}
