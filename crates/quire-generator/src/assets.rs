//! Static asset trees.
//!
//! `stylesheets` must exist in the source; `images`, `js`, `fonts` and
//! `assets` are copied when present.

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

/// The asset tree every site must have.
pub const REQUIRED_DIR: &str = "stylesheets";

/// Asset trees copied when they exist.
pub const OPTIONAL_DIRS: [&str; 4] = ["images", "js", "fonts", "assets"];

/// Asset copy errors.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("required asset directory not found: {0}")]
    MissingRequired(PathBuf),

    #[error("failed to copy {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AssetError>;

/// Every mounted asset prefix, required one first.
pub fn asset_dirs() -> impl Iterator<Item = &'static str> {
    std::iter::once(REQUIRED_DIR).chain(OPTIONAL_DIRS)
}

/// Copies asset trees from the source root to the destination root.
#[derive(Debug)]
pub struct AssetCopier<'a> {
    source: &'a Path,
    destination: &'a Path,
}

impl<'a> AssetCopier<'a> {
    #[must_use]
    pub fn new(source: &'a Path, destination: &'a Path) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Fail when the required asset tree is missing from the source.
    pub fn check(&self) -> Result<()> {
        let required = self.source.join(REQUIRED_DIR);
        if !required.is_dir() {
            return Err(AssetError::MissingRequired(required));
        }
        Ok(())
    }

    /// Mirror every asset tree. Returns the number of files copied.
    pub fn copy_all(&self) -> Result<usize> {
        self.check()?;

        let mut copied = 0;
        for name in asset_dirs() {
            let from = self.source.join(name);
            if !from.is_dir() {
                debug!(dir = name, "asset directory absent, skipping");
                continue;
            }
            copied += copy_tree(&from, &self.destination.join(name))?;
        }

        info!(count = copied, "copied assets");
        Ok(copied)
    }
}

/// Recursively copy `from` into `to`, skipping hidden entries.
fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    let copy_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| AssetError::Copy { path, source }
    };

    fs::create_dir_all(to).map_err(copy_err(to))?;

    let mut copied = 0;
    for entry in fs::read_dir(from).map_err(copy_err(from))? {
        let entry = entry.map_err(copy_err(from))?;
        let path = entry.path();
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let target = to.join(entry.file_name());
        if path.is_dir() {
            copied += copy_tree(&path, &target)?;
        } else if path.is_file() {
            fs::copy(&path, &target).map_err(copy_err(&path))?;
            debug!(src = %path.display(), dest = %target.display(), "copied asset");
            copied += 1;
        }
    }
    Ok(copied)
}
