//! Layout and include registry.
//!
//! Layouts and includes share one namespace keyed by file stem. Include
//! files may wrap their body in a `{{ define "name" }} ... {{ end }}` pair;
//! the wrapper is stripped before registration.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use quire_core::Config;
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Template file extensions.
const TEMPLATE_EXTENSIONS: [&str; 2] = ["html", "htm"];

static DEFINE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*\{\{-?\s*define\s*"([^"]+)"\s*-?\}\}\s*"#).expect("valid regex")
});

static DEFINE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\{\{-?\s*end\s*-?\}\}\s*").expect("valid regex"));

/// Layout loading errors.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("layouts directory not found: {0}")]
    MissingDir(PathBuf),

    #[error("duplicate template name `{name}`: {first} and {second}")]
    Duplicate {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type Result<T> = std::result::Result<T, LayoutError>;

/// Where a template was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Layout,
    Include,
}

/// A named template.
#[derive(Debug, Clone)]
pub struct Layout {
    pub name: String,
    pub text: String,
    pub kind: LayoutKind,
    pub path: PathBuf,
}

/// Name to template mapping.
#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    layouts: BTreeMap<String, Layout>,
}

impl LayoutRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the layouts directory (required) and the includes directory
    /// (optional) of a site.
    pub fn load(config: &Config) -> Result<Self> {
        let layouts_dir = config.layouts_path();
        if !layouts_dir.is_dir() {
            return Err(LayoutError::MissingDir(layouts_dir));
        }

        let mut registry = Self::new();
        registry.load_dir(&layouts_dir, LayoutKind::Layout)?;

        let includes_dir = config.includes_path();
        if includes_dir.is_dir() {
            registry.load_dir(&includes_dir, LayoutKind::Include)?;
        }

        Ok(registry)
    }

    fn load_dir(&mut self, dir: &Path, kind: LayoutKind) -> Result<()> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|source| LayoutError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file() && is_template(entry.path()) {
                files.push(entry.into_path());
            }
        }

        for path in files {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let text = fs::read_to_string(&path).map_err(|source| LayoutError::Read {
                path: path.clone(),
                source,
            })?;
            let text = match kind {
                LayoutKind::Layout => text,
                LayoutKind::Include => strip_define(&text),
            };
            debug!(name = %name, path = %path.display(), ?kind, "registered template");
            self.define(name, text, kind, path)?;
        }
        Ok(())
    }

    /// Register a template. Fails when the name is already taken.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        text: impl Into<String>,
        kind: LayoutKind,
        path: impl Into<PathBuf>,
    ) -> Result<()> {
        let name = name.into();
        let path = path.into();
        if let Some(existing) = self.layouts.get(&name) {
            return Err(LayoutError::Duplicate {
                name,
                first: existing.path.clone(),
                second: path,
            });
        }
        self.layouts.insert(
            name.clone(),
            Layout {
                name,
                text: text.into(),
                kind,
                path,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Layout> {
        self.layouts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layout> {
        self.layouts.values()
    }
}

fn is_template(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Remove `{{ define "x" }}` and `{{ end }}` wrappers from an include body.
pub fn strip_define(text: &str) -> String {
    let text = DEFINE_START.replace(text, "");
    DEFINE_END.replace_all(&text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(dir.path().join("_layouts")).expect("layouts");
        fs::create_dir_all(dir.path().join("_includes")).expect("includes");
        let config = Config {
            source: dir.path().to_path_buf(),
            ..Config::default()
        };
        (dir, config)
    }

    #[test]
    fn test_load_layouts_and_includes() {
        let (dir, config) = site();
        fs::write(dir.path().join("_layouts/default.html"), "<html>{{ content | safe }}</html>")
            .expect("write");
        fs::write(dir.path().join("_layouts/post.htm"), "post").expect("write");
        fs::write(dir.path().join("_layouts/notes.txt"), "ignored").expect("write");
        fs::write(
            dir.path().join("_includes/header.html"),
            "{{ define \"header\" }}\n<header>{{ site.title }}</header>\n{{ end }}\n",
        )
        .expect("write");

        let registry = LayoutRegistry::load(&config).expect("load");

        assert_eq!(registry.len(), 3);
        assert!(registry.contains("default"));
        assert!(registry.contains("post"));
        assert!(!registry.contains("notes"));

        let header = registry.get("header").expect("header");
        assert_eq!(header.kind, LayoutKind::Include);
        assert_eq!(header.text, "<header>{{ site.title }}</header>");
    }

    #[test]
    fn test_missing_layouts_dir() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = Config {
            source: dir.path().to_path_buf(),
            ..Config::default()
        };
        assert!(matches!(
            LayoutRegistry::load(&config),
            Err(LayoutError::MissingDir(_))
        ));
    }

    #[test]
    fn test_missing_includes_dir_is_fine() {
        let (dir, config) = site();
        fs::remove_dir_all(dir.path().join("_includes")).expect("remove");
        fs::write(dir.path().join("_layouts/default.html"), "x").expect("write");
        assert_eq!(LayoutRegistry::load(&config).expect("load").len(), 1);
    }

    #[test]
    fn test_duplicate_across_directories() {
        let (dir, config) = site();
        fs::write(dir.path().join("_layouts/footer.html"), "a").expect("write");
        fs::write(dir.path().join("_includes/footer.html"), "b").expect("write");

        let err = LayoutRegistry::load(&config).unwrap_err();
        assert!(matches!(err, LayoutError::Duplicate { ref name, .. } if name == "footer"));
    }

    #[test]
    fn test_duplicate_by_stem() {
        let mut registry = LayoutRegistry::new();
        registry
            .define("page", "a", LayoutKind::Layout, "page.html")
            .expect("first");
        assert!(registry
            .define("page", "b", LayoutKind::Layout, "page.htm")
            .is_err());
    }

    #[test]
    fn test_strip_define() {
        assert_eq!(strip_define("{{define \"x\"}}body{{end}}"), "body");
        assert_eq!(strip_define("plain body"), "plain body");
        assert_eq!(strip_define("  {{- define \"x\" -}}\n a \n{{- end -}}"), "a");
    }
}
