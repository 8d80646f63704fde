//! Site configuration management.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Component, Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Config file names searched in the source directory, in order.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["_config.yml", "_config.yaml", "_config.toml"];

/// Destination directory name that may live inside the source tree.
const NESTED_DESTINATION: &str = "_site";

/// Main configuration structure for Quire.
///
/// Built once by [`Config::load`] and treated as read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source tree root.
    pub source: PathBuf,

    /// Output directory for the generated site.
    pub destination: PathBuf,

    /// Layouts directory, relative to the source root.
    pub layouts_dir: String,

    /// Data directory, relative to the source root.
    pub data_dir: String,

    /// Includes directory, relative to the source root.
    pub includes_dir: String,

    /// Posts directory, relative to the source root.
    pub posts_dir: String,

    /// Comma separated markup extensions.
    pub markdown_ext: String,

    /// Post URL policy.
    pub permalink: Permalink,

    /// Posts per index page. Zero disables pagination.
    pub paginate: usize,

    /// Default excerpt separator for pages and posts.
    pub excerpt_separator: String,

    /// Server bind host.
    pub host: String,

    /// Server bind port.
    pub port: u16,

    /// Site title.
    pub title: String,

    /// Site subtitle.
    pub subtitle: String,

    /// Site description for feeds and meta tags.
    pub description: String,

    /// Site author.
    pub author: String,

    /// Absolute base URL (e.g. "http://example.com").
    pub url: String,

    /// Free-form data exposed to templates as `site.data`.
    pub data: BTreeMap<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: PathBuf::from("."),
            destination: PathBuf::from("_site"),
            layouts_dir: "_layouts".to_string(),
            data_dir: "_data".to_string(),
            includes_dir: "_includes".to_string(),
            posts_dir: "_posts".to_string(),
            markdown_ext: "markdown,mkdown,mkdn,mkd,md".to_string(),
            permalink: Permalink::Date,
            paginate: 0,
            excerpt_separator: "\n\n".to_string(),
            host: "127.0.0.1".to_string(),
            port: 4000,
            title: "Octopress 文档".to_string(),
            subtitle: String::new(),
            description: "Octopress 静态博客框架文档".to_string(),
            author: "Octopress".to_string(),
            url: "http://localhost:4000".to_string(),
            data: BTreeMap::new(),
        }
    }
}

/// Post URL policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Permalink {
    /// `/Y/M/D/slug.html`
    Date,
    /// `/Y/M/D/slug/index.html`
    Pretty,
    /// Same layout as `Pretty`.
    None,
    /// Pattern with `:year`, `:month`, `:day`, `:slug` and `:title` placeholders.
    Custom(String),
}

impl From<String> for Permalink {
    fn from(value: String) -> Self {
        match value.trim() {
            "" | "date" => Self::Date,
            "pretty" => Self::Pretty,
            "none" => Self::None,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<Permalink> for String {
    fn from(value: Permalink) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Permalink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date => f.write_str("date"),
            Self::Pretty => f.write_str("pretty"),
            Self::None => f.write_str("none"),
            Self::Custom(pattern) => f.write_str(pattern),
        }
    }
}

/// Values supplied on the command line. They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub url: Option<String>,
}

impl Config {
    /// Resolve the effective configuration.
    ///
    /// Layers, lowest first: built-in defaults, the config file, `QUIRE__*`
    /// environment variables, then `overrides`. When `config_path` is `None`
    /// the source directory is searched for `_config.{yml,yaml,toml}`.
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let defaults = Self::default();
        let search_root = overrides
            .source
            .clone()
            .unwrap_or_else(|| defaults.source.clone());

        let file = match config_path {
            Some(path) if !path.exists() => {
                return Err(CoreError::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(&search_root),
        };

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&defaults)?);
        if let Some(path) = &file {
            tracing::debug!(path = %path.display(), "loading config file");
            builder = builder.add_source(
                config::File::from(path.as_path())
                    .format(file_format(path))
                    .required(true),
            );
        }
        builder = builder.add_source(config::Environment::with_prefix("QUIRE").separator("__"));

        let settings = builder.build().map_err(|e| {
            CoreError::config_with_source(
                match &file {
                    Some(path) => format!("Failed to parse config file: {}", path.display()),
                    None => "Failed to resolve configuration".to_string(),
                },
                e,
            )
        })?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Find the first `_config.*` file in `source`.
    pub fn discover(source: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| source.join(name))
            .find(|path| path.is_file())
    }

    fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(source) = &overrides.source {
            self.source = source.clone();
        }
        if let Some(destination) = &overrides.destination {
            self.destination = destination.clone();
        }
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(url) = &overrides.url {
            tracing::info!(url = %url, "overriding site url from CLI");
            self.url = url.clone();
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if !self.source.is_dir() {
            return Err(CoreError::config(format!(
                "source directory does not exist: {}",
                self.source.display()
            )));
        }

        let source = absolutize(&self.source)?;
        let destination = absolutize(&self.destination)?;

        if destination == source {
            return Err(CoreError::config(
                "destination cannot be the source directory",
            ));
        }
        if source.starts_with(&destination) {
            return Err(CoreError::config(format!(
                "destination {} contains the source directory",
                self.destination.display()
            )));
        }
        let nested_site = destination
            .file_name()
            .is_some_and(|name| name == NESTED_DESTINATION);
        if destination.starts_with(&source) && !nested_site {
            return Err(CoreError::config(format!(
                "destination {} cannot be inside the source directory",
                self.destination.display()
            )));
        }

        if self.url.ends_with('/') {
            tracing::warn!("url should not have a trailing slash");
        }

        Ok(())
    }

    /// Lowercase markup extensions without the leading dot.
    pub fn markdown_extensions(&self) -> BTreeSet<String> {
        self.markdown_ext
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Whether `path` has one of the configured markup extensions.
    pub fn is_markup_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.markdown_extensions().contains(&ext.to_lowercase()))
    }

    /// Turn a site-relative path into an absolute URL.
    ///
    /// Inputs that already carry an `http://` or `https://` scheme are
    /// returned unchanged.
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Layouts directory inside the source tree.
    pub fn layouts_path(&self) -> PathBuf {
        self.source.join(&self.layouts_dir)
    }

    /// Includes directory inside the source tree.
    pub fn includes_path(&self) -> PathBuf {
        self.source.join(&self.includes_dir)
    }

    /// Data directory inside the source tree.
    pub fn data_path(&self) -> PathBuf {
        self.source.join(&self.data_dir)
    }

    /// Posts directory inside the source tree.
    pub fn posts_path(&self) -> PathBuf {
        self.source.join(&self.posts_dir)
    }

    /// Hidden sibling of the destination that a build renders into before
    /// its files are moved into place.
    pub fn staging_path(&self) -> PathBuf {
        let name = self
            .destination
            .file_name()
            .map_or_else(|| "site".into(), |name| name.to_string_lossy());
        let parent = self.destination.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{name}.staging"))
    }
}

fn file_format(path: &Path) -> config::FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => config::FileFormat::Toml,
        _ => config::FileFormat::Yaml,
    }
}

/// Absolute, lexically normalized form of `path`. The path need not exist.
fn absolutize(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(dir.path().join("site")).expect("create site");
        dir
    }

    fn overrides_for(dir: &Path) -> ConfigOverrides {
        ConfigOverrides {
            source: Some(dir.join("site")),
            destination: Some(dir.join("site").join("_site")),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let dir = site_dir();
        let config = Config::load(None, &overrides_for(dir.path())).expect("load config");

        assert_eq!(config.layouts_dir, "_layouts");
        assert_eq!(config.posts_dir, "_posts");
        assert_eq!(config.permalink, Permalink::Date);
        assert_eq!(config.port, 4000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.url, "http://localhost:4000");
        assert_eq!(config.paginate, 0);
        assert_eq!(config.excerpt_separator, "\n\n");
        assert_eq!(config.title, "Octopress 文档");
    }

    #[test]
    fn test_discovered_yaml_merges_onto_defaults() {
        let dir = site_dir();
        let yaml = r#"
title: "My Blog"
url: "http://example.com"
permalink: pretty
paginate: 3
data:
  github: someone
"#;
        std::fs::write(dir.path().join("site/_config.yml"), yaml).expect("write");

        let config = Config::load(None, &overrides_for(dir.path())).expect("load config");

        assert_eq!(config.title, "My Blog");
        assert_eq!(config.url, "http://example.com");
        assert_eq!(config.permalink, Permalink::Pretty);
        assert_eq!(config.paginate, 3);
        assert_eq!(config.author, "Octopress");
        assert_eq!(
            config.data.get("github"),
            Some(&serde_json::Value::String("someone".to_string()))
        );
    }

    #[test]
    fn test_toml_config_and_custom_permalink() {
        let dir = site_dir();
        let toml = r#"
title = "Toml Blog"
permalink = "/blog/:year/:slug/"
"#;
        std::fs::write(dir.path().join("site/_config.toml"), toml).expect("write");

        let config = Config::load(None, &overrides_for(dir.path())).expect("load config");

        assert_eq!(config.title, "Toml Blog");
        assert_eq!(
            config.permalink,
            Permalink::Custom("/blog/:year/:slug/".to_string())
        );
    }

    #[test]
    fn test_cli_overrides_win() {
        let dir = site_dir();
        std::fs::write(dir.path().join("site/_config.yml"), "port: 5000\n").expect("write");

        let mut overrides = overrides_for(dir.path());
        overrides.port = Some(8080);
        overrides.host = Some("0.0.0.0".to_string());
        overrides.url = Some("http://127.0.0.1:8080".to_string());

        let config = Config::load(None, &overrides).expect("load config");
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_explicit_config_not_found() {
        let dir = site_dir();
        let result = Config::load(
            Some(Path::new("/nonexistent/_config.yml")),
            &overrides_for(dir.path()),
        );
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_missing_source_is_rejected() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let overrides = ConfigOverrides {
            source: Some(dir.path().join("missing")),
            ..ConfigOverrides::default()
        };
        let err = Config::load(None, &overrides).unwrap_err();
        assert!(err.to_string().contains("source directory does not exist"));
    }

    #[test]
    fn test_destination_placement_rules() {
        let dir = site_dir();
        let source = dir.path().join("site");

        let nested = ConfigOverrides {
            source: Some(source.clone()),
            destination: Some(source.join("public")),
            ..ConfigOverrides::default()
        };
        assert!(Config::load(None, &nested).is_err());

        let ancestor = ConfigOverrides {
            source: Some(source.clone()),
            destination: Some(dir.path().to_path_buf()),
            ..ConfigOverrides::default()
        };
        assert!(Config::load(None, &ancestor).is_err());

        let sibling = ConfigOverrides {
            source: Some(source.clone()),
            destination: Some(dir.path().join("public")),
            ..ConfigOverrides::default()
        };
        assert!(Config::load(None, &sibling).is_ok());

        let nested_site = ConfigOverrides {
            source: Some(source.clone()),
            destination: Some(source.join("build").join("_site")),
            ..ConfigOverrides::default()
        };
        assert!(Config::load(None, &nested_site).is_ok());
    }

    #[test]
    fn test_markdown_extensions() {
        let config = Config {
            markdown_ext: "md, Markdown,.mkd,".to_string(),
            ..Config::default()
        };
        let exts = config.markdown_extensions();
        assert_eq!(exts.len(), 3);
        assert!(exts.contains("markdown"));
        assert!(config.is_markup_file(Path::new("about.MD")));
        assert!(config.is_markup_file(Path::new("notes.mkd")));
        assert!(!config.is_markup_file(Path::new("style.css")));
        assert!(!config.is_markup_file(Path::new("README")));
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let config = Config {
            destination: PathBuf::from("/srv/blog/_site"),
            ..Config::default()
        };
        assert_eq!(config.staging_path(), PathBuf::from("/srv/blog/._site.staging"));
    }

    #[test]
    fn test_absolute_url() {
        let config = Config {
            url: "http://example.com/".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.absolute_url("/2024/01/15/a.html"),
            "http://example.com/2024/01/15/a.html"
        );
        assert_eq!(config.absolute_url("about.html"), "http://example.com/about.html");
        assert_eq!(
            config.absolute_url("https://elsewhere.org/x.html"),
            "https://elsewhere.org/x.html"
        );
    }
}
