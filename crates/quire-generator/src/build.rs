//! Build orchestration.
//!
//! Runs the whole pipeline for one site: load, derive collections, render,
//! emit, then write the feed and sitemap and copy static assets.
//!
//! Output is written into a staging tree next to the destination and moved
//! into place only once every stage has succeeded, so a failed build leaves
//! the previous output untouched. Files a previous build installed but the
//! current one no longer produces are removed; anything else already in the
//! destination is left alone.

use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::{Component, Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::Instant,
};

use quire_core::{Config, Page, Post};
use quire_parser::MarkdownConverter;
use serde_json::{Value, json};
use tera::Context;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    assets::{AssetCopier, AssetError},
    collections::{archive_buckets, group_by, paginate, pagination_url, sort_posts, tag_cloud},
    collector::ContentCollector,
    layout::{LayoutError, LayoutRegistry},
    rss::{FEED_FILE, RssGenerator},
    site::Site,
    sitemap::{SITEMAP_FILE, SitemapGenerator},
    template::{TemplateEngine, TemplateError},
    trie::UrlTrie,
};

/// Layout of pagination pages.
pub const INDEX_LAYOUT: &str = "index";
/// Layout of the archive listing.
pub const ARCHIVE_LAYOUT: &str = "archive";
/// Layout of the tag listing; the listing is skipped without it.
pub const TAG_LAYOUT: &str = "tag";
/// Layout of the category listing; the listing is skipped without it.
pub const CATEGORY_LAYOUT: &str = "category";

/// Files installed by the last successful build, one relative path per line.
pub const MANIFEST_FILE: &str = ".quire-manifest";

const ARCHIVE_URL: &str = "/archives/index.html";
const TAG_URL: &str = "/tags/index.html";
const CATEGORY_URL: &str = "/categories/index.html";

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write {path}: {source}")]
    Emit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("layout `{layout}` required by {entity} does not exist")]
    MissingLayout { layout: String, entity: String },

    #[error("rendering {entity} produced no output")]
    EmptyRender { entity: String },

    #[error("URL {url} is claimed by both {first} and {second}")]
    UrlCollision {
        url: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("output path escapes the destination: {0}")]
    InvalidOutputPath(String),

    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Page files written.
    pub pages: usize,

    /// Post files written, canonical and archive mirror.
    pub posts: usize,

    /// Pagination, archive, tag and category pages written.
    pub listings: usize,

    /// Static asset files copied.
    pub assets: usize,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

/// A rendered listing waiting to be written.
struct Listing {
    url: String,
    html: String,
}

/// Site builder that orchestrates the build process.
///
/// Builds through one `Builder` never overlap.
#[derive(Debug)]
pub struct Builder {
    config: Config,
    lock: Mutex<()>,
}

impl Builder {
    /// Create a new builder.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute the full build process.
    pub fn build(&self) -> Result<Site> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();
        let config = &self.config;

        info!(
            source = %config.source.display(),
            destination = %config.destination.display(),
            "starting build"
        );

        // 1. Preflight
        AssetCopier::new(&config.source, &config.destination).check()?;

        // 2. Load sources
        let collector = ContentCollector::new(config);
        let data = collector.load_data();
        let layouts = LayoutRegistry::load(config)?;
        let pages = collector.load_pages();
        let mut posts = collector.load_posts();

        // 3. Compile templates
        let engine = TemplateEngine::new(&layouts)?;

        // 4. Derive collections
        sort_posts(&mut posts);
        let paginated = paginate(posts.len(), config.paginate);
        let archives = archive_buckets(&posts);
        let tags = tag_cloud(&posts);
        let tag_index = group_by(&posts, |post| post.tags.as_slice());
        let categories = group_by(&posts, |post| post.categories.as_slice());

        // 5. Route
        check_collisions(&pages, &posts)?;
        let trie = route(&posts);

        let mut site = Site {
            config: config.clone(),
            pages,
            posts,
            layouts,
            data,
            paginated,
            archives,
            tags,
            tag_index,
            categories,
            trie,
            stats: BuildStats::default(),
        };

        // 6. Render
        let site_value = site.site_value();
        let converter = MarkdownConverter::new();
        render_pages(&engine, &converter, &site_value, &mut site.pages)?;
        render_posts(&engine, &converter, &site_value, &mut site.posts)?;
        let listings = render_listings(&engine, &site, &site_value)?;

        // 7. Emit
        let staging = Staging::create(config.staging_path())?;
        let mut stats = BuildStats::default();
        for listing in &listings {
            staging.emit(&listing.url, &listing.html)?;
            stats.listings += 1;
        }
        for page in &site.pages {
            if listings.iter().any(|listing| listing.url == page.url) {
                warn!(url = %page.url, path = %page.path.display(), "page replaces generated listing");
            }
            staging.emit(&page.url, &page.rendered)?;
            stats.pages += 1;
        }
        for post in &site.posts {
            staging.emit(&post.relative_url, &post.rendered)?;
            staging.emit(&post.archive_url(), &post.rendered)?;
            stats.posts += 2;
        }

        // 8. Feed and sitemap
        let feed = RssGenerator::new(config).generate(&site.posts);
        staging.emit(FEED_FILE, &feed)?;

        let mut sitemap = SitemapGenerator::new(config);
        sitemap.push("/");
        sitemap.extend(site.pages.iter().map(|page| page.url.as_str()));
        sitemap.extend(site.posts.iter().map(|post| post.relative_url.as_str()));
        sitemap.push("/archives/");
        if engine.has(TAG_LAYOUT) {
            sitemap.push("/tags/");
        }
        if engine.has(CATEGORY_LAYOUT) {
            sitemap.push("/categories/");
        }
        staging.emit(SITEMAP_FILE, &sitemap.generate())?;

        // 9. Static assets
        stats.assets = AssetCopier::new(&config.source, staging.root()).copy_all()?;

        // 10. Install
        let installed = staging.install(&config.destination)?;
        debug!(files = installed, "installed output");

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            pages = stats.pages,
            posts = stats.posts,
            listings = stats.listings,
            assets = stats.assets,
            duration_ms = stats.duration_ms,
            "build complete"
        );

        site.stats = stats;
        Ok(site)
    }
}

/// Scratch tree a build writes into. Removed on drop.
#[derive(Debug)]
struct Staging {
    root: PathBuf,
}

impl Staging {
    fn create(root: PathBuf) -> Result<Self> {
        if root.exists() {
            debug!(dir = %root.display(), "removing leftover staging directory");
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn root(&self) -> &Path {
        &self.root
    }

    /// Write `content` at the site-relative `url` below the staging root.
    fn emit(&self, url: &str, content: &str) -> Result<PathBuf> {
        let path = output_path(&self.root, url)?;
        let emit_err = |source| BuildError::Emit {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(emit_err)?;
        }
        fs::write(&path, content).map_err(emit_err)?;
        debug!(path = %path.display(), "wrote file");
        Ok(path)
    }

    /// Move every staged file into `destination` and drop the files the
    /// previous build installed that this one did not produce. Returns the
    /// number of files installed.
    fn install(self, destination: &Path) -> Result<usize> {
        let files = staged_files(&self.root)?;
        fs::create_dir_all(destination)?;

        let current: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
        for stale in read_manifest(destination) {
            if !current.contains(stale.as_path()) {
                remove_stale(destination, &stale);
            }
        }

        for relative in &files {
            let target = destination.join(relative);
            let emit_err = |source| BuildError::Emit {
                path: target.clone(),
                source,
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(emit_err)?;
            }
            fs::rename(self.root.join(relative), &target).map_err(emit_err)?;
        }

        let manifest: Vec<String> = files.iter().map(|path| manifest_line(path)).collect();
        let manifest_path = destination.join(MANIFEST_FILE);
        fs::write(&manifest_path, manifest.join("\n") + "\n").map_err(|source| BuildError::Emit {
            path: manifest_path.clone(),
            source,
        })?;

        Ok(files.len())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.root.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.root) {
            warn!(dir = %self.root.display(), error = %e, "failed to remove staging directory");
        }
    }
}

/// Staged files relative to `root`, in name order.
fn staged_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

fn manifest_line(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Relative paths listed in the destination's manifest. Lines that would
/// leave the destination are dropped.
fn read_manifest(destination: &Path) -> Vec<PathBuf> {
    let Ok(manifest) = fs::read_to_string(destination.join(MANIFEST_FILE)) else {
        return Vec::new();
    };
    manifest
        .lines()
        .map(Path::new)
        .filter(|path| {
            path.components().next().is_some()
                && path
                    .components()
                    .all(|component| matches!(component, Component::Normal(_)))
        })
        .map(Path::to_path_buf)
        .collect()
}

/// Delete a file left over from a previous build, then any directories the
/// removal emptied.
fn remove_stale(destination: &Path, relative: &Path) {
    let path = destination.join(relative);
    if !path.is_file() {
        return;
    }
    if let Err(e) = fs::remove_file(&path) {
        warn!(path = %path.display(), error = %e, "failed to remove stale output");
        return;
    }
    debug!(path = %path.display(), "removed stale output");

    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == destination || fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

/// Destination file for a site-relative URL.
fn output_path(destination: &Path, url: &str) -> Result<PathBuf> {
    let relative = Path::new(url.trim_start_matches('/'));
    let mut path = destination.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return Err(BuildError::InvalidOutputPath(url.to_string())),
        }
    }
    if path == destination {
        return Err(BuildError::InvalidOutputPath(url.to_string()));
    }
    Ok(path)
}

/// Canonical URLs must be unique across pages and posts.
fn check_collisions(pages: &[Page], posts: &[Post]) -> Result<()> {
    let mut claimed: HashMap<&str, &Path> = HashMap::new();
    let entries = pages
        .iter()
        .map(|page| (page.url.as_str(), page.path.as_path()))
        .chain(posts.iter().map(|post| (post.relative_url.as_str(), post.path.as_path())));

    for (url, path) in entries {
        if let Some(first) = claimed.insert(url, path) {
            return Err(BuildError::UrlCollision {
                url: url.to_string(),
                first: first.to_path_buf(),
                second: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Every post under its canonical and archive paths.
fn route(posts: &[Post]) -> UrlTrie<usize> {
    let mut trie = UrlTrie::new();
    for (idx, post) in posts.iter().enumerate() {
        trie.insert(&post.relative_url, idx);
        trie.insert(&post.archive_url(), idx);
    }
    debug!(routes = trie.len(), "built routing trie");
    trie
}

fn render_pages(
    engine: &TemplateEngine,
    converter: &MarkdownConverter,
    site_value: &Value,
    pages: &mut [Page],
) -> Result<()> {
    for page in pages {
        let entity = page.path.display().to_string();
        let content = converter.convert(&page.body);

        let mut context = Context::new();
        context.insert("page", &*page);
        context.insert("site", site_value);
        context.insert("content", &content);

        page.rendered = render_entity(engine, &page.layout, &context, entity)?;
    }
    Ok(())
}

fn render_posts(
    engine: &TemplateEngine,
    converter: &MarkdownConverter,
    site_value: &Value,
    posts: &mut [Post],
) -> Result<()> {
    for post in posts {
        let entity = post.path.display().to_string();
        let content = converter.convert(&post.body_without_title());

        let mut context = Context::new();
        context.insert("post", &*post);
        context.insert("site", site_value);
        context.insert("content", &content);

        post.rendered = render_entity(engine, &post.layout, &context, entity)?;
    }
    Ok(())
}

fn render_listings(engine: &TemplateEngine, site: &Site, site_value: &Value) -> Result<Vec<Listing>> {
    let mut listings = Vec::new();

    let total = site.paginated.len();
    if total > 0 {
        for (idx, range) in site.paginated.iter().enumerate() {
            let number = idx + 1;
            let indices: Vec<usize> = range.clone().collect();
            let prev = (number > 1).then(|| pagination_url(number - 1));
            let next = (number < total).then(|| pagination_url(number + 1));

            let mut context = Context::new();
            context.insert("layout", INDEX_LAYOUT);
            context.insert("title", &site.config.title);
            context.insert("posts", &site.posts_value(&indices));
            context.insert(
                "page",
                &json!({ "number": number, "total": total, "prev": prev, "next": next }),
            );
            context.insert("site", site_value);

            let url = pagination_url(number);
            let html = render_entity(engine, INDEX_LAYOUT, &context, format!("pagination page {number}"))?;
            listings.push(Listing { url, html });
        }
    }

    let mut context = Context::new();
    context.insert("layout", ARCHIVE_LAYOUT);
    context.insert("title", "归档");
    context.insert("archives", &site.archive_value());
    context.insert("site", site_value);
    let html = render_entity(engine, ARCHIVE_LAYOUT, &context, "archive listing".to_string())?;
    listings.push(Listing {
        url: ARCHIVE_URL.to_string(),
        html,
    });

    let groupings = [
        (TAG_LAYOUT, TAG_URL, "标签", "tags", &site.tag_index),
        (CATEGORY_LAYOUT, CATEGORY_URL, "分类", "categories", &site.categories),
    ];
    for (layout, url, title, key, groups) in groupings {
        if !engine.has(layout) {
            debug!(layout, "no layout, skipping listing");
            continue;
        }
        let mut context = Context::new();
        context.insert("layout", layout);
        context.insert("title", title);
        context.insert(key, &site.groups_value(groups));
        context.insert("site", site_value);

        let html = render_entity(engine, layout, &context, format!("{key} listing"))?;
        listings.push(Listing {
            url: url.to_string(),
            html,
        });
    }

    Ok(listings)
}

fn render_entity(
    engine: &TemplateEngine,
    layout: &str,
    context: &Context,
    entity: String,
) -> Result<String> {
    if !engine.has(layout) {
        return Err(BuildError::MissingLayout {
            layout: layout.to_string(),
            entity,
        });
    }
    let html = engine.render(layout, context)?;
    if html.trim().is_empty() {
        return Err(BuildError::EmptyRender { entity });
    }
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        let dest = Path::new("/out");
        assert_eq!(
            output_path(dest, "/2024/01/15/a.html").unwrap(),
            PathBuf::from("/out/2024/01/15/a.html")
        );
        assert_eq!(output_path(dest, "feed.xml").unwrap(), PathBuf::from("/out/feed.xml"));
        assert!(output_path(dest, "/../etc/passwd").is_err());
        assert!(output_path(dest, "/").is_err());
    }

    #[test]
    fn test_install_keeps_foreign_files_and_drops_stale_ones() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("public");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("precious.txt"), "keep me").unwrap();

        let staging = Staging::create(dir.path().join(".public.staging")).unwrap();
        staging.emit("/2024/01/15/a.html", "a").unwrap();
        staging.emit("/index.html", "home").unwrap();
        assert_eq!(staging.install(&dest).unwrap(), 2);
        assert!(!dir.path().join(".public.staging").exists());
        assert_eq!(
            fs::read_to_string(dest.join(MANIFEST_FILE)).unwrap(),
            "2024/01/15/a.html\nindex.html\n"
        );

        let staging = Staging::create(dir.path().join(".public.staging")).unwrap();
        staging.emit("/index.html", "home again").unwrap();
        staging.install(&dest).unwrap();

        assert!(!dest.join("2024").exists());
        assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "home again");
        assert_eq!(fs::read_to_string(dest.join("precious.txt")).unwrap(), "keep me");
    }

    #[test]
    fn test_staging_removed_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join(".out.staging");
        {
            let staging = Staging::create(root.clone()).unwrap();
            staging.emit("/a.html", "a").unwrap();
        }
        assert!(!root.exists());
    }

    #[test]
    fn test_read_manifest_ignores_escaping_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            "index.html\n../outside.txt\n/etc/passwd\n\nfeed.xml\n",
        )
        .unwrap();
        assert_eq!(
            read_manifest(dir.path()),
            vec![PathBuf::from("index.html"), PathBuf::from("feed.xml")]
        );
    }

    #[test]
    fn test_check_collisions() {
        let config = Config::default();
        let a = Post::from_source("_posts/2024-01-15-a.md", "one", &config).unwrap();
        let b = Post::from_source("_posts/2024-01-15-b.md", "two", &config).unwrap();
        assert!(check_collisions(&[], &[a.clone(), b]).is_ok());

        let again = Post::from_source("_posts/2024-01-15-a.markdown", "three", &config).unwrap();
        let err = check_collisions(&[], &[a, again]).unwrap_err();
        assert!(matches!(err, BuildError::UrlCollision { ref url, .. } if url == "/2024/01/15/a.html"));
    }

    #[test]
    fn test_route_mirrors() {
        let config = Config::default();
        let posts = vec![Post::from_source("_posts/2024-01-15-a.md", "one", &config).unwrap()];
        let trie = route(&posts);
        assert_eq!(trie.lookup("/2024/01/15/a.html"), Some(&0));
        assert_eq!(trie.lookup("/archives/2024/01/15/a.html"), Some(&0));
        assert_eq!(trie.len(), 2);
    }
}
