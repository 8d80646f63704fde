//! Content-hashed file watcher with debounced rebuilds
//!
//! Filesystem events only nominate candidate paths. Once a burst of events
//! has been quiet for the debounce window, every candidate is rehashed and
//! compared with the [`FileIndex`] recorded for the last rebuild, so a burst
//! that leaves the bytes as they were (editor saves, a file reverted before
//! the window closes) never triggers a rebuild. Effective changes are fed to
//! a single rebuild worker through a capacity-1 channel.

use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use color_eyre::eyre::{Result, WrapErr};
use notify::{Event, EventKind, RecursiveMode, Watcher, event::ModifyKind};
use quire_core::Config;
use quire_generator::{Builder, Site};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc::{self, error::TrySendError};
use walkdir::WalkDir;

/// Quiet period after the last change before a rebuild is requested.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Decides which paths the watcher cares about.
#[derive(Debug, Clone)]
pub struct PathFilter {
    roots: Vec<PathBuf>,
    destination: PathBuf,
    destination_name: Option<String>,
}

impl PathFilter {
    pub fn new(roots: Vec<PathBuf>, destination: PathBuf) -> Self {
        let destination_name = destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Self {
            roots,
            destination,
            destination_name,
        }
    }

    /// Hidden entries and anything inside the destination are ignored.
    pub fn is_ignored(&self, path: &Path) -> bool {
        if path.starts_with(&self.destination) {
            return true;
        }

        let relative = self
            .roots
            .iter()
            .filter_map(|root| path.strip_prefix(root).ok())
            .min_by_key(|rel| rel.components().count());
        let relative = match relative {
            Some(rel) => rel,
            None => match path.file_name() {
                Some(name) => Path::new(name),
                None => return false,
            },
        };

        relative.components().any(|component| match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                name.starts_with('.') || self.destination_name.as_deref() == Some(name.as_ref())
            }
            _ => false,
        })
    }

    /// Paths of `event` that may have changed content.
    pub fn candidates(&self, event: &Event) -> Vec<PathBuf> {
        let relevant = matches!(
            event.kind,
            EventKind::Create(_)
                | EventKind::Remove(_)
                | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
        );
        if !relevant {
            return Vec::new();
        }
        event
            .paths
            .iter()
            .filter(|path| !self.is_ignored(path))
            .cloned()
            .collect()
    }
}

/// Digests of every watched file, keyed by path, as of the last rebuild.
#[derive(Debug)]
pub struct FileIndex {
    digests: HashMap<PathBuf, String>,
    filter: PathFilter,
}

impl FileIndex {
    pub fn new(filter: PathFilter) -> Self {
        Self {
            digests: HashMap::new(),
            filter,
        }
    }

    /// Record the digest of every file under `root` that is not ignored.
    pub fn scan(&mut self, root: &Path) {
        for path in self.files_under(root) {
            self.refresh(&path);
        }
    }

    /// Rehash `paths` and fold them into the index. Returns `true` when any
    /// file was added, removed or now holds different bytes.
    pub fn settle<I>(&mut self, paths: I) -> bool
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut changed = false;
        for path in paths {
            if self.filter.is_ignored(&path) {
                continue;
            }
            let dirty = if path.is_dir() {
                self.files_under(&path)
                    .into_iter()
                    .fold(false, |dirty, file| self.refresh(&file) | dirty)
            } else if path.is_file() {
                self.refresh(&path)
            } else {
                self.forget(&path)
            };
            if dirty {
                tracing::debug!(path = %path.display(), "Change detected");
            }
            changed |= dirty;
        }
        changed
    }

    fn files_under(&self, root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| !self.filter.is_ignored(entry.path()))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Store the current digest of `path`. Returns `true` when it differs
    /// from the stored one.
    fn refresh(&mut self, path: &Path) -> bool {
        match digest(path) {
            Ok(hash) => {
                if self.digests.get(path) == Some(&hash) {
                    tracing::trace!(path = %path.display(), "Content unchanged");
                    false
                } else {
                    self.digests.insert(path.to_path_buf(), hash);
                    true
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to hash file");
                false
            }
        }
    }

    /// Drop `path` and everything below it.
    fn forget(&mut self, path: &Path) -> bool {
        let before = self.digests.len();
        self.digests.retain(|known, _| !known.starts_with(path));
        self.digests.len() != before
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

/// Hex encoded SHA-256 of a file's contents.
pub fn digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// The source root plus any framework directory that lives outside it.
pub fn watch_roots(config: &Config) -> Vec<PathBuf> {
    let source = fs::canonicalize(&config.source).unwrap_or_else(|_| config.source.clone());
    let mut roots = vec![source.clone()];

    let framework = [
        config.posts_path(),
        config.layouts_path(),
        config.includes_path(),
        config.data_path(),
    ];
    for dir in framework {
        let Ok(dir) = fs::canonicalize(&dir) else {
            continue;
        };
        if !dir.starts_with(&source) && !roots.contains(&dir) {
            roots.push(dir);
        }
    }
    roots
}

/// Collect candidate paths until `window` passes without another one, then
/// settle them against `index`. A token is sent only when the settled burst
/// changed something, and dropped when one is already pending.
pub async fn debounce(
    mut marks: mpsc::UnboundedReceiver<PathBuf>,
    mut index: FileIndex,
    tokens: mpsc::Sender<()>,
    window: Duration,
) {
    while let Some(first) = marks.recv().await {
        let mut pending = HashSet::from([first]);
        let timer = tokio::time::sleep(window);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                mark = marks.recv() => match mark {
                    Some(path) => {
                        pending.insert(path);
                        timer.as_mut().reset(tokio::time::Instant::now() + window);
                    }
                    None => break,
                },
                () = &mut timer => break,
            }
        }

        if !index.settle(pending) {
            tracing::debug!("Content unchanged, skipping rebuild");
            continue;
        }
        match tokens.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => tracing::debug!("Rebuild already pending"),
            Err(TrySendError::Closed(())) => return,
        }
    }
}

async fn rebuild_worker<F>(builder: Arc<Builder>, mut tokens: mpsc::Receiver<()>, on_rebuild: F)
where
    F: Fn(Site) + Send + Sync + 'static,
{
    while tokens.recv().await.is_some() {
        println!("  ↻ Change detected, rebuilding...");
        let start = Instant::now();
        let task_builder = Arc::clone(&builder);

        match tokio::task::spawn_blocking(move || task_builder.build()).await {
            Ok(Ok(site)) => {
                let elapsed = start.elapsed().as_millis() as u64;
                tracing::info!(elapsed_ms = elapsed, posts = site.posts.len(), "Rebuild completed");
                println!("  ✓ Rebuilt in {elapsed}ms");
                on_rebuild(site);
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Rebuild failed");
                eprintln!("  ✗ Rebuild failed: {e}");
            }
            Err(e) => tracing::error!(error = %e, "Rebuild task panicked"),
        }
    }
}

/// Watch the site sources and rebuild on every effective change.
///
/// `on_rebuild` receives each successfully built site. Runs until the
/// notification stream ends.
pub async fn run<F>(builder: Arc<Builder>, on_rebuild: F) -> Result<()>
where
    F: Fn(Site) + Send + Sync + 'static,
{
    let roots = watch_roots(builder.config());
    let destination = fs::canonicalize(&builder.config().destination)
        .unwrap_or_else(|_| builder.config().destination.clone());

    let filter = PathFilter::new(roots.clone(), destination);
    let mut index = FileIndex::new(filter.clone());
    for root in &roots {
        index.scan(root);
    }
    tracing::info!(files = index.len(), roots = ?roots, "Indexed watched files");

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = event_tx.send(res);
    })
    .wrap_err("Failed to create file watcher")?;

    for root in &roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .wrap_err_with(|| format!("Failed to watch {}", root.display()))?;
        tracing::debug!(root = %root.display(), "Watching directory");
    }

    let (mark_tx, mark_rx) = mpsc::unbounded_channel();
    let (token_tx, token_rx) = mpsc::channel(1);
    tokio::spawn(debounce(mark_rx, index, token_tx, DEBOUNCE));
    tokio::spawn(rebuild_worker(builder, token_rx, on_rebuild));

    println!("  Watching for changes... (Ctrl+C to stop)");

    while let Some(res) = event_rx.recv().await {
        match res {
            Ok(event) => {
                for path in filter.candidates(&event) {
                    tracing::trace!(path = %path.display(), kind = ?event.kind, "Candidate change");
                    let _ = mark_tx.send(path);
                }
            }
            Err(e) => tracing::warn!(error = %e, "File watcher error"),
        }
    }

    drop(watcher);
    Ok(())
}
