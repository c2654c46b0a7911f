// src/watch/watcher.rs

//! Directory tree watcher.
//!
//! The OS notification facility is registered per directory, never
//! recursively, so the set of watched directories is explicit and the
//! exclusion list is enforced at registration time. Newly created
//! directories are picked up by re-walking them, which also closes the race
//! where files land inside a directory between its creation and its
//! registration.
//!
//! Every surviving notification event turns into exactly one run request,
//! and the watcher waits for that request's acknowledgment before touching
//! the next event. That blocking hand-off is what serializes the whole
//! pipeline.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{Result, WatchrunError};
use crate::run::{RunRequest, submit_request};

/// Directory names never registered for watching: version-control metadata
/// and vendored dependencies.
pub const EXCLUDED_DIRS: [&str; 2] = [".git", "vendor"];

/// Watches the root path and all its non-excluded subdirectories, turning
/// notification events into acknowledged run requests.
pub struct TreeWatcher {
    root: PathBuf,
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<(Instant, notify::Result<Event>)>,
    watched: HashSet<PathBuf>,
    request_tx: mpsc::Sender<RunRequest>,
}

impl std::fmt::Debug for TreeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWatcher")
            .field("root", &self.root)
            .field("watched", &self.watched.len())
            .finish_non_exhaustive()
    }
}

impl TreeWatcher {
    /// Create the notification facility and register the root.
    ///
    /// A directory root is walked recursively; a regular-file root is
    /// registered as exactly that path. The root must exist.
    pub fn new(root: PathBuf, request_tx: mpsc::Sender<RunRequest>) -> Result<Self> {
        // Bridge from notify's synchronous callback into the async loop.
        // Events are timestamped on delivery, not when we get around to
        // them, so a queued burst is coalesced by the coordinator's
        // staleness check instead of causing one run per event.
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.send((Instant::now(), res));
            },
            Config::default(),
        )
        .map_err(|err| WatchrunError::Setup(format!("creating file watcher: {err}")))?;

        let mut this = Self {
            root: root.clone(),
            watcher,
            event_rx,
            watched: HashSet::new(),
            request_tx,
        };

        let meta = std::fs::metadata(&root)
            .map_err(|err| WatchrunError::Setup(format!("stat {}: {err}", root.display())))?;
        if meta.is_dir() {
            this.register_tree(&root)?;
        } else {
            this.watch_path(&root)?;
        }

        info!(
            root = %root.display(),
            watched = this.watched.len(),
            "watch registration complete"
        );
        Ok(this)
    }

    /// The set of currently registered paths.
    pub fn watch_set(&self) -> &HashSet<PathBuf> {
        &self.watched
    }

    /// Register `path` and every non-excluded directory below it.
    ///
    /// Safe to repeat: already-registered directories are skipped, and a
    /// path that vanished between the triggering event and the walk is a
    /// silent no-op. Regular files are a no-op too; their parent directory
    /// watch already covers them.
    pub fn register_tree(&mut self, path: &Path) -> Result<()> {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if !meta.is_dir() || is_excluded(path) {
            return Ok(());
        }

        let walker = WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.file_type().is_dir() && !is_excluded(entry.path()));

        for entry in walker {
            match entry {
                Ok(entry) => self.watch_path(entry.path())?,
                Err(err)
                    if err.io_error().map(|e| e.kind())
                        == Some(std::io::ErrorKind::NotFound) =>
                {
                    // Entries can disappear while we walk.
                    continue;
                }
                Err(err) => return Err(std::io::Error::from(err).into()),
            }
        }
        Ok(())
    }

    /// Register a single path, idempotently.
    fn watch_path(&mut self, path: &Path) -> Result<()> {
        if self.watched.contains(path) {
            return Ok(());
        }
        match self.watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(path = %path.display(), "watching");
                self.watched.insert(path.to_path_buf());
                Ok(())
            }
            Err(err) if vanished(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Event loop: consume notification events until the pipeline shuts
    /// down or the watch point is lost.
    pub async fn run(mut self) -> Result<()> {
        while let Some((detected_at, res)) = self.event_rx.recv().await {
            let event = res?;
            if !self.handle_event(detected_at, event).await? {
                break;
            }
        }
        Ok(())
    }

    /// Handle one notification event. Returns false once the coordinator
    /// is gone and the loop should end.
    async fn handle_event(&mut self, detected_at: Instant, event: Event) -> Result<bool> {
        if matches!(event.kind, EventKind::Access(_)) {
            return Ok(true);
        }
        debug!(?event, "filesystem event");

        for path in &event.paths {
            if is_creation(&event.kind) {
                self.register_tree(path)?;
            }
            if is_removal(&event.kind) {
                self.watched.remove(path.as_path());
                if self.root.starts_with(path) {
                    return Err(WatchrunError::WatchPointLost(path.clone()));
                }
            }
        }

        // One acknowledged run request per surviving event. Waiting for the
        // acknowledgment before the next event is the backpressure that
        // keeps runs serialized.
        Ok(submit_request(&self.request_tx, detected_at).await)
    }
}

fn is_excluded(path: &Path) -> bool {
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => EXCLUDED_DIRS.contains(&name),
        None => false,
    }
}

fn is_creation(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both))
    )
}

fn is_removal(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::From | RenameMode::Both))
    )
}

fn vanished(err: &notify::Error) -> bool {
    match &err.kind {
        notify::ErrorKind::PathNotFound => true,
        notify::ErrorKind::Io(io) => io.kind() == std::io::ErrorKind::NotFound,
        _ => false,
    }
}
