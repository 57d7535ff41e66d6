//! Project file watcher.
//!
//! Raw notify events are filtered and forwarded over an unbounded channel;
//! [`next_batch`] turns the stream into debounced sets of changed paths.

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Directory names never worth a rebuild.
const IGNORED_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// Filtered watcher event.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// Paths that changed.
    pub paths: Vec<PathBuf>,
    /// Kind of change.
    pub kind: WatchEventKind,
}

/// Kind of watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Modify,
    Remove,
    Other,
}

impl From<&EventKind> for WatchEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Create,
            EventKind::Modify(_) => Self::Modify,
            EventKind::Remove(_) => Self::Remove,
            _ => Self::Other,
        }
    }
}

/// Recursive watcher over a project root.
///
/// Dropping it stops the underlying notify watcher and closes the channel.
pub struct ProjectWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for ProjectWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectWatcher")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl ProjectWatcher {
    /// Start watching `root`. Events under any of `ignore` (typically the
    /// output directory) are dropped.
    pub fn start(
        root: &Path,
        ignore: Vec<PathBuf>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), WatchError> {
        if !root.is_dir() {
            return Err(WatchError::InvalidRoot(root.display().to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel::<WatchEvent>();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !should_process_event(&event) {
                        return;
                    }
                    let paths: Vec<PathBuf> = event
                        .paths
                        .iter()
                        .filter(|p| !should_ignore(p, &ignore))
                        .cloned()
                        .collect();
                    if paths.is_empty() {
                        return;
                    }
                    let watch_event = WatchEvent {
                        paths,
                        kind: WatchEventKind::from(&event.kind),
                    };
                    if let Err(e) = tx.send(watch_event) {
                        warn!(error = %e, "Failed to send watch event");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Watch error");
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;
        info!(root = %root.display(), "Watching directory");

        Ok((
            Self {
                root: root.to_path_buf(),
                _watcher: watcher,
            },
            rx,
        ))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Wait for the next burst of changes.
///
/// Blocks until one event arrives, then keeps collecting until `window`
/// passes with no new event. Paths come back deduplicated in first-seen
/// order. Returns `None` once the channel is closed and drained.
pub async fn next_batch(
    rx: &mut mpsc::UnboundedReceiver<WatchEvent>,
    window: Duration,
) -> Option<Vec<PathBuf>> {
    let first = rx.recv().await?;

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut batch = Vec::new();
    let mut push = |paths: Vec<PathBuf>| {
        for path in paths {
            if seen.insert(path.clone()) {
                batch.push(path);
            }
        }
    };
    push(first.paths);

    loop {
        match tokio::time::timeout(window, rx.recv()).await {
            Ok(Some(event)) => push(event.paths),
            // Closed: flush what we have, the next call reports the end
            Ok(None) => break,
            Err(_) => break,
        }
    }

    debug!(count = batch.len(), "Coalesced file events");
    Some(batch)
}

/// Check if we should process this event.
fn should_process_event(event: &Event) -> bool {
    match &event.kind {
        EventKind::Create(CreateKind::File) => true,
        EventKind::Modify(ModifyKind::Data(_)) => true,
        EventKind::Modify(ModifyKind::Name(
            RenameMode::To | RenameMode::From | RenameMode::Both,
        )) => true,
        // Some backends only report `Any` for content writes
        EventKind::Modify(ModifyKind::Any) => true,
        EventKind::Remove(RemoveKind::File) => true,
        _ => false,
    }
}

/// Whether `path` lies in an ignored directory.
fn should_ignore(path: &Path, ignore: &[PathBuf]) -> bool {
    if ignore.iter().any(|dir| path.starts_with(dir)) {
        return true;
    }
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
    })
}

/// Watcher error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    InvalidRoot(String),
    WatcherFailed(String),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRoot(root) => write!(f, "Invalid watch root: {root}"),
            Self::WatcherFailed(msg) => write!(f, "Watcher failed: {msg}"),
        }
    }
}

impl std::error::Error for WatchError {}
