//! Filesystem watcher feeding the change bridge
//!
//! Wraps a `notify` watcher. Targets that do not exist yet are covered by
//! watching their nearest existing ancestor; once they appear the watch is
//! moved onto them.

use crate::bridge::{FileEvent, FileEventKind};
use crate::error::RegistryError;
use modekit_store::WatchTarget;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Live filesystem watch; stops when dropped
pub struct FsWatcher {
    watcher: Arc<Mutex<Armed>>,
    forward: JoinHandle<()>,
}

struct Armed {
    inner: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl FsWatcher {
    /// Start watching `targets`, sending translated events to `sink`
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`RegistryError::Watch`] if the platform watcher cannot be
    /// created.
    pub fn start(
        targets: Vec<WatchTarget>,
        sink: mpsc::UnboundedSender<FileEvent>,
    ) -> Result<Self, RegistryError> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let inner = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| RegistryError::Watch(e.to_string()))?;

        let watcher = Arc::new(Mutex::new(Armed {
            inner,
            watched: HashSet::new(),
        }));
        let mut pending = watcher.lock().arm(&targets);

        let task_watcher = watcher.clone();
        let forward = tokio::spawn(async move {
            while let Some(res) = raw_rx.recv().await {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("watch error: {e}");
                        continue;
                    }
                };
                let created = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
                );
                for file_event in translate(&event) {
                    if sink.send(file_event).is_err() {
                        debug!("event sink closed, stopping watcher");
                        return;
                    }
                }
                if created && !pending.is_empty() {
                    pending = task_watcher.lock().arm(&pending);
                }
            }
        });

        Ok(Self { watcher, forward })
    }

    /// Paths currently registered with the platform watcher
    #[must_use]
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.watcher.lock().watched.iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.forward.abort();
    }
}

impl std::fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWatcher")
            .field("watched", &self.watched())
            .finish()
    }
}

impl Armed {
    /// Register what can be registered; returns targets still waiting to
    /// appear
    fn arm(&mut self, targets: &[WatchTarget]) -> Vec<WatchTarget> {
        let mut pending = Vec::new();
        for target in targets {
            let (path, mode, done) = match std::fs::metadata(&target.path) {
                Ok(meta) if meta.is_dir() => {
                    let mode = if target.recursive {
                        RecursiveMode::Recursive
                    } else {
                        RecursiveMode::NonRecursive
                    };
                    (target.path.clone(), mode, true)
                }
                // Files are replaced by rename; watch the directory
                Ok(_) => match target.path.parent() {
                    Some(parent) => (parent.to_path_buf(), RecursiveMode::NonRecursive, true),
                    None => continue,
                },
                Err(_) => match nearest_existing_ancestor(&target.path) {
                    Some(ancestor) => (ancestor, RecursiveMode::NonRecursive, false),
                    None => {
                        pending.push(target.clone());
                        continue;
                    }
                },
            };

            if !self.watched.contains(&path) {
                match self.inner.watch(&path, mode) {
                    Ok(()) => {
                        debug!(path = %path.display(), "watching");
                        self.watched.insert(path);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), "cannot watch: {e}");
                        pending.push(target.clone());
                        continue;
                    }
                }
            }
            if !done {
                pending.push(target.clone());
            }
        }
        pending
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .skip(1)
        .find(|p| std::fs::metadata(p).is_ok_and(|m| m.is_dir()))
        .map(Path::to_path_buf)
}

/// Translate a platform event into bridge events
pub(crate) fn translate(event: &Event) -> Vec<FileEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FileEventKind::Created,
        EventKind::Remove(_) => FileEventKind::Removed,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(mode)) => {
            return rename_events(mode, &event.paths);
        }
        EventKind::Modify(_) => FileEventKind::Changed,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };
    event
        .paths
        .iter()
        .map(|path| FileEvent::new(kind, path.clone()))
        .collect()
}

fn rename_events(mode: RenameMode, paths: &[PathBuf]) -> Vec<FileEvent> {
    match (mode, paths) {
        (RenameMode::Both, [from, to]) => vec![
            FileEvent::new(FileEventKind::Removed, from.clone()),
            FileEvent::new(FileEventKind::Created, to.clone()),
        ],
        (RenameMode::From, _) => paths
            .iter()
            .map(|p| FileEvent::new(FileEventKind::Removed, p.clone()))
            .collect(),
        (RenameMode::To, _) => paths
            .iter()
            .map(|p| FileEvent::new(FileEventKind::Created, p.clone()))
            .collect(),
        _ => paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    FileEventKind::Created
                } else {
                    FileEventKind::Removed
                };
                FileEvent::new(kind, p.clone())
            })
            .collect(),
    }
}
