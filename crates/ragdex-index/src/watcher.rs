use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::Result;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    /// File created or its content changed.
    Upsert,
    /// File deleted or moved away.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

impl FsEvent {
    #[must_use]
    pub fn upsert(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FsEventKind::Upsert,
        }
    }

    #[must_use]
    pub fn remove(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FsEventKind::Remove,
        }
    }
}

/// Map a raw notify event onto upsert/remove events, one per path.
#[must_use]
pub fn classify(event: Event) -> Vec<FsEvent> {
    match event.kind {
        EventKind::Create(_) | EventKind::Any => {
            event.paths.into_iter().map(FsEvent::upsert).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
            event.paths.into_iter().map(FsEvent::remove).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut out: Vec<FsEvent> = paths.next().map(FsEvent::remove).into_iter().collect();
            out.extend(paths.map(FsEvent::upsert));
            out
        }
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) | EventKind::Other => {
            Vec::new()
        }
        EventKind::Modify(_) => event.paths.into_iter().map(FsEvent::upsert).collect(),
    }
}

/// Recursive OS watcher on a workspace root. Dropping it stops event delivery.
pub struct WorkspaceWatcher {
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for WorkspaceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceWatcher").finish_non_exhaustive()
    }
}

impl WorkspaceWatcher {
    /// Start watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns [`crate::IndexError::Watcher`] if the watcher cannot be created or
    /// `root` cannot be watched.
    pub fn start(root: &Path) -> Result<(Self, mpsc::Receiver<FsEvent>)> {
        let (tx, rx) = mpsc::channel::<FsEvent>(CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("workspace watcher error: {e}");
                    return;
                }
            };
            for fs_event in classify(event) {
                if tx.blocking_send(fs_event).is_err() {
                    return;
                }
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "workspace watcher started");

        Ok((Self { _watcher: watcher }, rx))
    }
}
