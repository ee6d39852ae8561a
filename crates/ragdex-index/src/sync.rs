//! Keeps the index consistent with the workspace: full sync passes plus
//! debounced incremental updates driven by filesystem events.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::RagServiceConfig;
use crate::debounce::DebounceRegistry;
use crate::error::{IndexError, Result};
use crate::ignore_rules::IgnoreRules;
use crate::loader::{load_document, load_documents, walk_files};
use crate::manager::{IndexManager, is_chunk_of};
use crate::watcher::{FsEvent, FsEventKind, WorkspaceWatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Uninitialized,
    Initialized,
    Syncing,
    Watching,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Outcome of one full sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub generation: u64,
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub items_removed: usize,
    pub failed: Vec<FileFailure>,
    pub duration_ms: u64,
}

struct Components {
    manager: Arc<IndexManager>,
    rules: Arc<IgnoreRules>,
}

struct WatchHandle {
    _watcher: WorkspaceWatcher,
    task: JoinHandle<()>,
}

/// Clears a flag when dropped, so an early return cannot leave it set.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct IndexSyncService {
    config: RagServiceConfig,
    components: OnceLock<Components>,
    init_lock: tokio::sync::Mutex<()>,
    /// Serializes every mutation of the index issued by this service.
    apply_lock: tokio::sync::Mutex<()>,
    syncing: AtomicBool,
    stopped: AtomicBool,
    generation: AtomicU64,
    debounce: DebounceRegistry,
    watch: Mutex<Option<WatchHandle>>,
}

impl std::fmt::Debug for IndexSyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSyncService")
            .field("workspace_root", &self.config.workspace_root)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn join_error(e: &tokio::task::JoinError) -> IndexError {
    IndexError::Other(format!("blocking task failed: {e}"))
}

impl IndexSyncService {
    #[must_use]
    pub fn new(config: RagServiceConfig) -> Self {
        let debounce = DebounceRegistry::new(Duration::from_millis(config.sync.debounce_ms));
        Self {
            config,
            components: OnceLock::new(),
            init_lock: tokio::sync::Mutex::new(()),
            apply_lock: tokio::sync::Mutex::new(()),
            syncing: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            debounce,
            watch: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RagServiceConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        if self.components.get().is_none() {
            SyncState::Uninitialized
        } else if self.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else if self.is_watching() {
            SyncState::Watching
        } else if self.stopped.load(Ordering::Acquire) {
            SyncState::Stopped
        } else {
            SyncState::Initialized
        }
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .map(|w| w.is_some())
            .unwrap_or(false)
    }

    /// The index manager, once initialized.
    #[must_use]
    pub fn manager(&self) -> Option<Arc<IndexManager>> {
        self.components.get().map(|c| Arc::clone(&c.manager))
    }

    fn components(&self) -> Result<&Components> {
        self.components.get().ok_or(IndexError::NotInitialized)
    }

    /// Validate configuration and build the index manager and ignore rules.
    /// A second call logs a warning and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] for invalid configuration or an unreachable
    /// backend, and [`IndexError::Io`] when the workspace root cannot be resolved.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.components.get().is_some() {
            tracing::warn!("index sync service already initialized");
            return Ok(());
        }
        self.config.validate()?;
        let manager = IndexManager::new(&self.config.rag).await?;
        self.install(Arc::new(manager))
    }

    /// Initialize with an existing manager instead of building one from config.
    ///
    /// # Errors
    ///
    /// As [`Self::initialize`], minus backend construction.
    pub async fn initialize_with(&self, manager: Arc<IndexManager>) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.components.get().is_some() {
            tracing::warn!("index sync service already initialized");
            return Ok(());
        }
        self.config.validate()?;
        self.install(manager)
    }

    fn install(&self, manager: Arc<IndexManager>) -> Result<()> {
        let rules = IgnoreRules::new(
            &self.config.workspace_root,
            &self.config.sync,
            self.config.rag.vector_store.storage_dir().map(PathBuf::as_path),
        )?;
        tracing::info!(
            root = %rules.root().display(),
            manager = ?manager,
            "index sync service initialized"
        );
        let _ = self.components.set(Components {
            manager,
            rules: Arc::new(rules),
        });
        Ok(())
    }

    /// Run one full sync pass. Returns `Ok(None)` when another pass is already
    /// running.
    ///
    /// Documents that fail to index keep their previously stored chunks. Items whose
    /// source file is gone are deleted.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotInitialized`] before [`Self::initialize`], and aborts
    /// with the backend error when the vector store fails.
    pub async fn sync_workspace_index(&self) -> Result<Option<SyncReport>> {
        let components = self.components()?;
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("workspace sync already running, skipping");
            return Ok(None);
        }
        let _flag = FlagGuard(&self.syncing);
        let _apply = self.apply_lock.lock().await;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let started = Instant::now();
        tracing::info!(generation, "workspace sync started");

        let rules = Arc::clone(&components.rules);
        let max_file_size = self.config.sync.max_file_size;
        let documents = tokio::task::spawn_blocking(move || load_documents(&rules, max_file_size))
            .await
            .map_err(|e| join_error(&e))??;

        let manager = &components.manager;
        let existing: HashSet<String> = manager.get_all_ids().await?.into_iter().collect();
        let options = self.config.chunking.options();

        let mut report = SyncReport {
            generation,
            files_scanned: documents.len(),
            ..SyncReport::default()
        };
        let mut keep: HashSet<String> = HashSet::with_capacity(existing.len());

        for document in &documents {
            match manager.index_document(document, &options).await {
                Ok(ids) => {
                    if !ids.is_empty() {
                        report.files_indexed += 1;
                    }
                    report.chunks_indexed += ids.len();
                    keep.extend(ids);
                }
                Err(e) if e.is_backend() => {
                    tracing::error!(generation, "workspace sync aborted: {e}");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(file = %document.id, "failed to index document: {e}");
                    keep.extend(
                        existing
                            .iter()
                            .filter(|id| is_chunk_of(id, &document.id))
                            .cloned(),
                    );
                    report.failed.push(FileFailure {
                        file: document.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut stale: Vec<String> = existing.difference(&keep).cloned().collect();
        stale.sort();
        report.items_removed = stale.len();
        manager.delete_items(stale).await?;

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            generation,
            files = report.files_indexed,
            chunks = report.chunks_indexed,
            removed = report.items_removed,
            failed = report.failed.len(),
            duration_ms = report.duration_ms,
            "workspace sync finished"
        );
        Ok(Some(report))
    }

    /// Start the filesystem watcher. Returns `Ok(false)` when watching is disabled
    /// by configuration or the service is not initialized.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Watcher`] if the OS watcher cannot be started.
    pub fn start_watching(self: &Arc<Self>) -> Result<bool> {
        if !self.config.sync.auto_watch {
            tracing::info!("auto_watch disabled, not watching workspace");
            return Ok(false);
        }
        let Ok(components) = self.components() else {
            tracing::warn!("cannot watch workspace before initialization");
            return Ok(false);
        };

        let mut slot = self
            .watch
            .lock()
            .map_err(|_| IndexError::Other("watch state poisoned".into()))?;
        if slot.is_some() {
            return Ok(true);
        }

        let (watcher, rx) = WorkspaceWatcher::start(components.rules.root())?;
        let task = tokio::spawn(Arc::clone(self).event_loop(rx));
        *slot = Some(WatchHandle {
            _watcher: watcher,
            task,
        });
        self.stopped.store(false, Ordering::Release);
        tracing::info!(root = %components.rules.root().display(), "watching workspace");
        Ok(true)
    }

    /// Stop the watcher and cancel pending debounced updates. Idempotent; an
    /// in-flight sync pass runs to completion.
    pub fn stop_watching(&self) {
        let handle = self.watch.lock().ok().and_then(|mut slot| slot.take());
        self.debounce.cancel_all();
        if let Some(handle) = handle {
            handle.task.abort();
            tracing::info!("stopped watching workspace");
        }
        if self.components.get().is_some() {
            self.stopped.store(true, Ordering::Release);
        }
    }

    async fn event_loop(self: Arc<Self>, mut rx: mpsc::Receiver<FsEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
    }

    /// Apply one filesystem event. Changes are debounced per path; removals are
    /// applied immediately. Events are dropped while a full sync runs.
    ///
    /// A directory that appears schedules every admitted file below it; a path
    /// that disappears takes any files below it along with it.
    pub async fn handle_event(self: &Arc<Self>, event: FsEvent) {
        let Ok(components) = self.components() else {
            return;
        };
        if self.syncing.load(Ordering::Acquire) {
            tracing::debug!(path = %event.path.display(), "sync in progress, dropping event");
            return;
        }
        let is_dir = event.path.is_dir();
        if components.rules.is_ignored(&event.path, is_dir) {
            return;
        }

        match event.kind {
            FsEventKind::Upsert if is_dir => {
                let rules = Arc::clone(&components.rules);
                let dir = event.path.clone();
                let walk = tokio::task::spawn_blocking(move || walk_files(&rules, &dir));
                let files = match walk.await {
                    Ok(files) => files,
                    Err(e) => {
                        tracing::warn!(path = %event.path.display(), "directory walk failed: {e}");
                        return;
                    }
                };
                tracing::debug!(
                    path = %event.path.display(),
                    files = files.len(),
                    "directory appeared"
                );
                for file in files {
                    self.schedule_reindex(file);
                }
            }
            FsEventKind::Upsert => self.schedule_reindex(event.path),
            FsEventKind::Remove => {
                self.debounce.cancel_under(&event.path);
                if let Err(e) = self.remove_file(&event.path).await {
                    tracing::warn!(path = %event.path.display(), "remove failed: {e}");
                }
            }
        }
    }

    fn schedule_reindex(self: &Arc<Self>, path: PathBuf) {
        let service = Arc::clone(self);
        let target = path.clone();
        self.debounce.schedule(path, async move {
            if service.syncing.load(Ordering::Acquire) {
                tracing::debug!(path = %target.display(), "sync in progress, dropping update");
                return;
            }
            if let Err(e) = service.reindex_file(&target).await {
                tracing::warn!(path = %target.display(), "reindex failed: {e}");
            }
        });
    }

    fn resolve(&self, components: &Components, path: &Path) -> Result<(PathBuf, String)> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            components.rules.root().join(path)
        };
        let rel = components.rules.relative(&abs).ok_or_else(|| {
            IndexError::Other(format!(
                "{} is outside the workspace {}",
                path.display(),
                self.config.workspace_root.display()
            ))
        })?;
        Ok((abs, rel))
    }

    /// Re-index one file and drop its chunks beyond the new chunk count. A file
    /// that vanished, or is now skipped by size or encoding, loses all its chunks.
    /// Returns the number of chunks written.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotInitialized`] before initialization, otherwise any
    /// read, embedding or backend error.
    pub async fn reindex_file(&self, path: &Path) -> Result<usize> {
        let components = self.components()?;
        let (abs, rel) = self.resolve(components, path)?;
        let _apply = self.apply_lock.lock().await;

        let rules = Arc::clone(&components.rules);
        let max_file_size = self.config.sync.max_file_size;
        let loaded = tokio::task::spawn_blocking(move || load_document(&rules, &abs, max_file_size))
            .await
            .map_err(|e| join_error(&e))?;

        let manager = &components.manager;
        let document = match loaded {
            Ok(Some(document)) => document,
            Ok(None) => {
                manager.prune_file(&rel, 0).await?;
                return Ok(0);
            }
            Err(IndexError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                manager.prune_file(&rel, 0).await?;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let ids = manager
            .index_document(&document, &self.config.chunking.options())
            .await?;
        manager.prune_file(&rel, ids.len()).await?;
        tracing::debug!(file = %rel, chunks = ids.len(), "reindexed file");
        Ok(ids.len())
    }

    /// Delete every chunk of a removed path. The path may have been a directory,
    /// so chunks of files below it go too.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotInitialized`] before initialization, or the backend
    /// error.
    pub async fn remove_file(&self, path: &Path) -> Result<()> {
        let components = self.components()?;
        let (_, rel) = self.resolve(components, path)?;
        let _apply = self.apply_lock.lock().await;
        let criteria = HashMap::from([("file_path".to_owned(), serde_json::Value::from(rel.clone()))]);
        components.manager.delete_where(&criteria).await?;
        let nested = components.manager.delete_under(&rel).await?;
        tracing::debug!(path = %rel, nested, "removed path from index");
        Ok(())
    }
}

impl Drop for IndexSyncService {
    fn drop(&mut self) {
        if let Ok(slot) = self.watch.get_mut()
            && let Some(handle) = slot.take()
        {
            handle.task.abort();
        }
    }
}
