//! Per-path trailing-edge debounce: only the last event in a quiet window fires.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

type Timers = Arc<Mutex<HashMap<PathBuf, Timer>>>;

fn lock(timers: &Timers) -> MutexGuard<'_, HashMap<PathBuf, Timer>> {
    timers
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub struct DebounceRegistry {
    delay: Duration,
    timers: Timers,
    next_id: AtomicU64,
}

impl std::fmt::Debug for DebounceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceRegistry")
            .field("delay", &self.delay)
            .field("pending", &self.pending())
            .finish()
    }
}

impl DebounceRegistry {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers: Arc::default(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `action` once `delay` has passed without another `schedule` for `path`.
    ///
    /// A newer schedule for the same path replaces the pending one. Once the delay
    /// elapses the action runs on its own task and is no longer cancellable.
    pub fn schedule<F>(&self, path: PathBuf, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let delay = self.delay;
        let key = path.clone();

        let mut map = lock(&self.timers);
        if let Some(prev) = map.remove(&path) {
            prev.handle.abort();
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut map = lock(&timers);
                if map.get(&key).is_some_and(|t| t.id == id) {
                    map.remove(&key);
                    true
                } else {
                    false
                }
            };
            if current {
                tokio::spawn(action);
            }
        });
        map.insert(path, Timer { id, handle });
    }

    /// Drop every pending timer for `dir` and paths below it. Returns how many
    /// were pending.
    pub fn cancel_under(&self, dir: &Path) -> usize {
        let mut map = lock(&self.timers);
        let doomed: Vec<PathBuf> = map.keys().filter(|p| p.starts_with(dir)).cloned().collect();
        for path in &doomed {
            if let Some(timer) = map.remove(path) {
                timer.handle.abort();
            }
        }
        doomed.len()
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Drop for DebounceRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
