//! Per-path mutual exclusion for local file preparation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of async locks keyed by local path.
///
/// Tasks targeting the same path serialize; disjoint paths never contend.
/// Entries are removed when the last holder or waiter lets go.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    inner: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

/// Held lock on one path. Dropping it releases the path.
#[derive(Debug)]
pub struct PathGuard {
    path: PathBuf,
    locks: PathLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PathLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `path`.
    pub async fn lock(&self, path: &Path) -> PathGuard {
        let mutex = Arc::clone(self.inner.entry(path.to_path_buf()).or_default().value());
        let guard = mutex.lock_owned().await;
        PathGuard {
            path: path.to_path_buf(),
            locks: self.clone(),
            guard: Some(guard),
        }
    }

    /// Number of paths currently locked or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true when no path is locked or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map itself still references the mutex: nobody is waiting.
        self.locks
            .inner
            .remove_if(&self.path, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
