//! Consumers of expired version paths.
//!
//! Each directory listing delivers its superseded version directories as
//! local paths, once, right after the listing is resolved. Delivery can
//! happen from many tasks at the same time.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Receives expired local paths.
///
/// Implemented for any `Fn(Vec<PathBuf>) + Send + Sync` closure.
pub trait ExpirySink: Send + Sync {
    /// Handles one listing's expired paths. Never called with an empty list.
    fn expired(&self, paths: Vec<PathBuf>);
}

impl<F> ExpirySink for F
where
    F: Fn(Vec<PathBuf>) + Send + Sync,
{
    fn expired(&self, paths: Vec<PathBuf>) {
        self(paths);
    }
}

/// Deletes expired paths recursively, best-effort.
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneExpired;

impl ExpirySink for PruneExpired {
    fn expired(&self, mut paths: Vec<PathBuf>) {
        paths.sort();
        for path in paths {
            prune(&path);
        }
    }
}

fn prune(path: &Path) {
    let result = match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "expired path not mirrored locally");
            return;
        }
        Err(error) => Err(error),
    };
    match result {
        Ok(()) => info!(path = %path.display(), "pruned expired version"),
        Err(error) => warn!(path = %path.display(), error = %error, "failed to prune expired version"),
    }
}

/// Logs expired paths and leaves them on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportExpired;

impl ExpirySink for ReportExpired {
    fn expired(&self, mut paths: Vec<PathBuf>) {
        paths.sort();
        for path in paths {
            info!(path = %path.display(), "expired version kept");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_prune_removes_directories_and_files() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("doc/16.00.00_60");
        std::fs::create_dir_all(old.join("nested")).unwrap();
        std::fs::write(old.join("nested/a.pdf"), b"x").unwrap();
        let stray = dir.path().join("doc/15.00.00_60");
        std::fs::write(&stray, b"file where a directory used to be").unwrap();
        let current = dir.path().join("doc/17.00.00_60");
        std::fs::create_dir_all(&current).unwrap();

        PruneExpired.expired(vec![old.clone(), stray.clone()]);

        assert!(!old.exists());
        assert!(!stray.exists());
        assert!(current.exists());
    }

    #[test]
    fn test_prune_ignores_missing_paths() {
        let dir = TempDir::new().unwrap();
        PruneExpired.expired(vec![dir.path().join("never/mirrored")]);
        assert!(dir.path().exists());
    }

    #[test]
    fn test_report_keeps_paths() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("16.00.00_60");
        std::fs::create_dir(&old).unwrap();
        ReportExpired.expired(vec![old.clone()]);
        assert!(old.exists());
    }

    #[test]
    fn test_closure_sink_receives_paths() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |paths: Vec<PathBuf>| seen.lock().unwrap().extend(paths)
        };
        sink.expired(vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(*seen.lock().unwrap(), vec![PathBuf::from("a"), PathBuf::from("b")]);
    }
}
