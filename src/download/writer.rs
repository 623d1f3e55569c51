//! Resumable, size-checked file writer.
//!
//! [`Downloader`] maps a regular-file descriptor onto a path under the mirror
//! root and brings the local copy in line with the remote one: resuming a
//! shorter file, leaving a complete one alone, and stamping the remote
//! modification time onto the result.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use filetime::FileTime;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::connection::{Connection, Connector, ResumableStream, Segment};
use super::constants::COPY_BUFFER_SIZE;
use super::error::DownloadError;
use super::locks::PathLocks;
use crate::descriptor::ResourceDescriptor;

/// What a download did to the local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Bytes were transferred.
    Saved {
        /// Local file.
        path: PathBuf,
        /// Bytes written during this call.
        bytes: u64,
        /// Offset the transfer started at; zero for a fresh download.
        resumed_from: u64,
    },
    /// The local file already had the declared size; only its timestamp was checked.
    Unchanged {
        /// Local file.
        path: PathBuf,
    },
    /// The local file is larger than the remote declares and was left as is.
    Inconsistent {
        /// Local file.
        path: PathBuf,
        /// Size on disk.
        local: u64,
        /// Declared remote size.
        remote: u64,
    },
}

impl DownloadOutcome {
    /// Local file the outcome refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Saved { path, .. } | Self::Unchanged { path } | Self::Inconsistent { path, .. } => {
                path
            }
        }
    }

    /// Consumes the outcome, returning the local file.
    #[must_use]
    pub fn into_path(self) -> PathBuf {
        match self {
            Self::Saved { path, .. } | Self::Unchanged { path } | Self::Inconsistent { path, .. } => {
                path
            }
        }
    }
}

/// Writes remote files beneath a local root.
#[derive(Debug, Clone)]
pub struct Downloader {
    root: PathBuf,
    locks: PathLocks,
}

impl Downloader {
    /// Creates a downloader writing beneath `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: PathLocks::new(),
        }
    }

    /// Mirror root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path a descriptor maps to.
    #[must_use]
    pub fn local_path(&self, descriptor: &ResourceDescriptor) -> PathBuf {
        self.root.join(descriptor.relative_path())
    }

    /// Brings the local copy of `descriptor` up to date.
    ///
    /// `initial` is an already-open, unranged connection to the resource; it
    /// is used when the transfer starts from zero and dropped otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] when the descriptor lacks size or timestamp,
    /// when the local tree conflicts with the remote one, or when the
    /// transfer fails. A failed transfer removes the partial file.
    #[instrument(skip(self, descriptor, connector, initial), fields(url = %descriptor.uri()))]
    pub async fn download(
        &self,
        descriptor: &ResourceDescriptor,
        connector: &dyn Connector,
        initial: Option<Connection>,
    ) -> Result<DownloadOutcome, DownloadError> {
        let url = descriptor.uri();
        let expected = descriptor
            .size()
            .ok_or_else(|| DownloadError::missing_metadata(url.as_str(), "no declared size"))?;
        let modified = descriptor
            .last_modified()
            .ok_or_else(|| DownloadError::missing_metadata(url.as_str(), "no modification time"))?;

        let relative = descriptor.relative_path();
        if relative.as_os_str().is_empty() {
            return Err(DownloadError::conflict(
                &self.root,
                "resource maps onto the mirror root",
            ));
        }
        let path = self.root.join(relative);

        let _guard = self.locks.lock(&path).await;
        prepare_parent(&path).await?;

        let offset = match local_size(&path).await? {
            None => 0,
            Some(local) if local < expected => {
                info!(path = %path.display(), local, expected, "resuming partial file");
                local
            }
            Some(local) if local == expected => {
                set_modified(&path, modified).await?;
                debug!(path = %path.display(), "already complete");
                return Ok(DownloadOutcome::Unchanged { path });
            }
            Some(local) => {
                let mismatch = DownloadError::size_mismatch(&path, expected, local);
                warn!(error = %mismatch, "leaving local file untouched");
                return Ok(DownloadOutcome::Inconsistent {
                    path,
                    local,
                    remote: expected,
                });
            }
        };

        let initial = initial.filter(|_| offset == 0);
        let transfer = match copy_to_file(url, &path, offset, expected, connector, initial).await {
            Ok(transfer) => transfer,
            Err(error) => {
                discard_partial(&path).await;
                return Err(error);
            }
        };
        if let Err(error) = set_modified(&path, modified).await {
            discard_partial(&path).await;
            return Err(error);
        }

        info!(
            path = %path.display(),
            bytes = transfer.written,
            resumed_from = transfer.start,
            "saved"
        );
        Ok(DownloadOutcome::Saved {
            path,
            bytes: transfer.written,
            resumed_from: transfer.start,
        })
    }
}

struct Transfer {
    start: u64,
    written: u64,
}

async fn copy_to_file(
    url: &Url,
    path: &Path,
    offset: u64,
    expected: u64,
    connector: &dyn Connector,
    initial: Option<Connection>,
) -> Result<Transfer, DownloadError> {
    let mut stream = match initial {
        Some(connection) => ResumableStream::with_connection(connector, url, connection, expected),
        None => ResumableStream::new(connector, url, offset, expected),
    };

    // Append mode keeps writes at the end even after a truncation.
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    if offset == 0 {
        file.set_len(0).await.map_err(|e| DownloadError::io(path, e))?;
    }
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);

    let mut start = offset;
    let mut written = 0u64;
    while let Some(segment) = stream.next_segment().await? {
        match segment {
            Segment::Data(chunk) => {
                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|e| DownloadError::io(path, e))?;
                written += chunk.len() as u64;
            }
            Segment::Restart => {
                writer.flush().await.map_err(|e| DownloadError::io(path, e))?;
                writer
                    .get_ref()
                    .set_len(0)
                    .await
                    .map_err(|e| DownloadError::io(path, e))?;
                start = 0;
                written = 0;
            }
        }
    }
    writer.flush().await.map_err(|e| DownloadError::io(path, e))?;
    let file: File = writer.into_inner();
    file.sync_all().await.map_err(|e| DownloadError::io(path, e))?;
    drop(file);

    let actual = local_size(path).await?.unwrap_or(0);
    if actual != expected {
        return Err(DownloadError::integrity(path, expected, actual));
    }
    Ok(Transfer { start, written })
}

/// Creates the parent directory chain, refusing to replace a file.
async fn prepare_parent(path: &Path) -> Result<(), DownloadError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    match tokio::fs::metadata(parent).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(DownloadError::conflict(
            parent,
            "a file occupies the directory name",
        )),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))
        }
        Err(error) => Err(DownloadError::io(parent, error)),
    }
}

/// Size of the regular file at `path`, `None` when nothing is there.
async fn local_size(path: &Path) -> Result<Option<u64>, DownloadError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
        Ok(_) => Err(DownloadError::conflict(path, "not a regular file")),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(DownloadError::io(path, error)),
    }
}

/// Sets the file's modification time to `modified` (UTC, whole seconds) if it differs.
async fn set_modified(path: &Path, modified: NaiveDateTime) -> Result<(), DownloadError> {
    let target = FileTime::from_unix_time(modified.and_utc().timestamp(), 0);
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    if FileTime::from_last_modification_time(&metadata).unix_seconds() == target.unix_seconds() {
        return Ok(());
    }

    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || filetime::set_file_mtime(&owned, target))
        .await
        .map_err(|e| DownloadError::io(path, std::io::Error::other(e)))?
        .map_err(|e| DownloadError::io(path, e))
}

async fn discard_partial(path: &Path) {
    let is_file = tokio::fs::symlink_metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file());
    if is_file && let Err(error) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %error, "could not remove partial file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::download::connection::tests::MemoryConnector;

    const BODY: &[u8] = b"The quick brown fox jumps over the lazy dog";

    fn modified() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 11, 5)
            .unwrap()
            .and_hms_opt(12, 45, 0)
            .unwrap()
    }

    fn file_descriptor(path: &str, size: u64) -> ResourceDescriptor {
        ResourceDescriptor::builder(Url::parse(&format!("http://localhost{path}")).unwrap())
            .size(size)
            .last_modified(modified())
            .build()
            .unwrap()
    }

    fn mtime_secs(path: &Path) -> i64 {
        let metadata = std::fs::metadata(path).unwrap();
        FileTime::from_last_modification_time(&metadata).unix_seconds()
    }

    #[tokio::test]
    async fn test_fresh_download_writes_file_and_mtime() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let connector = MemoryConnector::new(BODY);
        let descriptor = file_descriptor("/deliver/a/file.txt", BODY.len() as u64);

        let outcome = downloader.download(&descriptor, &connector, None).await.unwrap();

        let expected_path = dir.path().join("deliver/a/file.txt");
        assert_eq!(
            outcome,
            DownloadOutcome::Saved {
                path: expected_path.clone(),
                bytes: BODY.len() as u64,
                resumed_from: 0,
            }
        );
        assert_eq!(std::fs::read(&expected_path).unwrap(), BODY);
        assert_eq!(mtime_secs(&expected_path), modified().and_utc().timestamp());
    }

    #[tokio::test]
    async fn test_resumes_partial_file_from_local_size() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let target = dir.path().join("f.bin");
        std::fs::write(&target, &BODY[..10]).unwrap();

        let connector = MemoryConnector::new(BODY);
        let descriptor = file_descriptor("/f.bin", BODY.len() as u64);
        let outcome = downloader.download(&descriptor, &connector, None).await.unwrap();

        assert_eq!(connector.offsets(), vec![10]);
        assert!(matches!(outcome, DownloadOutcome::Saved { resumed_from: 10, .. }));
        assert_eq!(std::fs::read(&target).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_survives_mid_stream_disconnect() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let connector = MemoryConnector::new(BODY).with_cutoffs(&[12]);
        let descriptor = file_descriptor("/f.bin", BODY.len() as u64);

        downloader.download(&descriptor, &connector, None).await.unwrap();

        assert_eq!(connector.offsets(), vec![0, 12]);
        assert_eq!(std::fs::read(dir.path().join("f.bin")).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_second_run_does_no_network_io() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let descriptor = file_descriptor("/f.bin", BODY.len() as u64);

        let first = MemoryConnector::new(BODY);
        downloader.download(&descriptor, &first, None).await.unwrap();
        let before = std::fs::read(dir.path().join("f.bin")).unwrap();

        let second = MemoryConnector::new(BODY);
        let outcome = downloader.download(&descriptor, &second, None).await.unwrap();

        assert!(second.offsets().is_empty());
        assert!(matches!(outcome, DownloadOutcome::Unchanged { .. }));
        assert_eq!(std::fs::read(dir.path().join("f.bin")).unwrap(), before);
    }

    #[tokio::test]
    async fn test_complete_file_gets_timestamp_normalized() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let target = dir.path().join("f.bin");
        std::fs::write(&target, BODY).unwrap();
        assert_ne!(mtime_secs(&target), modified().and_utc().timestamp());

        let connector = MemoryConnector::new(BODY);
        let descriptor = file_descriptor("/f.bin", BODY.len() as u64);
        downloader.download(&descriptor, &connector, None).await.unwrap();

        assert!(connector.offsets().is_empty());
        assert_eq!(mtime_secs(&target), modified().and_utc().timestamp());
    }

    #[tokio::test]
    async fn test_larger_local_file_left_untouched() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let target = dir.path().join("f.bin");
        std::fs::write(&target, b"this local file is longer than the remote").unwrap();

        let connector = MemoryConnector::new(b"short");
        let descriptor = file_descriptor("/f.bin", 5);
        let outcome = downloader.download(&descriptor, &connector, None).await.unwrap();

        assert!(matches!(outcome, DownloadOutcome::Inconsistent { remote: 5, .. }));
        assert_eq!(outcome.path(), target);
        assert!(connector.offsets().is_empty());
        assert_eq!(
            std::fs::read(&target).unwrap(),
            b"this local file is longer than the remote"
        );
    }

    #[tokio::test]
    async fn test_file_in_place_of_parent_directory_is_conflict() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        std::fs::write(dir.path().join("deliver"), b"not a directory").unwrap();

        let connector = MemoryConnector::new(BODY);
        let descriptor = file_descriptor("/deliver/f.bin", BODY.len() as u64);
        let error = downloader.download(&descriptor, &connector, None).await.unwrap_err();

        assert!(matches!(error, DownloadError::FilesystemConflict { .. }));
        assert!(connector.offsets().is_empty());
        assert_eq!(std::fs::read(dir.path().join("deliver")).unwrap(), b"not a directory");
    }

    #[tokio::test]
    async fn test_directory_in_place_of_file_is_conflict() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        std::fs::create_dir(dir.path().join("f.bin")).unwrap();

        let connector = MemoryConnector::new(BODY);
        let descriptor = file_descriptor("/f.bin", BODY.len() as u64);
        let error = downloader.download(&descriptor, &connector, None).await.unwrap_err();

        assert!(matches!(error, DownloadError::FilesystemConflict { .. }));
        assert!(dir.path().join("f.bin").is_dir());
    }

    #[tokio::test]
    async fn test_exhausted_stream_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let connector = MemoryConnector::new(BODY).with_cutoffs(&[8, 0]);
        let descriptor = file_descriptor("/f.bin", BODY.len() as u64);

        let error = downloader.download(&descriptor, &connector, None).await.unwrap_err();

        assert!(matches!(error, DownloadError::Truncated { received: 8, .. }));
        assert!(!dir.path().join("f.bin").exists());
    }

    #[tokio::test]
    async fn test_ignored_range_restarts_from_zero() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let target = dir.path().join("f.bin");
        std::fs::write(&target, &BODY[..10]).unwrap();

        let connector = MemoryConnector::new(BODY).ignoring_ranges();
        let descriptor = file_descriptor("/f.bin", BODY.len() as u64);
        let outcome = downloader.download(&descriptor, &connector, None).await.unwrap();

        assert!(matches!(outcome, DownloadOutcome::Saved { resumed_from: 0, .. }));
        assert_eq!(std::fs::read(&target).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_uses_initial_connection_for_fresh_download() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let connector = MemoryConnector::new(BODY);
        let url = Url::parse("http://localhost/f.bin").unwrap();
        let initial = connector.open(&url, 0).await.unwrap();
        let descriptor = file_descriptor("/f.bin", BODY.len() as u64);

        downloader
            .download(&descriptor, &connector, Some(initial))
            .await
            .unwrap();

        assert_eq!(connector.offsets(), vec![0], "no second connection expected");
        assert_eq!(std::fs::read(dir.path().join("f.bin")).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_directory_descriptor_is_rejected() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let connector = MemoryConnector::new(BODY);
        let descriptor =
            ResourceDescriptor::directory(Url::parse("http://localhost/deliver/").unwrap()).unwrap();

        let error = downloader.download(&descriptor, &connector, None).await.unwrap_err();
        assert!(matches!(error, DownloadError::MissingMetadata { .. }));
    }

    #[tokio::test]
    async fn test_zero_length_file() {
        let dir = TempDir::new().unwrap();
        let downloader = Downloader::new(dir.path());
        let connector = MemoryConnector::new(b"");
        let descriptor = file_descriptor("/empty.txt", 0);

        let outcome = downloader.download(&descriptor, &connector, None).await.unwrap();

        assert!(matches!(outcome, DownloadOutcome::Saved { bytes: 0, .. }));
        assert_eq!(std::fs::metadata(dir.path().join("empty.txt")).unwrap().len(), 0);
    }
}
