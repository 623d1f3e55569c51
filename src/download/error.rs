//! Error types for the download module.
//!
//! Every variant carries the URL or local path it concerns so a failure can be
//! reported on its own, away from the task that produced it.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching a resource or writing it to disk.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS, broken body stream).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL being fetched.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Transport failure reported by a non-HTTP connector.
    #[error("transport error fetching {url}: {message}")]
    Transport {
        /// The URL being fetched.
        url: String,
        /// Human-readable cause.
        message: String,
    },

    /// The remote stream kept ending before the declared length was reached.
    #[error("stream for {url} ended at {received} of {expected} bytes")]
    Truncated {
        /// The URL being fetched.
        url: String,
        /// Bytes on disk when the stream gave up.
        received: u64,
        /// Declared size.
        expected: u64,
    },

    /// File system error while creating, writing, or inspecting a local file.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A directory was expected where a file exists, or the other way round.
    #[error("filesystem conflict at {path}: {reason}")]
    FilesystemConflict {
        /// The conflicting path.
        path: PathBuf,
        /// What was found instead of what was expected.
        reason: &'static str,
    },

    /// Local file is larger than the declared remote size.
    #[error("size mismatch for {path}: remote declares {expected} bytes, local has {actual}")]
    SizeMismatch {
        /// Local file.
        path: PathBuf,
        /// Declared remote size.
        expected: u64,
        /// Size on disk.
        actual: u64,
    },

    /// Written file size does not match the declared size after the copy.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Download path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// Listing content could not be used.
    #[error("malformed listing at {url}: {reason}")]
    MalformedListing {
        /// Listing URL.
        url: String,
        /// Why the content was rejected.
        reason: String,
    },

    /// The descriptor lacks the size or timestamp a download needs.
    #[error("cannot download {url}: {reason}")]
    MissingMetadata {
        /// Resource URL.
        url: String,
        /// Which field is missing.
        reason: &'static str,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a transport error for connectors that are not backed by reqwest.
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a truncated-stream error.
    pub fn truncated(url: impl Into<String>, received: u64, expected: u64) -> Self {
        Self::Truncated {
            url: url.into(),
            received,
            expected,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a filesystem conflict error.
    pub fn conflict(path: impl Into<PathBuf>, reason: &'static str) -> Self {
        Self::FilesystemConflict {
            path: path.into(),
            reason,
        }
    }

    /// Creates a size mismatch error.
    pub fn size_mismatch(path: impl Into<PathBuf>, expected: u64, actual: u64) -> Self {
        Self::SizeMismatch {
            path: path.into(),
            expected,
            actual,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a malformed listing error.
    pub fn malformed_listing(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedListing {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing-metadata error.
    pub fn missing_metadata(url: impl Into<String>, reason: &'static str) -> Self {
        Self::MissingMetadata {
            url: url.into(),
            reason,
        }
    }

    /// Returns true for failures of the remote side or the network path to it.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::HttpStatus { .. }
                | Self::Transport { .. }
                | Self::Truncated { .. }
        )
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// URL or path, which the source errors do not carry.
