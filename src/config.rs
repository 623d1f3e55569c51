//! Mirror configuration.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use url::Url;

use crate::crawl::{CrawlError, DEFAULT_IGNORED_SUFFIXES, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Remote tree mirrored when none is given.
pub const DEFAULT_ROOT_URI: &str = "https://www.etsi.org/deliver/";

/// Default bound on in-flight fetches.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Everything a crawl needs besides the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Local directory the remote tree is mirrored into.
    pub destination: PathBuf,
    /// Root of the remote tree.
    pub root_uri: String,
    /// Runtime worker threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
    /// Maximum number of fetches in flight.
    pub concurrency: usize,
    /// File name suffixes that are never downloaded.
    pub ignored_suffixes: Vec<String>,
    /// Delete superseded version directories (otherwise only report them).
    pub prune_expired: bool,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("."),
            root_uri: DEFAULT_ROOT_URI.to_string(),
            workers: None,
            concurrency: DEFAULT_CONCURRENCY,
            ignored_suffixes: DEFAULT_IGNORED_SUFFIXES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            prune_expired: true,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl MirrorConfig {
    /// Checks value ranges and the root URI.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] for a concurrency outside 1-100, a zero worker
    /// count, or an unparsable root URI.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(CrawlError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        if self.workers == Some(0) {
            return Err(CrawlError::InvalidWorkers);
        }
        self.root_url().map(|_| ())
    }

    /// Parses the root URI.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidRootUri`] when the URI does not parse.
    pub fn root_url(&self) -> Result<Url, CrawlError> {
        Url::parse(&self.root_uri).map_err(|source| CrawlError::InvalidRootUri {
            uri: self.root_uri.clone(),
            source,
        })
    }

    /// Worker thread count to build the runtime with.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        })
    }
}
