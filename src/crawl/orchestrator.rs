//! Recursive, concurrent crawl over a remote directory tree.
//!
//! Every node moves through [`NodeState`]s. A directory fetches its listing,
//! resolves versions, hands the expired paths to the [`ExpirySink`] and
//! spawns one task per kept child. A file goes to the [`Downloader`].
//! Failures stay with the node that produced them.
//!
//! # Concurrency Model
//!
//! - Each child runs in its own Tokio task, joined through a `JoinSet`
//! - A semaphore permit is held for the duration of one fetch or one file
//!   write, never across a join, so deep trees cannot starve themselves
//! - Local paths are serialized by the downloader's path locks

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use super::dispatch::{Dispatch, Dispatcher};
use super::error::{CrawlError, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::expiry::{ExpirySink, PruneExpired, ReportExpired};
use crate::config::MirrorConfig;
use crate::descriptor::ResourceDescriptor;
use crate::download::{Connection, Connector, DownloadError, DownloadOutcome, Downloader, HttpConnector};
use crate::listing::{Resolution, parse_listing_with_charset, resolve_versions};

/// Lifecycle stage of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Dispatched, waiting for its task to run.
    Pending,
    /// Opening the remote resource.
    Fetching,
    /// Parsing and resolving a listing.
    Parsing,
    /// Writing a file to disk.
    Writing,
    /// Finished, with or without output.
    Done,
    /// Gave up; contributes nothing.
    Failed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters updated concurrently by crawl tasks.
#[derive(Debug, Default)]
pub struct CrawlStats {
    listings: AtomicUsize,
    saved: AtomicUsize,
    unchanged: AtomicUsize,
    inconsistent: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    expired: AtomicUsize,
}

impl CrawlStats {
    /// Listings fetched and parsed.
    #[must_use]
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    /// Files that received bytes.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    /// Files already complete locally.
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.unchanged.load(Ordering::SeqCst)
    }

    /// Local files larger than the remote declares.
    #[must_use]
    pub fn inconsistent(&self) -> usize {
        self.inconsistent.load(Ordering::SeqCst)
    }

    /// Files skipped by suffix.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Nodes that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Expired paths delivered to the sink.
    #[must_use]
    pub fn expired(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }

    fn record(&self, outcome: &DownloadOutcome) {
        let counter = match outcome {
            DownloadOutcome::Saved { .. } => &self.saved,
            DownloadOutcome::Unchanged { .. } => &self.unchanged,
            DownloadOutcome::Inconsistent { .. } => &self.inconsistent,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn bump(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::SeqCst);
    }
}

/// Result of one crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    /// Root URI crawled.
    pub root: String,
    /// Local destination root.
    pub destination: PathBuf,
    /// Local paths of every mirrored file, sorted.
    pub files: Vec<PathBuf>,
    /// Listings fetched and parsed.
    pub listings: usize,
    /// Files that received bytes.
    pub saved: usize,
    /// Files already complete locally.
    pub unchanged: usize,
    /// Local files left alone because they are larger than the remote.
    pub inconsistent: usize,
    /// Files skipped by suffix.
    pub skipped: usize,
    /// Nodes that failed.
    pub failed: usize,
    /// Expired version paths delivered to the sink.
    pub expired: usize,
}

/// Mirrors a remote tree into a local directory.
///
/// # Example
///
/// ```no_run
/// use index_mirror::config::MirrorConfig;
/// use index_mirror::crawl::Mirror;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = MirrorConfig::default();
/// let mirror = Mirror::from_config(&config)?;
/// let report = mirror.run(&config.root_url()?).await?;
/// println!("{} files", report.files.len());
/// # Ok(())
/// # }
/// ```
pub struct Mirror {
    connector: Arc<dyn Connector>,
    downloader: Downloader,
    dispatcher: Dispatcher,
    expiry: Arc<dyn ExpirySink>,
    concurrency: usize,
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror")
            .field("destination", &self.downloader.root())
            .field("dispatcher", &self.dispatcher)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Mirror {
    /// Creates a mirror over `connector` from `config`.
    ///
    /// The expiry sink is [`PruneExpired`] when `config.prune_expired` is set
    /// and [`ReportExpired`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidConcurrency`] when the concurrency is
    /// outside 1-100.
    #[instrument(level = "debug", skip(config, connector))]
    pub fn new(config: &MirrorConfig, connector: Arc<dyn Connector>) -> Result<Self, CrawlError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(CrawlError::InvalidConcurrency {
                value: config.concurrency,
            });
        }
        let expiry: Arc<dyn ExpirySink> = if config.prune_expired {
            Arc::new(PruneExpired)
        } else {
            Arc::new(ReportExpired)
        };

        debug!(
            destination = %config.destination.display(),
            concurrency = config.concurrency,
            ignored = ?config.ignored_suffixes,
            prune_expired = config.prune_expired,
            "creating mirror"
        );

        Ok(Self {
            connector,
            downloader: Downloader::new(&config.destination),
            dispatcher: Dispatcher::new(config.ignored_suffixes.iter().cloned()),
            expiry,
            concurrency: config.concurrency,
        })
    }

    /// Creates a mirror backed by an [`HttpConnector`] with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] for invalid configuration or when the HTTP
    /// client cannot be built.
    pub fn from_config(config: &MirrorConfig) -> Result<Self, CrawlError> {
        config.validate()?;
        let connector =
            HttpConnector::with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)?;
        Self::new(config, Arc::new(connector))
    }

    /// Replaces the consumer of expired version paths.
    #[must_use]
    pub fn with_expiry_sink(mut self, sink: impl ExpirySink + 'static) -> Self {
        self.expiry = Arc::new(sink);
        self
    }

    /// Crawls the tree under `root` and returns what was mirrored.
    ///
    /// Failures below the root are logged and counted, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::RootDescriptor`] when `root` cannot describe a
    /// directory (for example a URI without a hierarchical path).
    #[instrument(skip(self), fields(root = %root, destination = %self.downloader.root().display()))]
    pub async fn run(&self, root: &Url) -> Result<MirrorReport, CrawlError> {
        let descriptor = ResourceDescriptor::directory(root.clone())?;
        let crawl = Arc::new(Crawl {
            connector: Arc::clone(&self.connector),
            downloader: self.downloader.clone(),
            dispatcher: self.dispatcher.clone(),
            expiry: Arc::clone(&self.expiry),
            fetches: Semaphore::new(self.concurrency),
            stats: CrawlStats::default(),
        });

        info!("starting crawl");
        let mut files = match tokio::spawn(Crawl::visit(Arc::clone(&crawl), descriptor)).await {
            Ok(files) => files,
            Err(error) => {
                warn!(error = %error, "root task did not complete");
                Vec::new()
            }
        };
        files.sort();
        files.dedup();

        let stats = &crawl.stats;
        let report = MirrorReport {
            root: root.to_string(),
            destination: self.downloader.root().to_path_buf(),
            files,
            listings: stats.listings(),
            saved: stats.saved(),
            unchanged: stats.unchanged(),
            inconsistent: stats.inconsistent(),
            skipped: stats.skipped(),
            failed: stats.failed(),
            expired: stats.expired(),
        };
        info!(
            files = report.files.len(),
            saved = report.saved,
            failed = report.failed,
            expired = report.expired,
            "crawl finished"
        );
        Ok(report)
    }
}

/// State shared by every task of one crawl.
struct Crawl {
    connector: Arc<dyn Connector>,
    downloader: Downloader,
    dispatcher: Dispatcher,
    expiry: Arc<dyn ExpirySink>,
    fetches: Semaphore,
    stats: CrawlStats,
}

impl Crawl {
    fn visit(self: Arc<Self>, descriptor: ResourceDescriptor) -> BoxFuture<'static, Vec<PathBuf>> {
        async move {
            trace!(url = %descriptor.uri(), state = %NodeState::Pending);
            let files = match self.dispatcher.classify(&descriptor) {
                Dispatch::Skip => {
                    debug!(url = %descriptor.uri(), "skipped by suffix");
                    CrawlStats::bump(&self.stats.skipped, 1);
                    Vec::new()
                }
                Dispatch::Download => self.write(&descriptor, None).await.into_iter().collect(),
                Dispatch::Recurse => self.expand(&descriptor).await,
            };
            trace!(url = %descriptor.uri(), state = %NodeState::Done, files = files.len());
            files
        }
        .boxed()
    }

    async fn expand(self: &Arc<Self>, descriptor: &ResourceDescriptor) -> Vec<PathBuf> {
        let url = descriptor.uri();
        trace!(url = %url, state = %NodeState::Fetching);

        let Ok(permit) = self.fetches.acquire().await else {
            return Vec::new();
        };
        let connection = match self.connector.open(url, 0).await {
            Ok(connection) => connection,
            Err(error) => {
                self.fail(descriptor, NodeState::Fetching, &error);
                return Vec::new();
            }
        };
        if !connection.is_listing() {
            drop(permit);
            return self.promote(descriptor, connection).await.into_iter().collect();
        }
        let charset = connection.charset.clone();
        let body = connection.read_to_end(url).await;
        drop(permit);
        let body = match body {
            Ok(body) => body,
            Err(error) => {
                self.fail(descriptor, NodeState::Fetching, &error);
                return Vec::new();
            }
        };

        trace!(url = %url, state = %NodeState::Parsing);
        CrawlStats::bump(&self.stats.listings, 1);
        let children = parse_listing_with_charset(&body, charset.as_deref(), url);
        let Resolution { keep, expired } = resolve_versions(children);
        debug!(url = %url, children = keep.len(), expired = expired.len(), "listing resolved");
        self.deliver_expired(&expired).await;

        let mut children = JoinSet::new();
        for child in keep {
            children.spawn(Self::visit(Arc::clone(self), child));
        }
        let mut files = Vec::new();
        while let Some(joined) = children.join_next().await {
            match joined {
                Ok(child_files) => files.extend(child_files),
                Err(error) => warn!(url = %url, error = %error, "child task did not complete"),
            }
        }
        files
    }

    /// Turns a non-listing response into a file using its headers.
    async fn promote(
        &self,
        descriptor: &ResourceDescriptor,
        connection: Connection,
    ) -> Option<PathBuf> {
        let url = descriptor.uri();
        let (Some(size), Some(modified)) = (connection.content_length, connection.last_modified)
        else {
            let error = DownloadError::missing_metadata(
                url.as_str(),
                "non-listing response without length or Last-Modified",
            );
            self.fail(descriptor, NodeState::Fetching, &error);
            return None;
        };

        let promoted = match ResourceDescriptor::builder(url.clone())
            .size(size)
            .last_modified(modified)
            .build()
        {
            Ok(promoted) => promoted,
            Err(error) => {
                warn!(url = %url, error = %error, "cannot promote to file");
                CrawlStats::bump(&self.stats.failed, 1);
                return None;
            }
        };
        debug!(url = %url, size, content_type = ?connection.content_type, "promoted to file");

        match self.dispatcher.classify(&promoted) {
            Dispatch::Skip => {
                debug!(url = %url, "skipped by suffix");
                CrawlStats::bump(&self.stats.skipped, 1);
                None
            }
            Dispatch::Download | Dispatch::Recurse => self.write(&promoted, Some(connection)).await,
        }
    }

    async fn write(
        &self,
        descriptor: &ResourceDescriptor,
        initial: Option<Connection>,
    ) -> Option<PathBuf> {
        trace!(url = %descriptor.uri(), state = %NodeState::Writing);
        let Ok(_permit) = self.fetches.acquire().await else {
            return None;
        };
        match self
            .downloader
            .download(descriptor, self.connector.as_ref(), initial)
            .await
        {
            Ok(outcome) => {
                self.stats.record(&outcome);
                Some(outcome.into_path())
            }
            Err(error) => {
                self.fail(descriptor, NodeState::Writing, &error);
                None
            }
        }
    }

    async fn deliver_expired(&self, expired: &[ResourceDescriptor]) {
        if expired.is_empty() {
            return;
        }
        let paths: Vec<PathBuf> = expired
            .iter()
            .map(|descriptor| self.downloader.local_path(descriptor))
            .collect();
        CrawlStats::bump(&self.stats.expired, paths.len());

        let sink = Arc::clone(&self.expiry);
        if let Err(error) = tokio::task::spawn_blocking(move || sink.expired(paths)).await {
            warn!(error = %error, "expiry sink did not complete");
        }
    }

    fn fail(&self, descriptor: &ResourceDescriptor, stage: NodeState, error: &DownloadError) {
        CrawlStats::bump(&self.stats.failed, 1);
        warn!(
            url = %descriptor.uri(),
            state = %NodeState::Failed,
            during = %stage,
            error = %error,
            "node failed"
        );
    }
}
