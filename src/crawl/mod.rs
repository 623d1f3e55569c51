//! Recursive mirroring of a remote directory tree.
//!
//! [`Dispatcher`] routes each node, [`Mirror`] drives the concurrent crawl
//! and an [`ExpirySink`] consumes superseded version directories.

mod dispatch;
mod error;
mod expiry;
mod orchestrator;

pub use dispatch::{DEFAULT_IGNORED_SUFFIXES, Dispatch, Dispatcher};
pub use error::{CrawlError, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use expiry::{ExpirySink, PruneExpired, ReportExpired};
pub use orchestrator::{CrawlStats, Mirror, MirrorReport, NodeState};
