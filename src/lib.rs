//! Index Mirror Library
//!
//! Mirrors a remote HTTP directory-index tree into a local directory. Among
//! sibling version directories (`NN.NN.NN_NN`) only the newest is mirrored;
//! the superseded ones are handed to an expiry consumer, which by default
//! deletes their local copies.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`descriptor`] - Remote node descriptors and version packing
//! - [`listing`] - Directory-listing parsing and version resolution
//! - [`download`] - Connectors and the resumable file writer
//! - [`crawl`] - Dispatching, the concurrent crawl, and expiry consumers
//! - [`config`] - Crawl configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawl;
pub mod descriptor;
pub mod download;
pub mod listing;
mod user_agent;

// Re-export commonly used types
pub use config::MirrorConfig;
pub use crawl::{CrawlError, Dispatch, Dispatcher, ExpirySink, Mirror, MirrorReport, PruneExpired};
pub use descriptor::{DescriptorError, ResourceDescriptor};
pub use download::{Connector, DownloadError, DownloadOutcome, Downloader, HttpConnector};
pub use listing::{Resolution, parse_listing, parse_listing_with_charset, resolve_versions};
