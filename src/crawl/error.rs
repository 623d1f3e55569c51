//! Fatal crawl errors.

use thiserror::Error;

use crate::descriptor::DescriptorError;

/// Minimum allowed fetch concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed fetch concurrency.
pub const MAX_CONCURRENCY: usize = 100;

/// Errors that stop a crawl before it starts.
///
/// Failures inside the tree are logged per node and never surface here.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Root URI could not be parsed.
    #[error("invalid root URI {uri}: {source}")]
    InvalidRootUri {
        /// The rejected input.
        uri: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// Root URI parsed but cannot describe a directory.
    #[error("invalid root descriptor: {0}")]
    RootDescriptor(#[from] DescriptorError),

    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Worker thread count of zero.
    #[error("worker count must be at least 1")]
    InvalidWorkers,

    /// HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
