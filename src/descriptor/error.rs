//! Error types for descriptor construction.

use thiserror::Error;

/// Invariant violations detected while building a [`ResourceDescriptor`](super::ResourceDescriptor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The URI has no hierarchical path (e.g. `mailto:` or `data:`).
    #[error("URI is not hierarchical: {uri}")]
    NotHierarchical {
        /// The offending URI.
        uri: String,
    },

    /// A directory was given a byte size.
    #[error("directory {uri} cannot carry a size ({size} bytes)")]
    DirectoryWithSize {
        /// Directory URI.
        uri: String,
        /// The size that was supplied.
        size: u64,
    },

    /// A regular file was built without a size.
    #[error("regular file {uri} has no size")]
    MissingSize {
        /// File URI.
        uri: String,
    },

    /// A regular file was built without a modification time.
    #[error("regular file {uri} has no modification time")]
    MissingTimestamp {
        /// File URI.
        uri: String,
    },
}
