//! Constants for the download module (timeouts, buffer sizes).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Write buffer between the network stream and the local file.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Upper bound on a directory listing held in memory.
pub const MAX_LISTING_BYTES: usize = 16 * 1024 * 1024;
