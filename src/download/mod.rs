//! Fetching remote resources and writing them to disk.
//!
//! # Features
//!
//! - [`Connector`] abstraction over "open this URL at this offset", with the
//!   reqwest-backed [`HttpConnector`] as the production implementation
//! - [`ResumableStream`] that reconnects at the written offset after an early
//!   disconnect and exposes its [`ConnectionState`]
//! - [`Downloader`] that resumes partial files, verifies the final size and
//!   stamps the remote modification time
//!
//! # Example
//!
//! ```no_run
//! use index_mirror::descriptor::ResourceDescriptor;
//! use index_mirror::download::{Downloader, HttpConnector};
//!
//! # async fn example(descriptor: ResourceDescriptor) -> Result<(), Box<dyn std::error::Error>> {
//! let connector = HttpConnector::new()?;
//! let downloader = Downloader::new("./mirror");
//! let outcome = downloader.download(&descriptor, &connector, None).await?;
//! println!("{}", outcome.path().display());
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;
pub mod constants;
mod error;
mod locks;
mod writer;

pub use client::HttpConnector;
pub use connection::{ByteStream, Connection, ConnectionState, Connector, ResumableStream, Segment};
pub use error::DownloadError;
pub use locks::{PathGuard, PathLocks};
pub use writer::{DownloadOutcome, Downloader};

// Use `Result<T, DownloadError>` explicitly in signatures; no module-local alias.
