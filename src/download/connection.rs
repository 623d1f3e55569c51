//! Connector abstraction and the resumable byte stream layered on top of it.
//!
//! A [`Connector`] opens one response at a time. [`ResumableStream`] owns the
//! reconnect policy: when a body ends before the declared length it opens a
//! fresh ranged connection at the current offset, and it gives up once a
//! connection delivers nothing.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDateTime;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tracing::{debug, warn};
use url::Url;

use super::constants::MAX_LISTING_BYTES;
use super::error::DownloadError;

/// Body of an open response.
pub type ByteStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// One open response: its body plus the metadata the crawl needs.
pub struct Connection {
    /// Response body.
    pub stream: ByteStream,
    /// Length of this response body, when declared.
    pub content_length: Option<u64>,
    /// Whether the remote advertised byte-range support.
    pub accepts_ranges: bool,
    /// Whether the response is a partial (ranged) body.
    pub partial: bool,
    /// Start of a partial body as declared by `Content-Range`.
    pub range_start: Option<u64>,
    /// Declared media type.
    pub content_type: Option<String>,
    /// `charset` parameter of the media type.
    pub charset: Option<String>,
    /// Remote modification time, UTC.
    pub last_modified: Option<NaiveDateTime>,
}

impl Connection {
    /// Wraps a body stream with empty metadata.
    #[must_use]
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            content_length: None,
            accepts_ranges: false,
            partial: false,
            range_start: None,
            content_type: None,
            charset: None,
            last_modified: None,
        }
    }

    /// Absolute offset of the first body byte, given the offset requested.
    ///
    /// A full response starts at zero. A partial one starts where its
    /// `Content-Range` says, or at the requested offset when it says nothing.
    #[must_use]
    pub fn body_offset(&self, requested: u64) -> u64 {
        if self.partial {
            self.range_start.unwrap_or(requested)
        } else {
            0
        }
    }

    /// Returns true when the body should be parsed as a directory listing.
    ///
    /// A missing content type is treated as HTML since bare index servers
    /// often omit it.
    #[must_use]
    pub fn is_listing(&self) -> bool {
        self.content_type.as_deref().is_none_or(|value| {
            let mime = value.split(';').next().unwrap_or_default().trim();
            mime.eq_ignore_ascii_case("text/html")
                || mime.eq_ignore_ascii_case("application/xhtml+xml")
        })
    }

    /// Reads the whole body into memory, bounded by [`MAX_LISTING_BYTES`].
    ///
    /// # Errors
    ///
    /// Returns the stream's error, or [`DownloadError::MalformedListing`] when
    /// the body exceeds the bound.
    pub async fn read_to_end(mut self, url: &Url) -> Result<Vec<u8>, DownloadError> {
        let hint = self
            .content_length
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0)
            .min(MAX_LISTING_BYTES);
        let mut body = Vec::with_capacity(hint);
        while let Some(chunk) = self.stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > MAX_LISTING_BYTES {
                return Err(DownloadError::malformed_listing(
                    url.as_str(),
                    format!("listing exceeds {MAX_LISTING_BYTES} bytes"),
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("content_length", &self.content_length)
            .field("accepts_ranges", &self.accepts_ranges)
            .field("partial", &self.partial)
            .field("range_start", &self.range_start)
            .field("content_type", &self.content_type)
            .field("charset", &self.charset)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Opens connections to remote resources.
///
/// An `offset` of zero requests the whole body; any other value requests the
/// byte range starting there. Implementations must fail on non-success
/// status and report whether a ranged request was honoured via
/// [`Connection::partial`] and [`Connection::range_start`].
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens `url`, starting at byte `offset`.
    async fn open(&self, url: &Url, offset: u64) -> Result<Connection, DownloadError>;
}

/// Lifecycle of the connection behind a [`ResumableStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection is open; the next read opens one at the current offset.
    NotConnected,
    /// A connection opened at `offset` is being read.
    Connected {
        /// Absolute offset the connection started at.
        offset: u64,
    },
    /// A connection ended without delivering data; no further attempts.
    Exhausted,
}

/// Unit yielded by a [`ResumableStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Bytes to append at the current end of the output.
    Data(Bytes),
    /// The remote answered a range request from byte zero; discard everything
    /// written so far.
    Restart,
}

/// Byte stream over one resource that survives early disconnects.
///
/// Yields exactly `expected - start` bytes in total (after any
/// [`Segment::Restart`]) or fails.
pub struct ResumableStream<'a> {
    connector: &'a dyn Connector,
    url: &'a Url,
    expected: u64,
    position: u64,
    state: ConnectionState,
    current: Option<Connection>,
    progressed: bool,
    restarted: bool,
}

impl<'a> ResumableStream<'a> {
    /// Creates a stream that will connect lazily at `start`.
    #[must_use]
    pub fn new(connector: &'a dyn Connector, url: &'a Url, start: u64, expected: u64) -> Self {
        Self {
            connector,
            url,
            expected,
            position: start,
            state: ConnectionState::NotConnected,
            current: None,
            progressed: false,
            restarted: false,
        }
    }

    /// Creates a stream that reads an already-open, unranged connection first.
    #[must_use]
    pub fn with_connection(
        connector: &'a dyn Connector,
        url: &'a Url,
        connection: Connection,
        expected: u64,
    ) -> Self {
        Self {
            state: ConnectionState::Connected { offset: 0 },
            current: Some(connection),
            ..Self::new(connector, url, 0, expected)
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Absolute offset of the next byte to be yielded.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the next segment, or `None` once `expected` bytes were yielded.
    ///
    /// # Errors
    ///
    /// Returns the connector's error when opening fails, the stream's error
    /// when it fails before delivering anything, and
    /// [`DownloadError::Truncated`] once the stream is exhausted.
    pub async fn next_segment(&mut self) -> Result<Option<Segment>, DownloadError> {
        loop {
            if self.position >= self.expected {
                self.current = None;
                return Ok(None);
            }

            match self.state {
                ConnectionState::Exhausted => {
                    return Err(DownloadError::truncated(
                        self.url.as_str(),
                        self.position,
                        self.expected,
                    ));
                }
                ConnectionState::NotConnected => {
                    if let Some(segment) = self.connect().await? {
                        return Ok(Some(segment));
                    }
                }
                ConnectionState::Connected { .. } => {
                    let next = match self.current.as_mut() {
                        Some(connection) => connection.stream.next().await,
                        None => None,
                    };
                    match next {
                        Some(Ok(chunk)) if chunk.is_empty() => {}
                        Some(Ok(chunk)) => return Ok(Some(Segment::Data(self.advance(chunk)))),
                        Some(Err(error)) if !self.progressed => {
                            self.disconnect(ConnectionState::Exhausted);
                            return Err(error);
                        }
                        Some(Err(error)) => {
                            warn!(
                                url = %self.url,
                                offset = self.position,
                                error = %error,
                                "stream failed mid-body, reconnecting"
                            );
                            self.disconnect(ConnectionState::NotConnected);
                        }
                        None if self.progressed => {
                            debug!(
                                url = %self.url,
                                offset = self.position,
                                expected = self.expected,
                                "stream ended early, reconnecting"
                            );
                            self.disconnect(ConnectionState::NotConnected);
                        }
                        None => self.disconnect(ConnectionState::Exhausted),
                    }
                }
            }
        }
    }

    async fn connect(&mut self) -> Result<Option<Segment>, DownloadError> {
        let connection = self.connector.open(self.url, self.position).await?;
        self.progressed = false;

        let start = connection.body_offset(self.position);
        if start != self.position && start != 0 {
            self.disconnect(ConnectionState::Exhausted);
            return Err(DownloadError::transport(
                self.url.as_str(),
                format!("range answer starts at {start}, requested {}", self.position),
            ));
        }

        let restart = self.position > 0 && start == 0;
        if restart {
            if self.restarted {
                self.disconnect(ConnectionState::Exhausted);
                return Err(DownloadError::transport(
                    self.url.as_str(),
                    "remote ignores range requests and keeps disconnecting",
                ));
            }
            warn!(
                url = %self.url,
                offset = self.position,
                "range request ignored, restarting from zero"
            );
            self.restarted = true;
            self.position = 0;
        }

        self.state = ConnectionState::Connected {
            offset: self.position,
        };
        self.current = Some(connection);
        Ok(restart.then_some(Segment::Restart))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn advance(&mut self, chunk: Bytes) -> Bytes {
        let remaining = self.expected - self.position;
        let chunk = if chunk.len() as u64 > remaining {
            // remaining < chunk.len() so it fits in usize
            chunk.slice(..remaining as usize)
        } else {
            chunk
        };
        self.position += chunk.len() as u64;
        self.progressed = true;
        chunk
    }

    fn disconnect(&mut self, next: ConnectionState) {
        self.current = None;
        self.state = next;
    }
}

impl fmt::Debug for ResumableStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumableStream")
            .field("url", &self.url.as_str())
            .field("expected", &self.expected)
            .field("position", &self.position)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use futures_util::stream;

    use super::*;

    /// Serves `body` from memory. Each scripted entry caps how many bytes the
    /// corresponding connection delivers before ending; unscripted
    /// connections deliver everything.
    pub(crate) struct MemoryConnector {
        body: Vec<u8>,
        honour_ranges: bool,
        partial_from_zero: bool,
        cutoffs: Mutex<Vec<usize>>,
        pub(crate) opened: Mutex<Vec<u64>>,
    }

    impl MemoryConnector {
        pub(crate) fn new(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                honour_ranges: true,
                partial_from_zero: false,
                cutoffs: Mutex::new(Vec::new()),
                opened: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_cutoffs(mut self, cutoffs: &[usize]) -> Self {
            let mut reversed = cutoffs.to_vec();
            reversed.reverse();
            self.cutoffs = Mutex::new(reversed);
            self
        }

        pub(crate) fn ignoring_ranges(mut self) -> Self {
            self.honour_ranges = false;
            self
        }

        /// Answers ranged requests with 206 but sends the body from byte zero.
        pub(crate) fn partial_from_zero(mut self) -> Self {
            self.partial_from_zero = true;
            self
        }

        pub(crate) fn offsets(&self) -> Vec<u64> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn open(&self, _url: &Url, offset: u64) -> Result<Connection, DownloadError> {
            self.opened.lock().unwrap().push(offset);
            let start = if self.honour_ranges && !self.partial_from_zero {
                offset as usize
            } else {
                0
            };
            let mut slice = self.body[start.min(self.body.len())..].to_vec();
            if let Some(cutoff) = self.cutoffs.lock().unwrap().pop() {
                slice.truncate(cutoff);
            }
            let chunks: Vec<Result<Bytes, DownloadError>> = slice
                .chunks(3)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            let mut connection = Connection::new(stream::iter(chunks).boxed());
            connection.content_length = Some((self.body.len() - start) as u64);
            connection.accepts_ranges = self.honour_ranges;
            connection.partial = self.honour_ranges && offset > 0;
            if connection.partial {
                connection.range_start = Some(start as u64);
            }
            Ok(connection)
        }
    }

    async fn drain(stream: &mut ResumableStream<'_>) -> Result<Vec<u8>, DownloadError> {
        let mut out = Vec::new();
        while let Some(segment) = stream.next_segment().await? {
            match segment {
                Segment::Data(bytes) => out.extend_from_slice(&bytes),
                Segment::Restart => out.clear(),
            }
        }
        Ok(out)
    }

    fn url() -> Url {
        Url::parse("http://localhost/files/a.bin").unwrap()
    }

    #[tokio::test]
    async fn test_reads_whole_body_in_one_connection() {
        let connector = MemoryConnector::new(b"0123456789");
        let url = url();
        let mut stream = ResumableStream::new(&connector, &url, 0, 10);
        assert_eq!(stream.state(), ConnectionState::NotConnected);

        assert_eq!(drain(&mut stream).await.unwrap(), b"0123456789");
        assert_eq!(connector.offsets(), vec![0]);
        assert_eq!(stream.position(), 10);
    }

    #[tokio::test]
    async fn test_reconnects_at_written_offset_after_early_end() {
        let connector = MemoryConnector::new(b"0123456789").with_cutoffs(&[4, 3]);
        let url = url();
        let mut stream = ResumableStream::new(&connector, &url, 0, 10);

        assert_eq!(drain(&mut stream).await.unwrap(), b"0123456789");
        assert_eq!(connector.offsets(), vec![0, 4, 7]);
    }

    #[tokio::test]
    async fn test_starts_at_requested_offset() {
        let connector = MemoryConnector::new(b"0123456789");
        let url = url();
        let mut stream = ResumableStream::new(&connector, &url, 6, 10);

        assert_eq!(drain(&mut stream).await.unwrap(), b"6789");
        assert_eq!(connector.offsets(), vec![6]);
    }

    #[tokio::test]
    async fn test_restarts_when_range_ignored() {
        let connector = MemoryConnector::new(b"0123456789").ignoring_ranges();
        let url = url();
        let mut stream = ResumableStream::new(&connector, &url, 6, 10);

        assert_eq!(stream.next_segment().await.unwrap(), Some(Segment::Restart));
        assert_eq!(stream.position(), 0);
        assert_eq!(drain(&mut stream).await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_partial_answer_from_zero_restarts() {
        let connector = MemoryConnector::new(b"0123456789").partial_from_zero();
        let url = url();
        let mut stream = ResumableStream::new(&connector, &url, 6, 10);

        assert_eq!(stream.next_segment().await.unwrap(), Some(Segment::Restart));
        assert_eq!(drain(&mut stream).await.unwrap(), b"0123456789");
        assert_eq!(connector.offsets(), vec![6]);
    }

    #[tokio::test]
    async fn test_partial_answer_at_wrong_offset_fails() {
        struct Misaligned;

        #[async_trait]
        impl Connector for Misaligned {
            async fn open(&self, _url: &Url, _offset: u64) -> Result<Connection, DownloadError> {
                let chunks = vec![Ok(Bytes::from_static(b"3456789"))];
                let mut connection = Connection::new(stream::iter(chunks).boxed());
                connection.partial = true;
                connection.range_start = Some(3);
                Ok(connection)
            }
        }

        let url = url();
        let mut stream = ResumableStream::new(&Misaligned, &url, 6, 10);
        let error = stream.next_segment().await.unwrap_err();
        assert!(error.is_transport(), "unexpected error: {error}");
        assert_eq!(stream.state(), ConnectionState::Exhausted);
    }

    #[test]
    fn test_body_offset() {
        let mut connection = Connection::new(stream::empty().boxed());
        assert_eq!(connection.body_offset(6), 0);
        connection.partial = true;
        assert_eq!(connection.body_offset(6), 6);
        connection.range_start = Some(0);
        assert_eq!(connection.body_offset(6), 0);
    }

    #[tokio::test]
    async fn test_empty_reconnect_exhausts_stream() {
        let connector = MemoryConnector::new(b"0123456789").with_cutoffs(&[4, 0]);
        let url = url();
        let mut stream = ResumableStream::new(&connector, &url, 0, 10);

        let error = drain(&mut stream).await.unwrap_err();
        assert!(matches!(error, DownloadError::Truncated { received: 4, expected: 10, .. }));
        assert_eq!(stream.state(), ConnectionState::Exhausted);
        assert_eq!(connector.offsets(), vec![0, 4]);
    }

    #[tokio::test]
    async fn test_zero_length_never_connects() {
        let connector = MemoryConnector::new(b"");
        let url = url();
        let mut stream = ResumableStream::new(&connector, &url, 0, 0);

        assert!(stream.next_segment().await.unwrap().is_none());
        assert!(connector.offsets().is_empty());
    }

    #[tokio::test]
    async fn test_excess_bytes_are_cut_at_expected_length() {
        let connector = MemoryConnector::new(b"0123456789");
        let url = url();
        let mut stream = ResumableStream::new(&connector, &url, 0, 5);

        assert_eq!(drain(&mut stream).await.unwrap(), b"01234");
    }

    #[tokio::test]
    async fn test_read_to_end_collects_body() {
        let connector = MemoryConnector::new(b"<html></html>");
        let url = url();
        let connection = connector.open(&url, 0).await.unwrap();
        assert!(connection.is_listing());
        assert_eq!(connection.read_to_end(&url).await.unwrap(), b"<html></html>");
    }

    #[test]
    fn test_is_listing_by_content_type() {
        let mut connection = Connection::new(stream::empty().boxed());
        connection.content_type = Some("text/html; charset=utf-8".to_string());
        assert!(connection.is_listing());
        connection.content_type = Some("TEXT/HTML".to_string());
        assert!(connection.is_listing());
        connection.content_type = Some("application/zip".to_string());
        assert!(!connection.is_listing());
        connection.content_type = None;
        assert!(connection.is_listing());
    }
}
