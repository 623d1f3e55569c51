//! HTTP connector backed by reqwest.
//!
//! This module provides [`HttpConnector`], the production [`Connector`]. It
//! issues plain or ranged GET requests and exposes the body as a stream.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::header::{
    ACCEPT_RANGES, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, LAST_MODIFIED, RANGE,
};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::connection::{Connection, Connector};
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// Connector for `http` and `https` resources.
///
/// Create once and share; the inner client pools connections.
///
/// # Example
///
/// ```no_run
/// use index_mirror::download::{Connector, HttpConnector};
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let connector = HttpConnector::new()?;
/// let url = Url::parse("https://www.etsi.org/deliver/")?;
/// let listing = connector.open(&url, 0).await?.read_to_end(&url).await?;
/// println!("{} bytes", listing.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    /// Creates a connector with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes between body reads
    /// - No transparent decompression, so lengths and ranges refer to stored bytes
    ///
    /// # Errors
    ///
    /// Returns the reqwest error when the client cannot be built (for
    /// example when no TLS backend can be initialised).
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a connector with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error when the client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn open(&self, url: &Url, offset: u64) -> Result<Connection, DownloadError> {
        let mut request = self.client.get(url.clone());
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await.map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }

        let headers = response.headers();
        let accepts_ranges = header_str(headers, ACCEPT_RANGES.as_str())
            .is_some_and(|value| value.eq_ignore_ascii_case("bytes"));
        let content_type = header_str(headers, CONTENT_TYPE.as_str()).map(str::to_string);
        let charset = content_type.as_deref().and_then(charset_param);
        let last_modified =
            header_str(headers, LAST_MODIFIED.as_str()).and_then(parse_last_modified);
        let content_length = response.content_length();
        let partial = status == StatusCode::PARTIAL_CONTENT;
        let range_start = if partial {
            header_str(headers, CONTENT_RANGE.as_str()).and_then(content_range_start)
        } else {
            None
        };

        debug!(
            status = status.as_u16(),
            content_length,
            partial,
            range_start,
            accepts_ranges,
            "connection opened"
        );

        let stream_url = url.clone();
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| classify_error(&stream_url, e)))
            .boxed();

        Ok(Connection {
            stream,
            content_length,
            accepts_ranges,
            partial,
            range_start,
            content_type,
            charset,
            last_modified,
        })
    }
}

fn classify_error(url: &Url, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url.as_str())
    } else {
        DownloadError::network(url.as_str(), error)
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

/// `charset` parameter of a media type, e.g. `text/html; charset=ISO-8859-1`.
fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
    })
}

/// First byte position of `bytes <first>-<last>/<total>`.
fn content_range_start(value: &str) -> Option<u64> {
    let (unit, range) = value.split_once(' ')?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return None;
    }
    range.trim_start().split('-').next()?.trim().parse().ok()
}

/// Parses an RFC 7231 HTTP-date into a naive UTC timestamp.
fn parse_last_modified(value: &str) -> Option<chrono::NaiveDateTime> {
    httpdate::parse_http_date(value)
        .ok()
        .map(|time| DateTime::<Utc>::from(time).naive_utc())
}
