//! Shared helpers for integration tests: listing builders and mock responders.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Timestamp used on every listing row.
pub const LISTING_DATE: &str = "11/5/2023 12:45 PM";

/// Unix seconds of [`LISTING_DATE`] read as UTC.
pub fn listing_epoch() -> i64 {
    NaiveDate::from_ymd_opt(2023, 11, 5)
        .and_then(|d| d.and_hms_opt(12, 45, 0))
        .expect("valid listing date")
        .and_utc()
        .timestamp()
}

fn display_name(href: &str) -> &str {
    href.trim_end_matches('/').rsplit('/').next().unwrap_or(href)
}

/// Listing row for a directory.
pub fn dir_row(href: &str) -> String {
    format!(
        "{LISTING_DATE}        &lt;dir&gt; <A HREF=\"{href}\">{}</A><br>",
        display_name(href)
    )
}

/// Listing row for a file of `size` bytes.
pub fn file_row(href: &str, size: usize) -> String {
    format!(
        "{LISTING_DATE}      {size} <A HREF=\"{href}\">{}</A><br>",
        display_name(href)
    )
}

/// IIS-style listing page with a parent link and the given rows.
pub fn listing_page(rows: &[String]) -> String {
    format!(
        "<html><head><title>localhost - /</title></head><body><H1>localhost - /</H1><hr>\n\
         <pre><A HREF=\"/\">[To Parent Directory]</A><br><br>{}</pre><hr></body></html>",
        rows.join("\n")
    )
}

/// Serves a listing page at `route`.
pub async fn mount_listing(server: &MockServer, route: &str, rows: &[String]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(listing_page(rows), "text/html"))
        .mount(server)
        .await;
}

/// Serves `body` at `route`, expecting exactly `expected_hits` requests.
pub async fn mount_file(server: &MockServer, route: &str, body: &[u8], expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.to_vec(), "application/octet-stream"),
        )
        .expect(expected_hits)
        .mount(server)
        .await;
}

/// Serves a body with byte-range support. The first unranged request can be
/// cut short to simulate a dropped connection.
pub struct RangedResponder {
    body: Vec<u8>,
    first_cut: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl RangedResponder {
    pub fn new(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            first_cut: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn cut_first_response_at(mut self, cut: usize) -> Self {
        self.first_cut = Some(cut);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

fn range_start(request: &Request) -> Option<usize> {
    request
        .headers
        .get("range")?
        .to_str()
        .ok()?
        .strip_prefix("bytes=")?
        .trim_end_matches('-')
        .parse()
        .ok()
}

impl Respond for RangedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let total = self.body.len();

        if let Some(start) = range_start(request) {
            let start = start.min(total);
            return ResponseTemplate::new(206)
                .insert_header("Accept-Ranges", "bytes")
                .insert_header(
                    "Content-Range",
                    format!("bytes {start}-{}/{total}", total.saturating_sub(1)).as_str(),
                )
                .set_body_raw(self.body[start..].to_vec(), "application/octet-stream");
        }

        let end = match self.first_cut {
            Some(cut) if call == 0 => cut.min(total),
            _ => total,
        };
        ResponseTemplate::new(200)
            .insert_header("Accept-Ranges", "bytes")
            .set_body_raw(self.body[..end].to_vec(), "application/octet-stream")
    }
}
