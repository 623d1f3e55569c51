//! Directory-index parsing.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use encoding_rs::{Encoding, UTF_8};
use regex::{Captures, Regex};
use tracing::{debug, trace};
use url::Url;

use crate::descriptor::ResourceDescriptor;

/// Size field value marking a directory row (raw or HTML-escaped).
const DIR_MARKERS: &[&str] = &["&lt;dir&gt;", "<dir>"];

/// IIS/Apache index row: `<m>/<d>/<yyyy> <h>:<mm> <AM|PM> <size|<dir>> <a href="...">text</a>`.
#[allow(clippy::expect_used)]
static ROW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(\d{1,2})/(\d{1,2})/(\d{4})\s+(\d{1,2}):(\d{2})\s*(AM|PM)\s+(\d+|&lt;dir&gt;|<dir>)\s+<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a>"#,
    )
    .expect("listing row regex is valid") // Static pattern, safe to panic
});

/// Bare anchor without any size/date metadata.
#[allow(clippy::expect_used)]
static ANCHOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a>"#)
        .expect("anchor regex is valid") // Static pattern, safe to panic
});

/// Parses directory-listing content into child descriptors.
///
/// Two shapes are recognised. If the content has index rows (date, time,
/// AM/PM, size or `<dir>`, anchor), every row becomes a descriptor carrying
/// that metadata. Otherwise every anchor becomes a descriptor without
/// metadata, which makes it a directory until a fetch says otherwise.
///
/// Anchors whose text starts with `[` (such as `[To Parent Directory]`) and
/// anchors resolving outside the subtree of `base` are dropped. Duplicate
/// URIs are reported once. The function does no I/O.
///
/// # Examples
///
/// ```
/// use index_mirror::listing::parse_listing;
/// use url::Url;
///
/// let base = Url::parse("http://localhost/a/").unwrap();
/// let children = parse_listing(
///     br#"<br>7/23/2015 12:45 PM <dir> <a href="/a/b/">b</a>"#,
///     &base,
/// );
/// assert_eq!(children.len(), 1);
/// assert!(!children[0].is_regular_file());
/// assert_eq!(children[0].size(), None);
/// ```
#[must_use]
pub fn parse_listing(content: &[u8], base: &Url) -> Vec<ResourceDescriptor> {
    parse_listing_with_charset(content, None, base)
}

/// Like [`parse_listing`], decoding `content` with the declared `charset`.
///
/// Unknown or missing labels fall back to UTF-8. A byte-order mark wins over
/// the label.
#[tracing::instrument(skip(content, base), fields(base = %base, bytes = content.len()))]
#[must_use]
pub fn parse_listing_with_charset(
    content: &[u8],
    charset: Option<&str>,
    base: &Url,
) -> Vec<ResourceDescriptor> {
    let text = decode(content, charset);
    let base = directory_url(base);
    let mut seen = HashSet::new();
    let mut children = Vec::new();

    let has_rows = ROW_PATTERN.is_match(&text);
    if has_rows {
        for captures in ROW_PATTERN.captures_iter(&text) {
            if let Some(child) = row_descriptor(&captures, &base)
                && seen.insert(child.uri().clone())
            {
                trace!(child = %child, "found listing row");
                children.push(child);
            }
        }
    } else {
        for captures in ANCHOR_PATTERN.captures_iter(&text) {
            let Some(uri) = child_uri(href(&captures, 1), &captures[3], &base) else {
                continue;
            };
            if !seen.insert(uri.clone()) {
                continue;
            }
            match ResourceDescriptor::builder(uri).build() {
                Ok(child) => {
                    trace!(child = %child, "found anchor");
                    children.push(child);
                }
                Err(e) => debug!(error = %e, "dropping anchor"),
            }
        }
    }

    debug!(
        children = children.len(),
        shape = if has_rows { "index-rows" } else { "anchors" },
        "parsed listing"
    );
    children
}

/// Builds a descriptor from one index row, or `None` if the row is filtered
/// out or carries an impossible date.
fn row_descriptor(captures: &Captures<'_>, base: &Url) -> Option<ResourceDescriptor> {
    let uri = child_uri(href(captures, 8), &captures[10], base)?;

    let Some(timestamp) = row_timestamp(captures) else {
        debug!(row = &captures[0], "dropping row with invalid date");
        return None;
    };

    let size_field = &captures[7];
    let is_dir = DIR_MARKERS
        .iter()
        .any(|marker| size_field.eq_ignore_ascii_case(marker));

    let mut builder = ResourceDescriptor::builder(uri)
        .last_modified(timestamp)
        .regular_file(!is_dir);
    if !is_dir {
        let Ok(size) = size_field.parse::<u64>() else {
            debug!(row = &captures[0], "dropping row with oversized length");
            return None;
        };
        builder = builder.size(size);
    }

    builder
        .build()
        .map_err(|e| debug!(error = %e, "dropping listing row"))
        .ok()
}

/// Href value from a double-quoted group at `index` or its single-quoted
/// alternative right after it.
fn href<'t>(captures: &Captures<'t>, index: usize) -> &'t str {
    captures
        .get(index)
        .or_else(|| captures.get(index + 1))
        .map_or("", |m| m.as_str())
}

fn decode<'c>(content: &'c [u8], charset: Option<&str>) -> Cow<'c, str> {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.trim().trim_matches('"').as_bytes()))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(content);
    if had_errors {
        debug!(encoding = used.name(), "listing contains undecodable bytes");
    }
    text
}

/// Month/day/year plus 12-hour clock; `12 AM` is midnight and `12 PM` is noon.
fn row_timestamp(captures: &Captures<'_>) -> Option<NaiveDateTime> {
    let month: u32 = captures[1].parse().ok()?;
    let day: u32 = captures[2].parse().ok()?;
    let year: i32 = captures[3].parse().ok()?;
    let hour: u32 = captures[4].parse().ok()?;
    let minute: u32 = captures[5].parse().ok()?;
    let pm = captures[6].eq_ignore_ascii_case("PM");

    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour = hour % 12 + if pm { 12 } else { 0 };

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some(date.and_time(time))
}

/// Resolves an anchor to an absolute child URI inside `base`'s subtree.
fn child_uri(href: &str, text: &str, base: &Url) -> Option<Url> {
    if text.trim_start().starts_with('[') {
        return None;
    }

    let href = href.trim().replace("&amp;", "&");
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let mut uri = base.join(&href).ok()?;
    uri.set_fragment(None);

    let inside = uri.scheme() == base.scheme()
        && uri.host_str() == base.host_str()
        && uri.port_or_known_default() == base.port_or_known_default()
        && uri.path().len() > base.path().len()
        && uri.path().starts_with(base.path());
    if !inside {
        trace!(href = %href, "skipping anchor outside listing subtree");
        return None;
    }
    Some(uri)
}

/// `base` with a trailing `/`, so relative hrefs resolve beneath it.
fn directory_url(base: &Url) -> Url {
    let mut dir = base.clone();
    dir.set_query(None);
    dir.set_fragment(None);
    if !dir.path().ends_with('/') {
        let path = format!("{}/", dir.path());
        dir.set_path(&path);
    }
    dir
}
