//! Directory-index discovery.
//!
//! Turns the HTML table served at an item's download URL into an ordered
//! list of [`FileDescriptor`]s. Each content row looks like:
//!
//! ```text
//! <tr><td><a href="001.mp3">001.mp3</a></td><td>12-Jan-2020 10:00</td><td>4.2M</td></tr>
//! ```
//!
//! Header rows (only `<th>` cells), parent-directory links and rows without a
//! usable link are skipped. Links are resolved as
//! `download_url.join("<identifier>/<href>")`, because the index's relative
//! hrefs omit the identifier segment that download URLs need.

mod error;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::descriptor::FileDescriptor;
use crate::source::ArchiveSource;
use crate::transport::Transport;

pub use error::ListingError;

/// Minimum cells in a content row: name, last modified, size.
const MIN_CELLS: usize = 3;

#[allow(clippy::expect_used)]
static ROW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("row regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static CELL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<t([dh])\b[^>]*>(.*?)</t[dh]>").expect("cell regex is valid")
});

#[allow(clippy::expect_used)]
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))[^>]*>(.*?)</a>"#)
        .expect("link regex is valid")
});

#[allow(clippy::expect_used)]
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid"));

/// Fetches and parses the directory index of `source`.
///
/// The index is requested exactly once; there is no retry.
///
/// # Errors
///
/// Returns [`ListingError::Unreachable`] when the GET fails and
/// [`ListingError::Malformed`] when the body contains no table rows.
#[instrument(skip(transport), fields(url = %source.download_url()))]
pub async fn fetch_listing(
    transport: &dyn Transport,
    source: &ArchiveSource,
) -> Result<Vec<FileDescriptor>, ListingError> {
    let url = source.download_url();
    let body = transport
        .get_text(url.as_str())
        .await
        .map_err(|source| ListingError::Unreachable {
            url: url.to_string(),
            source,
        })?;
    debug!(bytes = body.len(), "directory index fetched");
    parse_listing(&body, url, source.identifier())
}

/// Parses a directory-index document into descriptors, in document order.
///
/// # Errors
///
/// Returns [`ListingError::Malformed`] when the document has no `<tr>` rows.
///
/// # Example
///
/// ```
/// use archive_fetch::parse_listing;
/// use url::Url;
///
/// let html = r#"<table>
///   <tr><th>Name</th><th>Last modified</th><th>Size</th></tr>
///   <tr><td><a href="../">Go to parent directory</a></td><td></td><td>-</td></tr>
///   <tr><td><a href="001.mp3">001.mp3</a></td><td>12-Jan-2020</td><td>1024</td></tr>
/// </table>"#;
/// let base = Url::parse("https://archive.org/download/item").unwrap();
/// let files = parse_listing(html, &base, "item").unwrap();
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].url().as_str(), "https://archive.org/download/item/001.mp3");
/// ```
pub fn parse_listing(
    body: &str,
    download_url: &Url,
    identifier: &str,
) -> Result<Vec<FileDescriptor>, ListingError> {
    let malformed = || ListingError::Malformed {
        url: download_url.to_string(),
    };

    let root = download_url
        .join(&format!("{identifier}/"))
        .map_err(|_| malformed())?;

    let mut rows = ROW_PATTERN.captures_iter(body).peekable();
    if rows.peek().is_none() {
        return Err(malformed());
    }

    let mut descriptors: Vec<FileDescriptor> = Vec::new();
    let mut seen = HashSet::new();
    for row in rows {
        let Some(row_html) = row.get(1) else {
            continue;
        };
        let Some(descriptor) = parse_row(row_html.as_str(), download_url, &root, identifier)
        else {
            continue;
        };
        // Each local path gets exactly one writer.
        if !seen.insert(descriptor.filename().to_string()) {
            warn!(filename = descriptor.filename(), "skipping duplicate listing entry");
            continue;
        }
        descriptors.push(descriptor);
    }

    debug!(files = descriptors.len(), "directory index parsed");
    Ok(descriptors)
}

fn parse_row(
    row_html: &str,
    download_url: &Url,
    root: &Url,
    identifier: &str,
) -> Option<FileDescriptor> {
    let cells: Vec<(bool, &str)> = CELL_PATTERN
        .captures_iter(row_html)
        .filter_map(|cell| {
            let is_header = cell.get(1)?.as_str().eq_ignore_ascii_case("h");
            Some((is_header, cell.get(2)?.as_str()))
        })
        .collect();

    if cells.len() < MIN_CELLS || cells.iter().all(|(is_header, _)| *is_header) {
        return None;
    }

    let link = LINK_PATTERN.captures(cells[0].1)?;
    let href = link
        .get(1)
        .or_else(|| link.get(2))
        .or_else(|| link.get(3))
        .map(|m| decode_entities(m.as_str().trim()))?;
    let name = link.get(4).map(|m| cell_text(m.as_str()))?;

    if href.is_empty() || name.is_empty() || is_navigational(&href, &name) {
        return None;
    }

    let resolved = if href.starts_with('/') || Url::parse(&href).is_ok() {
        download_url.join(&href).ok()?
    } else {
        download_url.join(&format!("{identifier}/{href}")).ok()?
    };
    if !resolved.as_str().starts_with(root.as_str()) {
        debug!(href = %href, resolved = %resolved, "skipping link outside item root");
        return None;
    }

    let descriptor = match FileDescriptor::new(name, resolved.as_str()) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            warn!(error = %e, "skipping unsafe listing entry");
            return None;
        }
    };

    let last_modified = Some(cell_text(cells[1].1)).filter(|text| !text.is_empty());
    let expected_size = parse_exact_size(&cell_text(cells[2].1));

    Some(
        descriptor
            .with_last_modified(last_modified)
            .with_expected_size(expected_size),
    )
}

fn is_navigational(href: &str, name: &str) -> bool {
    href.contains("parent")
        || href == ".."
        || href.starts_with("../")
        || name.to_ascii_lowercase().contains("parent directory")
}

/// Only exact byte counts are trusted; `4.2M` style sizes are rounded.
fn parse_exact_size(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn cell_text(html: &str) -> String {
    let stripped = TAG_PATTERN.replace_all(html, "");
    decode_entities(stripped.trim()).trim().to_string()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let decoded = after.find(';').and_then(|semi| {
            let entity = &after[1..semi];
            decode_entity(entity).map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &after[consumed..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let numeric = entity.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
