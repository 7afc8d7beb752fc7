//! Text renderings of a captured request: curl command, detail dump and body
//! preview, plus the download route a record should take.

use std::fmt::Write as _;

use bytes::Bytes;

use crate::capture::{Header, RequestRecord};
use crate::classify::looks_like_manifest;

const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const REQUEST_BANNER: &str = "========== request headers ========";
const RESPONSE_BANNER: &str = "========== response headers ========";

/// How a record would be downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadRoute {
    /// Segmented stream through the HLS downloader.
    Hls,
    /// Single resource through the chunked downloader.
    Direct,
}

/// Picks the route for `record`.
///
/// The HLS content type always routes to HLS; a record without any content
/// type does when its captured body starts with the manifest marker.
#[must_use]
pub fn download_route(record: &RequestRecord) -> DownloadRoute {
    if record.content_type == HLS_CONTENT_TYPE {
        return DownloadRoute::Hls;
    }
    if record.content_type.is_empty()
        && record
            .chunks
            .as_deref()
            .is_some_and(looks_like_manifest)
    {
        return DownloadRoute::Hls;
    }
    DownloadRoute::Direct
}

/// Shell-quotes `text` in single quotes.
fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// `curl '<url>' -H '<name>: <value>' ...` with the request headers in
/// capture order.
#[must_use]
pub fn curl_command(record: &RequestRecord) -> String {
    let mut command = format!("curl {}", quote(&record.url));
    for header in &record.request_headers {
        let _ = write!(command, " -H {}", quote(&format!("{}: {}", header.name, header.value)));
    }
    command
}

fn dump_headers(out: &mut String, banner: &str, headers: &[Header]) {
    out.push_str(banner);
    out.push('\n');
    let mut sorted: Vec<&Header> = headers.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    for header in sorted {
        let _ = writeln!(out, "{}: {}", header.name, header.value);
    }
}

/// URL, method, then both header lists sorted by name under banner lines.
#[must_use]
pub fn format_details(record: &RequestRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "URL: {}", record.url);
    let _ = writeln!(out, "Method: {}", record.method);
    dump_headers(&mut out, REQUEST_BANNER, &record.request_headers);
    dump_headers(&mut out, RESPONSE_BANNER, &record.response_headers);
    out
}

/// Decodes captured chunks as text.
///
/// With a `budget`, whole chunks are taken until the running length reaches
/// it, so the result may run past the budget by part of one chunk.
#[must_use]
pub fn body_text(chunks: &[Bytes], budget: Option<usize>) -> String {
    let mut taken = Vec::new();
    for chunk in chunks {
        taken.extend_from_slice(chunk);
        if budget.is_some_and(|max| taken.len() >= max) {
            break;
        }
    }
    String::from_utf8_lossy(&taken).into_owned()
}
