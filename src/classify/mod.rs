//! Content classification for captured exchanges.
//!
//! Maps a response `Content-Type` onto a coarse [`Kind`] used both for the
//! display filter and for choosing between segmented and single-stream saves.
//!
//! # Example
//!
//! ```
//! use netmon_core::classify::{Kind, classify_content_type};
//!
//! assert_eq!(classify_content_type("text/html; charset=utf-8"), Kind::Html);
//! assert_eq!(classify_content_type("Application/X-MpegURL"), Kind::Streaming);
//! assert_eq!(classify_content_type(""), Kind::Etc);
//! ```

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Text that opens every HLS manifest.
pub const MANIFEST_MARKER: &str = "#EXTM3U";

/// How many leading body bytes are decoded when sniffing for a manifest.
const SNIFF_LIMIT: usize = 100;

/// Coarse classification of a captured exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Html,
    Css,
    Js,
    Data,
    Image,
    Media,
    Streaming,
    Etc,
}

impl Kind {
    /// All kinds, in display order.
    pub const ALL: [Kind; 8] = [
        Kind::Html,
        Kind::Css,
        Kind::Js,
        Kind::Data,
        Kind::Image,
        Kind::Media,
        Kind::Streaming,
        Kind::Etc,
    ];

    /// Returns the stable lower-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::Js => "js",
            Self::Data => "data",
            Self::Image => "image",
            Self::Media => "media",
            Self::Streaming => "streaming",
            Self::Etc => "etc",
        }
    }

    /// Parses a lower-case label produced by [`Kind::as_str`].
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup table; the first kind whose set contains the MIME type wins.
const KIND_TABLE: &[(Kind, &[&str])] = &[
    (
        Kind::Image,
        &[
            "image/jpeg",
            "image/png",
            "image/gif",
            "image/bmp",
            "image/webp",
            "image/vnd.microsoft.icon",
            "image/x-icon",
            "image/svg+xml",
        ],
    ),
    (
        Kind::Media,
        &[
            "video/mp4",
            "video/webm",
            "video/ogg",
            "video/mov",
            "video/avi",
            "video/flv",
            "video/wmv",
            "video/3gp",
            "video/mkv",
            "video/mp2t",
            "application/vnd.yt-ump",
        ],
    ),
    (
        Kind::Streaming,
        &["application/vnd.apple.mpegurl", "application/x-mpegurl"],
    ),
    (Kind::Html, &["text/html"]),
    (Kind::Css, &["text/css"]),
    (Kind::Js, &["text/javascript", "application/javascript"]),
    (
        Kind::Data,
        &["application/json", "application/xml", "application/json+protobuf"],
    ),
];

const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("image/jpeg", "jpeg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/bmp", "bmp"),
    ("image/webp", "webp"),
    ("image/vnd.microsoft.icon", "ico"),
    ("image/svg+xml", "svg"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/ogg", "ogg"),
    ("video/mov", "mov"),
    ("video/avi", "avi"),
    ("video/flv", "flv"),
    ("video/wmv", "wmv"),
    ("video/3gp", "3gp"),
    ("video/mkv", "mkv"),
    ("video/mp2t", "mp2t"),
    ("application/vnd.apple.mpegurl", "m3u8"),
    ("application/x-mpegurl", "m3u8"),
    ("text/html", "html"),
    ("text/css", "css"),
    ("text/javascript", "js"),
    ("application/javascript", "js"),
    ("application/json", "json"),
    ("application/xml", "xml"),
    ("application/json+protobuf", "json"),
];

/// Lower-cases a content type and drops any `;`-separated parameters.
#[must_use]
pub fn normalize_content_type(raw: &str) -> String {
    let bare = raw.split(';').next().unwrap_or_default();
    bare.trim().to_ascii_lowercase()
}

/// Classifies a raw or normalized content type.
///
/// Empty and unknown types yield [`Kind::Etc`].
#[must_use]
pub fn classify_content_type(raw: &str) -> Kind {
    let normalized = normalize_content_type(raw);
    if normalized.is_empty() {
        return Kind::Etc;
    }
    KIND_TABLE
        .iter()
        .find(|(_, mimes)| mimes.contains(&normalized.as_str()))
        .map_or(Kind::Etc, |(kind, _)| *kind)
}

/// Returns the conventional file extension (without dot) for a content type.
#[must_use]
pub fn extension_for_content_type(raw: &str) -> Option<&'static str> {
    let normalized = normalize_content_type(raw);
    EXTENSION_TABLE
        .iter()
        .find(|(mime, _)| *mime == normalized)
        .map(|(_, ext)| *ext)
}

/// Returns true when the captured body starts with the HLS manifest marker.
///
/// Only the first [`SNIFF_LIMIT`] bytes are decoded; invalid UTF-8 is replaced
/// rather than rejected.
#[must_use]
pub fn looks_like_manifest(chunks: &[Bytes]) -> bool {
    let mut prefix = Vec::with_capacity(SNIFF_LIMIT);
    for chunk in chunks {
        let take = (SNIFF_LIMIT - prefix.len()).min(chunk.len());
        prefix.extend_from_slice(&chunk[..take]);
        if prefix.len() >= SNIFF_LIMIT {
            break;
        }
    }
    String::from_utf8_lossy(&prefix).starts_with(MANIFEST_MARKER)
}

/// Decides whether a record should be promoted from `etc` to `streaming`.
///
/// Only records with no content type at all are eligible: an explicit header
/// always wins, even when it is wrong.
#[must_use]
pub fn sniffed_kind(current: Kind, content_type: &str, chunks: Option<&[Bytes]>) -> Option<Kind> {
    if current != Kind::Etc || !content_type.is_empty() {
        return None;
    }
    chunks
        .filter(|chunks| looks_like_manifest(chunks))
        .map(|_| Kind::Streaming)
}
