//! Media playlist parsing: ordered segment URIs plus directive map.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;
use url::Url;

use super::error::PlaylistError;
use super::{DIRECTIVE_MARKER, END_LIST_MARKER, SEGMENT_MARKER, join_url};

/// Segments of one media playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentPlaylist {
    /// Absolute segment URLs in manifest order.
    pub segments: Vec<Url>,
    /// `#EXT-X-*` directives, name to value. Later lines overwrite earlier ones.
    pub directives: BTreeMap<String, String>,
}

impl SegmentPlaylist {
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment URLs as strings, for fetch APIs taking `&str`.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.segments.iter().map(Url::to_string).collect()
    }
}

/// Parses a media playlist fetched from `base`.
///
/// A `#EXTINF` line marks the next URI line as a segment. Blank lines and
/// other `#` lines in between leave the mark pending.
pub fn parse_media_playlist(text: &str, base: &Url) -> Result<SegmentPlaylist, PlaylistError> {
    let mut playlist = SegmentPlaylist::default();
    let mut pending_segment = false;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with(SEGMENT_MARKER) {
            pending_segment = true;
            continue;
        }
        if line.starts_with(DIRECTIVE_MARKER) {
            if !line.starts_with(END_LIST_MARKER) {
                let (name, value) = line.split_once(':').unwrap_or((line, ""));
                playlist.directives.insert(name.to_string(), value.to_string());
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        if pending_segment {
            let url = join_url(base, line).map_err(|e| PlaylistError::invalid_segment(index + 1, e))?;
            trace!(segment = %url, "segment parsed");
            playlist.segments.push(url);
            pending_segment = false;
        }
    }

    Ok(playlist)
}
