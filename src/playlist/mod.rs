//! HLS manifest parsing.
//!
//! A manifest is either a media playlist (segments to fetch) or a master
//! playlist (renditions to choose from). [`analyze_manifest`] tells the two
//! apart; a master playlist is a decision point for the caller, who must pick
//! one [`Variant`] and load its media playlist.
//!
//! # Example
//!
//! ```
//! use netmon_core::playlist::{Manifest, analyze_manifest};
//! use url::Url;
//!
//! let base = Url::parse("https://host/path/index.m3u8").unwrap();
//! let text = "#EXTM3U\n#EXTINF:10\nseg1.ts\n#EXTINF:10\nseg2.ts\n#EXT-X-ENDLIST";
//! let Manifest::Media(playlist) = analyze_manifest(text, &base).unwrap() else {
//!     panic!("expected a media playlist");
//! };
//! assert_eq!(playlist.urls(), ["https://host/path/seg1.ts", "https://host/path/seg2.ts"]);
//! ```

mod error;
mod media;
mod variant;

use tracing::debug;
use url::Url;

pub use error::PlaylistError;
pub use media::{SegmentPlaylist, parse_media_playlist};
pub use variant::{Variant, VariantMap, parse_variants};

/// Marks the next URI line as a segment.
pub const SEGMENT_MARKER: &str = "#EXTINF:";
/// Prefix of directive lines recorded in the directive map.
pub const DIRECTIVE_MARKER: &str = "#EXT-X-";
/// Explicit end-of-list directive, never recorded.
pub const END_LIST_MARKER: &str = "#EXT-X-ENDLIST";
/// Marks the next URI line as a variant.
pub const STREAM_MARKER: &str = "#EXT-X-STREAM-INF:";

/// Parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    Media(SegmentPlaylist),
    /// The caller must select one variant before segments can be parsed.
    Master(VariantMap),
}

/// Resolves `reference` against the manifest URL.
pub fn join_url(base: &Url, reference: &str) -> Result<Url, url::ParseError> {
    base.join(reference)
}

/// Parses a manifest downloaded from `base`.
pub fn analyze_manifest(text: &str, base: &Url) -> Result<Manifest, PlaylistError> {
    if base.cannot_be_a_base() {
        return Err(PlaylistError::invalid_base(base.as_str()));
    }
    let variants = parse_variants(text, base)?;
    if !variants.is_empty() {
        debug!(url = %base, variants = variants.len(), "master playlist detected");
        return Ok(Manifest::Master(variants));
    }
    let playlist = parse_media_playlist(text, base)?;
    debug!(url = %base, segments = playlist.len(), "media playlist parsed");
    Ok(Manifest::Media(playlist))
}
