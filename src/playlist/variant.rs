//! Master playlist detection: stream descriptors and their variant URIs.

use serde::Serialize;
use url::Url;

use super::error::PlaylistError;
use super::{STREAM_MARKER, join_url};

/// One rendition listed by a master playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    /// Absolute URL of the rendition's media playlist.
    pub url: Url,
    /// Attribute text following `#EXT-X-STREAM-INF:`.
    pub descriptor: String,
}

/// Variants keyed by URL, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariantMap {
    entries: Vec<Variant>,
}

impl VariantMap {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variant> {
        self.entries.iter()
    }

    /// Variant at `index` (0-based, listing order).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Variant> {
        self.entries.get(index)
    }

    /// Descriptor recorded for `url`.
    #[must_use]
    pub fn descriptor(&self, url: &Url) -> Option<&str> {
        self.entries
            .iter()
            .find(|v| &v.url == url)
            .map(|v| v.descriptor.as_str())
    }

    fn insert(&mut self, url: Url, descriptor: String) {
        match self.entries.iter_mut().find(|v| v.url == url) {
            Some(existing) => existing.descriptor = descriptor,
            None => self.entries.push(Variant { url, descriptor }),
        }
    }
}

impl<'a> IntoIterator for &'a VariantMap {
    type Item = &'a Variant;
    type IntoIter = std::slice::Iter<'a, Variant>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Collects `#EXT-X-STREAM-INF` / URI pairs.
///
/// A descriptor line must be followed directly by its URI line (blank lines
/// aside); a descriptor followed by another tag is dropped.
pub fn parse_variants(text: &str, base: &Url) -> Result<VariantMap, PlaylistError> {
    let mut variants = VariantMap::default();
    let mut descriptor: Option<&str> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match descriptor.take() {
            None => {
                descriptor = line.strip_prefix(STREAM_MARKER);
            }
            Some(detail) => {
                if line.starts_with('#') {
                    descriptor = line.strip_prefix(STREAM_MARKER);
                    continue;
                }
                let url = join_url(base, line).map_err(|e| PlaylistError::invalid_segment(index + 1, e))?;
                variants.insert(url, detail.to_string());
            }
        }
    }

    Ok(variants)
}
