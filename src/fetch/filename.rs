//! Output naming: timestamp names, URL-derived names and unique paths.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;
use url::Url;

use crate::classify::extension_for_content_type;

/// Extension of reassembled segment downloads.
pub const SEGMENTED_EXTENSION: &str = "bin";

/// Extension of the sidecar written next to a reassembled download.
pub const SIDECAR_EXTENSION: &str = "json";

/// `YYYY-MM-DD_HH-MM-SS.mmm` in local time.
#[must_use]
pub fn timestamp_stem() -> String {
    format_stem(&Local::now())
}

fn format_stem(now: &DateTime<Local>) -> String {
    now.format("%Y-%m-%d_%H-%M-%S%.3f").to_string()
}

/// Unique work-directory entry for an in-progress download.
#[must_use]
pub fn temp_entry_name() -> String {
    format!("{}-{:08x}.part", timestamp_stem(), rand::random::<u32>())
}

/// Name of a non-segmented save.
///
/// The last URL path segment (percent-decoded) wins; otherwise a timestamp
/// stem with an extension picked from the content-type.
#[must_use]
pub fn filename_from_url(url: &Url, content_type: &str) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
            debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
            last.into()
        });
        return sanitize_filename(&decoded);
    }

    let extension = extension_for_content_type(content_type).unwrap_or(SEGMENTED_EXTENSION);
    format!("{}.{extension}", timestamp_stem())
}

/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// First free path for `filename` in `dir`: `name.ext`, then `name_2.ext`,
/// `name_3.ext`, ...
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.trim_matches('_').is_empty() {
            format!("download.{SEGMENTED_EXTENSION}")
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);
    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    for i in 2..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    dir.join(format!("{stem}_{}{ext}", timestamp_stem()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_stem_has_millisecond_precision() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(format_stem(&at), "2024-03-07_09-05-02.042");
    }

    #[test]
    fn test_temp_entry_names_differ() {
        let a = temp_entry_name();
        let b = temp_entry_name();
        assert!(a.ends_with(".part"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamp_stem_shape() {
        let stem = timestamp_stem();
        assert_eq!(stem.len(), "YYYY-MM-DD_HH-MM-SS.mmm".len());
        assert_eq!(&stem[10..11], "_");
        assert_eq!(&stem[19..20], ".");
    }

    #[test]
    fn test_filename_from_url_decodes_last_segment() {
        let url = Url::parse("https://host/media/My%20Clip.mp4?x=1").unwrap();
        assert_eq!(filename_from_url(&url, "video/mp4"), "My Clip.mp4");
    }

    #[test]
    fn test_filename_from_url_falls_back_to_content_type() {
        let url = Url::parse("https://host/").unwrap();
        let name = filename_from_url(&url, "video/mp4");
        assert!(name.ends_with(".mp4"), "unexpected name: {name}");

        let unknown = filename_from_url(&url, "");
        assert!(unknown.ends_with(".bin"), "unexpected name: {unknown}");
    }

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("a/b:c?.ts"), "a_b_c_.ts");
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename(""), "_");
    }

    #[test]
    fn test_resolve_unique_path_suffixes() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            resolve_unique_path(temp.path(), "a.bin"),
            temp.path().join("a.bin")
        );
        std::fs::write(temp.path().join("a.bin"), b"").unwrap();
        assert_eq!(
            resolve_unique_path(temp.path(), "a.bin"),
            temp.path().join("a_2.bin")
        );
        std::fs::write(temp.path().join("a_2.bin"), b"").unwrap();
        assert_eq!(
            resolve_unique_path(temp.path(), "a.bin"),
            temp.path().join("a_3.bin")
        );
    }
}
