//! Typed file descriptors produced by metadata resolution.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Bytes per megabyte as reported by the metadata service.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Extensions delivered as streamable media.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm"];

/// How a file is delivered to destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Streamable media.
    Video,
    /// Anything else, sent as a plain document.
    Document,
}

impl MediaKind {
    /// Classifies a file from the service category and its name.
    ///
    /// Category `"1"` is video; otherwise a streamable extension decides.
    #[must_use]
    pub fn classify(category: Option<&str>, name: &str) -> Self {
        if category.is_some_and(|c| c.trim() == "1") || has_video_extension(name) {
            Self::Video
        } else {
            Self::Document
        }
    }

    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    /// Whether the kind is streamable media.
    #[must_use]
    pub fn is_streamable(self) -> bool {
        matches!(self, Self::Video)
    }
}

fn has_video_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Resolved metadata for one file reachable from a link.
///
/// `transfer_url` is only valid for a short window; a failed transfer should
/// obtain a fresh descriptor through re-resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name reported by the service.
    pub name: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Delivery kind.
    pub kind: MediaKind,
    /// Direct, time-limited download URL.
    pub transfer_url: String,
    /// Link this file was resolved from.
    pub source_link: String,
}

impl FileDescriptor {
    /// Whether the file exceeds `max_bytes`.
    #[must_use]
    pub fn is_oversized(&self, max_bytes: u64) -> bool {
        self.size_bytes > max_bytes
    }
}

/// Converts a size in megabytes to bytes, truncating the fraction.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn mb_to_bytes(size_mb: f64) -> u64 {
    if !size_mb.is_finite() || size_mb <= 0.0 {
        return 0;
    }
    (size_mb * BYTES_PER_MB as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_category_one_is_video() {
        assert_eq!(MediaKind::classify(Some("1"), "notes.pdf"), MediaKind::Video);
    }

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(MediaKind::classify(None, "clip.MKV"), MediaKind::Video);
        assert_eq!(MediaKind::classify(Some("4"), "clip.webm"), MediaKind::Video);
        assert_eq!(MediaKind::classify(Some("4"), "archive.zip"), MediaKind::Document);
        assert_eq!(MediaKind::classify(None, "noext"), MediaKind::Document);
    }

    #[test]
    fn test_mb_to_bytes() {
        assert_eq!(mb_to_bytes(1.0), 1_048_576);
        assert_eq!(mb_to_bytes(10.0), 10_485_760);
        assert_eq!(mb_to_bytes(0.5), 524_288);
        assert_eq!(mb_to_bytes(-3.0), 0);
        assert_eq!(mb_to_bytes(f64::NAN), 0);
    }

    #[test]
    fn test_is_oversized_is_strict() {
        let d = FileDescriptor {
            name: "a".into(),
            size_bytes: 50 * BYTES_PER_MB,
            kind: MediaKind::Document,
            transfer_url: "http://x".into(),
            source_link: "l".into(),
        };
        assert!(!d.is_oversized(50 * BYTES_PER_MB));
        assert!(d.is_oversized(50 * BYTES_PER_MB - 1));
    }

    #[test]
    fn test_media_kind_serde_label() {
        let json = serde_json::to_string(&MediaKind::Video).unwrap_or_default();
        assert_eq!(json, "\"video\"");
        assert_eq!(MediaKind::Document.as_str(), "document");
    }
}
