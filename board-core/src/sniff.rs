//! Media type inference from declared mime types and raw bytes.
//!
//! Uploaders frequently omit or mis-declare the mime type of an attachment.
//! When the declared type is absent or generic, the leading bytes are checked
//! against a small set of binary signatures:
//!
//! | Format | Signature                |
//! |--------|--------------------------|
//! | JPEG   | `FF D8`                  |
//! | PNG    | `89 50 4E 47`            |
//! | GIF    | `47 49 46`               |
//! | MP4    | `66 74 79 70` at offset 4 |
//!
//! Bytes that match no signature but decode as UTF-8 are plain text.

use serde::{Deserialize, Serialize};

/// Mime type reported for sniffed text.
pub const TEXT_PLAIN_UTF8: &str = "text/plain;charset=utf-8";

/// Mime type reported when nothing is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Broad media category, used to pick a resolution strategy and renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// `image/*`
    Image,
    /// `video/*`
    Video,
    /// `audio/*`
    Audio,
    /// `text/*` and JSON
    Text,
    /// Absent, generic or unknown.
    Other,
}

impl MediaKind {
    /// Classify a declared mime type.
    pub fn from_mime(mime: Option<&str>) -> Self {
        let Some(mime) = mime else {
            return Self::Other;
        };
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else if mime.starts_with("text/") || mime == "application/json" {
            Self::Text
        } else {
            Self::Other
        }
    }

    /// Whether this is an image.
    pub fn is_image(self) -> bool {
        self == Self::Image
    }
}

/// Result of a signature match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    /// Detected category.
    pub kind: MediaKind,
    /// Detected mime type.
    pub mime: &'static str,
}

/// Match the leading bytes against known binary signatures.
pub fn sniff(bytes: &[u8]) -> Option<Sniffed> {
    let found = |kind, mime| Some(Sniffed { kind, mime });

    if bytes.starts_with(&[0xFF, 0xD8]) {
        found(MediaKind::Image, "image/jpeg")
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        found(MediaKind::Image, "image/png")
    } else if bytes.starts_with(b"GIF") {
        found(MediaKind::Image, "image/gif")
    } else if bytes.get(4..8) == Some(b"ftyp".as_slice()) {
        found(MediaKind::Video, "video/mp4")
    } else {
        None
    }
}

/// Decide the final kind and mime type of resolved content.
///
/// A specific declared type wins. Otherwise the bytes are sniffed, then
/// treated as UTF-8 text if they decode, then left as an opaque stream.
pub fn classify(declared: Option<&str>, bytes: &[u8]) -> (MediaKind, String) {
    let kind = MediaKind::from_mime(declared);
    if kind != MediaKind::Other {
        if let Some(mime) = declared {
            return (kind, mime.trim().to_string());
        }
    }

    if let Some(sniffed) = sniff(bytes) {
        return (sniffed.kind, sniffed.mime.to_string());
    }
    if std::str::from_utf8(bytes).is_ok() {
        return (MediaKind::Text, TEXT_PLAIN_UTF8.to_string());
    }
    (MediaKind::Other, OCTET_STREAM.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_classification() {
        assert_eq!(MediaKind::from_mime(Some("image/png")), MediaKind::Image);
        assert_eq!(MediaKind::from_mime(Some("Video/MP4")), MediaKind::Video);
        assert_eq!(MediaKind::from_mime(Some("audio/ogg")), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime(Some("text/markdown")), MediaKind::Text);
        assert_eq!(MediaKind::from_mime(Some("application/json")), MediaKind::Text);
        assert_eq!(MediaKind::from_mime(Some("application/octet-stream")), MediaKind::Other);
        assert_eq!(MediaKind::from_mime(None), MediaKind::Other);
    }

    #[test]
    fn sniff_png() {
        let bytes = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let sniffed = sniff(&bytes).unwrap();
        assert_eq!(sniffed.kind, MediaKind::Image);
        assert_eq!(sniffed.mime, "image/png");
    }

    #[test]
    fn sniff_jpeg_and_gif() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap().mime, "image/jpeg");
        assert_eq!(sniff(b"GIF89a").unwrap().mime, "image/gif");
    }

    #[test]
    fn sniff_mp4_at_offset_four() {
        let bytes = [0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm'];
        let sniffed = sniff(&bytes).unwrap();
        assert_eq!(sniffed.kind, MediaKind::Video);
        assert_eq!(sniffed.mime, "video/mp4");

        // "ftyp" at the start is not a match
        assert!(sniff(b"ftypisom").is_none());
    }

    #[test]
    fn sniff_short_input() {
        assert!(sniff(&[]).is_none());
        assert!(sniff(&[0xFF]).is_none());
        assert!(sniff(&[0x89, 0x50]).is_none());
    }

    #[test]
    fn classify_prefers_specific_declared_type() {
        let png = [0x89, 0x50, 0x4E, 0x47];
        let (kind, mime) = classify(Some("video/webm"), &png);
        assert_eq!(kind, MediaKind::Video);
        assert_eq!(mime, "video/webm");
    }

    #[test]
    fn classify_corrects_generic_declared_type() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x00];
        let (kind, mime) = classify(Some("application/octet-stream"), &png);
        assert_eq!(kind, MediaKind::Image);
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn classify_text_fallback() {
        let (kind, mime) = classify(None, "hello, world".as_bytes());
        assert_eq!(kind, MediaKind::Text);
        assert_eq!(mime, TEXT_PLAIN_UTF8);
    }

    #[test]
    fn classify_opaque_binary() {
        let (kind, mime) = classify(None, &[0x00, 0x9F, 0x92, 0x96, 0xFE]);
        assert_eq!(kind, MediaKind::Other);
        assert_eq!(mime, OCTET_STREAM);
    }
}
