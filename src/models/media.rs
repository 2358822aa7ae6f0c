//! Media-type and geometry helpers shared by the upload paths.

use std::fmt;

/// The only container accepted for video uploads.
pub const VIDEO_MP4: &str = "video/mp4";

/// Accepted thumbnail image types.
pub const THUMBNAIL_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Coarse orientation bucket used to namespace storage keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AspectClass {
    Landscape,
    Portrait,
    Other,
}

impl AspectClass {
    /// Bucket a width/height ratio. Both bands are open intervals, so the
    /// boundary values themselves land in `Other`.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 1.7 && ratio < 1.8 {
            AspectClass::Landscape
        } else if ratio > 0.5 && ratio < 0.6 {
            AspectClass::Portrait
        } else {
            AspectClass::Other
        }
    }

    /// Returns `None` for a zero height.
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        if height == 0 {
            return None;
        }
        Some(Self::from_ratio(f64::from(width) / f64::from(height)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectClass::Landscape => "landscape",
            AspectClass::Portrait => "portrait",
            AspectClass::Other => "other",
        }
    }
}

impl fmt::Display for AspectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip parameters from a `Content-Type` value and normalize case,
/// e.g. `Video/MP4; codecs="avc1"` becomes `video/mp4`.
///
/// Returns `None` when the value is not of the form `type/subtype`.
pub fn media_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let (kind, subtype) = essence.split_once('/')?;
    if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
        return None;
    }
    if essence.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return None;
    }
    Some(essence)
}

/// File extension for a normalized media type: its subtype.
pub fn extension_for(media_type: &str) -> &str {
    media_type
        .split_once('/')
        .map(|(_, subtype)| subtype)
        .unwrap_or("bin")
}
