//! Tile formats and the file extensions they are stored under.

use crate::error::StorageError;

/// A tile mime format and its storage file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MimeType {
    format: &'static str,
    extension: &'static str,
}

const KNOWN_FORMATS: &[MimeType] = &[
    MimeType::of("image/png", "png"),
    MimeType::of("image/png8", "png"),
    MimeType::of("image/png24", "png"),
    MimeType::of("image/png; mode=24bit", "png"),
    MimeType::of("image/jpeg", "jpeg"),
    MimeType::of("image/gif", "gif"),
    MimeType::of("image/tiff", "tiff"),
    MimeType::of("image/vnd.jpeg-png", "jpeg-png"),
    MimeType::of("image/vnd.jpeg-png8", "jpeg-png8"),
    MimeType::of("image/webp", "webp"),
    MimeType::of("application/vnd.mapbox-vector-tile", "pbf"),
    MimeType::of("application/json", "json"),
    MimeType::of("application/vnd.geo+json", "geojson"),
];

impl MimeType {
    const fn of(format: &'static str, extension: &'static str) -> Self {
        Self { format, extension }
    }

    /// Look up a mime format such as `image/png`.
    pub fn from_format(format: &str) -> Result<Self, StorageError> {
        KNOWN_FORMATS
            .iter()
            .find(|m| m.format.eq_ignore_ascii_case(format))
            .copied()
            .ok_or_else(|| StorageError::UnknownFormat(format.to_string()))
    }

    pub fn format(&self) -> &'static str {
        self.format
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// Whether a file name extension belongs to this format (case-insensitive).
    pub fn matches_extension(&self, extension: &str) -> bool {
        self.extension.eq_ignore_ascii_case(extension)
    }
}
