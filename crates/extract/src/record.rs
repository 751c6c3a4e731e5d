use std::path::{Path, PathBuf};

use snapsort_geo::Coordinate;
use time::PrimitiveDateTime;

/// A media file together with whatever capture metadata could be
/// recovered for it. Either of the optional fields may be absent;
/// downstream placement degrades gracefully in that case.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    /// Absolute path of the file on disk.
    pub source: PathBuf,
    /// Original file name, including its extension.
    pub file_name: String,
    /// Lowercased extension with its leading dot, or empty.
    pub extension: String,
    /// Moment of capture, as recorded by the device (no timezone).
    pub captured_at: Option<PrimitiveDateTime>,
    /// Capture location, when the file carries valid GPS tags.
    pub coordinate: Option<Coordinate>,
    /// File size in bytes.
    pub size: u64,
}

impl MediaRecord {
    pub fn new(source: PathBuf, size: u64) -> Self {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = extension_of(&source);
        Self {
            source,
            file_name,
            extension,
            captured_at: None,
            coordinate: None,
            size,
        }
    }

    /// File name without its extension, used when rendering the
    /// destination file name.
    pub fn stem(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(at) if at > 0 => &self.file_name[..at],
            _ => &self.file_name,
        }
    }
}

/// Lowercased extension of `path` with a leading dot, or the empty
/// string when the path has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
