//! File entry definitions.
//!
//! These are the JSON shapes returned by the entry listing endpoint. Field
//! names follow the casing the web client already consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single file or directory entry beneath a library root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Entry name (final path segment).
    pub name: String,
    /// Containing directory relative to the library root, `/`-prefixed.
    pub parent: String,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Coarse content category.
    pub category: EntryCategory,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

/// Coarse content category used by clients to pick icons and viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryCategory {
    Folder,
    Document,
    Image,
    Video,
    Audio,
    Archive,
    Binary,
}

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "txt", "md", "pdf", "doc", "docx", "odt", "rtf", "epub", "mobi", "csv", "json", "xml",
    "html", "htm", "xls", "xlsx", "ods", "ppt", "pptx", "odp", "log", "yaml", "yml", "toml",
];
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "tif", "tiff", "heic", "ico", "avif",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "m4v", "wmv", "flv", "mpg", "mpeg", "ts",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "wma"];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "zst"];

impl EntryCategory {
    /// Categorise a file by its extension. Matching is case-insensitive.
    pub fn from_extension(extension: Option<&str>) -> Self {
        let Some(extension) = extension else {
            return EntryCategory::Binary;
        };
        let extension = extension.to_ascii_lowercase();
        let ext = extension.as_str();

        if DOCUMENT_EXTENSIONS.contains(&ext) {
            EntryCategory::Document
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            EntryCategory::Image
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            EntryCategory::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            EntryCategory::Audio
        } else if ARCHIVE_EXTENSIONS.contains(&ext) {
            EntryCategory::Archive
        } else {
            EntryCategory::Binary
        }
    }
}
