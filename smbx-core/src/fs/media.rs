//! src/fs/media.rs
//! ============================================================
//! Extension → media category lookup over a fixed table.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Image,
    Audio,
    Video,
    Other,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "bmp", "cur", "eps", "gif", "ico", "jpe", "jpg", "jpeg", "jpz", "png", "svg", "tif", "tiff",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "aiff", "ape", "caf", "flac", "m3u", "m4a", "mp3", "ogg", "wav", "wma",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "asf", "avi", "flv", "m3u8", "m4u", "m4v", "mkv", "mov", "mp4", "mpa", "mpe", "mpeg",
    "mpg", "ogm", "rm", "rmvb", "vob", "webm", "wmv",
];

/// Case-insensitive; a leading `.` is ignored.
#[must_use]
pub fn classify(extension: &str) -> MediaCategory {
    let ext: &str = extension.strip_prefix('.').unwrap_or(extension);

    let hit = |table: &[&str]| -> bool { table.iter().any(|e: &&str| e.eq_ignore_ascii_case(ext)) };

    if hit(IMAGE_EXTENSIONS) {
        MediaCategory::Image
    } else if hit(AUDIO_EXTENSIONS) {
        MediaCategory::Audio
    } else if hit(VIDEO_EXTENSIONS) {
        MediaCategory::Video
    } else {
        MediaCategory::Other
    }
}

#[must_use]
pub fn classify_name(name: &str) -> MediaCategory {
    classify(&extension_of(name))
}

/// Lower-cased text after the last `.`; empty if there is none.
#[must_use]
pub fn extension_of(name: &str) -> CompactString {
    name.rfind('.')
        .map(|i: usize| CompactString::new(name[i + 1..].to_lowercase()))
        .unwrap_or_default()
}
