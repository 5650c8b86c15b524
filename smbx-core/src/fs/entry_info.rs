//! src/fs/entry_info.rs
//! ============================================================
//! One remote file-system entry as handed to the UI shell.
//!
//! Serialized shape (camelCase keys, as the shell expects):
//!   `{ name, ext, type, path, size, lastModified }`
//! where `type` is the numeric kind code and `lastModified` is epoch millis.

use std::{fmt, time::SystemTime};

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fs::media::{self, MediaCategory};
use crate::share::client::{RemoteDirEntry, RemoteKind, RemoteStat};
use crate::share::path::SharePath;

// ------------------------------------------------------------
// EntryKind: ordered by the share browser's type codes.
// ------------------------------------------------------------

/// Declaration order is the sort order: containers rank above files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EntryKind {
    File,
    Directory,
    Server,
    Share,
}

impl EntryKind {
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::File => 0,
            Self::Directory => 1,
            Self::Server => 4,
            Self::Share => 8,
        }
    }

    /// Plain files are always `File`, whatever richer type the share reports.
    #[must_use]
    pub const fn from_stat(stat: &RemoteStat) -> Self {
        if stat.is_file {
            return Self::File;
        }

        match stat.kind {
            RemoteKind::Share => Self::Share,
            RemoteKind::Server | RemoteKind::Workgroup => Self::Server,
            _ => Self::Directory,
        }
    }
}

impl From<EntryKind> for u8 {
    fn from(kind: EntryKind) -> Self {
        kind.code()
    }
}

impl TryFrom<u8> for EntryKind {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::File),
            1 => Ok(Self::Directory),
            4 => Ok(Self::Server),
            8 => Ok(Self::Share),
            other => Err(CoreError::invalid_input(
                "type",
                &format!("unknown entry kind code {other}"),
            )),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "File"),
            Self::Directory => write!(f, "Directory"),
            Self::Server => write!(f, "Server"),
            Self::Share => write!(f, "Share"),
        }
    }
}

// ------------------------------------------------------------
// EntryInfo: immutable, built fresh for every listing.
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    pub name: CompactString,

    /// Lower-case text after the last `.`, empty if none.
    #[serde(rename = "ext")]
    pub extension: CompactString,

    #[serde(rename = "type")]
    pub kind: EntryKind,

    pub path: SharePath,

    /// 0 for anything that is not a plain file.
    pub size: u64,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
}

// Identity is the remote location only.
impl PartialEq for EntryInfo {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for EntryInfo {}

impl EntryInfo {
    /// Build from one enumerated child; the raw name's trailing `/` is stripped.
    #[must_use]
    pub fn from_remote(entry: &RemoteDirEntry) -> Self {
        Self::from_stat(&entry.name, entry.path.clone(), &entry.stat)
    }

    #[must_use]
    pub fn from_stat(raw_name: &str, path: SharePath, stat: &RemoteStat) -> Self {
        let name: &str = display_name(raw_name);
        let kind: EntryKind = EntryKind::from_stat(stat);

        Self {
            name: CompactString::new(name),
            extension: media::extension_of(name),
            kind,
            path,
            size: if kind == EntryKind::File { stat.size } else { 0 },
            last_modified: DateTime::<Utc>::from(stat.modified),
        }
    }

    /// Entry for something just created or written, stamped with `written_at`.
    #[must_use]
    pub fn written(path: SharePath, kind: EntryKind, size: u64, written_at: SystemTime) -> Self {
        let name: CompactString = CompactString::new(path.file_name());

        Self {
            extension: media::extension_of(&name),
            name,
            kind,
            path,
            size,
            last_modified: DateTime::<Utc>::from(written_at),
        }
    }

    #[must_use]
    pub fn category(&self) -> MediaCategory {
        media::classify(&self.extension)
    }

    #[must_use]
    pub fn size_human(&self) -> String {
        ByteSize(self.size).to_string()
    }
}

/// Raw listing names carry a trailing `/` for containers.
#[inline]
#[must_use]
pub fn display_name(raw: &str) -> &str {
    raw.strip_suffix('/').unwrap_or(raw)
}
