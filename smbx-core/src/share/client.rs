//! src/share/client.rs
//! ============================================================
//! The seam to the network file-share client library.
//!
//! Everything the core needs from the remote side goes through
//! [`ShareClient`]. Implementations are blocking; the core always calls
//! them from the blocking pool, never from an async worker directly.

use std::{
    fmt,
    io::{Read, Write},
    time::SystemTime,
};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::share::path::SharePath;

/// Username/password principal applied to every remote call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: CompactString,
    pub password: CompactString,
}

impl Credentials {
    /// Both fields must be non-empty, otherwise the session is anonymous.
    #[must_use]
    pub fn new(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() || password.is_empty() {
            return None;
        }

        Some(Self {
            username: CompactString::new(username),
            password: CompactString::new(password),
        })
    }
}

// Never print the password.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Entry type as reported by the share, with the client library's codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteKind {
    /// Ordinary file or folder on a share.
    Filesystem,
    Workgroup,
    Server,
    Share,
    NamedPipe,
    Printer,
    Comm,
}

impl RemoteKind {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Filesystem => 1,
            Self::Workgroup => 2,
            Self::Server => 4,
            Self::Share => 8,
            Self::NamedPipe => 16,
            Self::Printer => 32,
            Self::Comm => 64,
        }
    }
}

/// Metadata of a single remote location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStat {
    pub kind: RemoteKind,
    pub is_file: bool,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
}

/// One child of an enumerated directory.
///
/// `name` is raw: folders, shares and servers carry a trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    pub name: CompactString,
    pub path: SharePath,
    pub stat: RemoteStat,
}

pub type RemoteReader = Box<dyn Read + Send>;
pub type RemoteWriter = Box<dyn Write + Send>;

/// Blocking operations against the remote share.
///
/// `auth` is `None` for anonymous access.
pub trait ShareClient: Send + Sync + 'static {
    /// `Ok(None)` when nothing exists at `path`.
    fn stat(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<Option<RemoteStat>>;

    /// Immediate children of a directory.
    fn list(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<Vec<RemoteDirEntry>>;

    /// Raw child names only; cheaper than [`ShareClient::list`] for some backends.
    fn list_names(
        &self,
        auth: Option<&Credentials>,
        path: &SharePath,
    ) -> CoreResult<Vec<CompactString>> {
        Ok(self
            .list(auth, path)?
            .into_iter()
            .map(|entry: RemoteDirEntry| -> CompactString { entry.name })
            .collect())
    }

    fn open_read(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<RemoteReader>;

    /// Create or truncate a file for writing.
    fn open_write(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<RemoteWriter>;

    fn create_file(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()>;

    fn create_dir(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()>;

    /// Remove a file or a directory tree.
    fn delete(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()>;
}
