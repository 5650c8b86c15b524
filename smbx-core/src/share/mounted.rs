//! src/share/mounted.rs
//! ============================================================
//! [`ShareClient`] over a share tree mounted under a local directory.
//!
//! Layout under `root`:
//!   `root/<server>/<share>/<path...>`
//!
//! First-level directories are reported as servers, second-level ones as
//! shares, and everything deeper as ordinary filesystem entries. The mount
//! is already authenticated by the OS, so credentials are only logged.

use std::{
    ffi::OsStr,
    fs::{self, File, Metadata, OpenOptions},
    io::{Error as IoError, ErrorKind},
    path::PathBuf,
    time::UNIX_EPOCH,
};

use compact_str::{CompactString, format_compact};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::share::client::{
    Credentials, RemoteDirEntry, RemoteKind, RemoteReader, RemoteStat, RemoteWriter, ShareClient,
};
use crate::share::path::SharePath;

/// Writable entries start inside a share.
const MIN_WRITABLE_DEPTH: usize = 3;

#[derive(Debug, Clone)]
pub struct MountedShare {
    root: PathBuf,
}

impl MountedShare {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn local_path(&self, path: &SharePath) -> PathBuf {
        let mut local: PathBuf = self.root.clone();
        local.extend(path.segments());
        local
    }

    const fn kind_at_depth(depth: usize) -> RemoteKind {
        match depth {
            0 => RemoteKind::Workgroup,
            1 => RemoteKind::Server,
            2 => RemoteKind::Share,
            _ => RemoteKind::Filesystem,
        }
    }

    fn stat_from_meta(depth: usize, meta: &Metadata) -> RemoteStat {
        let is_file: bool = meta.is_file();

        RemoteStat {
            kind: if is_file {
                RemoteKind::Filesystem
            } else {
                Self::kind_at_depth(depth)
            },
            is_file,
            is_dir: meta.is_dir(),
            size: if is_file { meta.len() } else { 0 },
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
        }
    }

    fn ensure_writable(path: &SharePath) -> CoreResult<()> {
        if path.depth() < MIN_WRITABLE_DEPTH {
            return Err(CoreError::remote_io(
                path.as_str(),
                IoError::new(
                    ErrorKind::PermissionDenied,
                    "servers and shares cannot be modified",
                ),
            ));
        }

        Ok(())
    }

    fn log_principal(auth: Option<&Credentials>, path: &SharePath) {
        debug!(
            marker = "MOUNTED_SHARE",
            path = %path,
            username = auth.map_or("", |c| c.username.as_str()),
            "Mounted share access"
        );
    }
}

impl ShareClient for MountedShare {
    fn stat(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<Option<RemoteStat>> {
        Self::log_principal(auth, path);

        match fs::metadata(self.local_path(path)) {
            Ok(meta) => Ok(Some(Self::stat_from_meta(path.depth(), &meta))),

            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),

            Err(e) => Err(CoreError::remote_io(path.as_str(), e)),
        }
    }

    fn list(
        &self,
        auth: Option<&Credentials>,
        path: &SharePath,
    ) -> CoreResult<Vec<RemoteDirEntry>> {
        Self::log_principal(auth, path);

        let local: PathBuf = self.local_path(path);
        let child_depth: usize = path.depth() + 1;
        let read_dir = fs::read_dir(&local)
            .map_err(|e: IoError| CoreError::remote_io(path.as_str(), e))?;

        let mut entries: Vec<RemoteDirEntry> = Vec::new();

        for entry in read_dir {
            let entry = entry.map_err(|e: IoError| CoreError::remote_io(path.as_str(), e))?;
            let entry_path: PathBuf = entry.path();

            let Some(file_name) = entry_path.file_name().and_then(OsStr::to_str) else {
                warn!(
                    marker = "MOUNTED_SHARE",
                    entry = %entry_path.display(),
                    "Skipping entry with non UTF-8 name"
                );
                continue;
            };

            // Follow symlinks the way a share server would present them.
            let meta: Metadata = fs::metadata(&entry_path)
                .map_err(|e: IoError| CoreError::remote_io(path.as_str(), e))?;

            let stat: RemoteStat = Self::stat_from_meta(child_depth, &meta);

            let name: CompactString = if stat.is_dir {
                format_compact!("{file_name}/")
            } else {
                CompactString::new(file_name)
            };

            let child: SharePath = path.join(&name)?;

            entries.push(RemoteDirEntry {
                name,
                path: child,
                stat,
            });
        }

        Ok(entries)
    }

    fn open_read(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<RemoteReader> {
        Self::log_principal(auth, path);

        let file: File = File::open(self.local_path(path))
            .map_err(|e: IoError| CoreError::remote_io(path.as_str(), e))?;

        Ok(Box::new(file))
    }

    fn open_write(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<RemoteWriter> {
        Self::log_principal(auth, path);
        Self::ensure_writable(path)?;

        let file: File = File::create(self.local_path(path))
            .map_err(|e: IoError| CoreError::remote_io(path.as_str(), e))?;

        Ok(Box::new(file))
    }

    fn create_file(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()> {
        Self::log_principal(auth, path);
        Self::ensure_writable(path)?;

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.local_path(path))
            .map(|_file: File| ())
            .map_err(|e: IoError| CoreError::remote_io(path.as_str(), e))
    }

    fn create_dir(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()> {
        Self::log_principal(auth, path);
        Self::ensure_writable(path)?;

        fs::create_dir(self.local_path(path))
            .map_err(|e: IoError| CoreError::remote_io(path.as_str(), e))
    }

    fn delete(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()> {
        Self::log_principal(auth, path);
        Self::ensure_writable(path)?;

        let local: PathBuf = self.local_path(path);
        let meta: Metadata =
            fs::metadata(&local).map_err(|e: IoError| CoreError::remote_io(path.as_str(), e))?;

        let result: Result<(), IoError> = if meta.is_dir() {
            fs::remove_dir_all(&local)
        } else {
            fs::remove_file(&local)
        };

        result.map_err(|e: IoError| CoreError::remote_io(path.as_str(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn mounted() -> (TempDir, MountedShare) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nas/media/photos")).unwrap();
        fs::create_dir_all(dir.path().join("nas/IPC$")).unwrap();
        fs::write(dir.path().join("nas/media/notes.txt"), b"hello").unwrap();
        let share = MountedShare::new(dir.path());
        (dir, share)
    }

    #[test]
    fn test_kinds_follow_depth() {
        let (_dir, share) = mounted();

        let server = share.list(None, &SharePath::root()).unwrap();
        assert_eq!(server.len(), 1);
        assert_eq!(server[0].name, "nas/");
        assert_eq!(server[0].stat.kind, RemoteKind::Server);

        let shares = share
            .list(None, &SharePath::parse("smb://nas/").unwrap())
            .unwrap();
        assert!(shares.iter().all(|e| e.stat.kind == RemoteKind::Share));
        assert!(shares.iter().any(|e| e.name == "IPC$/"));

        let inner = share
            .list(None, &SharePath::parse("smb://nas/media/").unwrap())
            .unwrap();
        let notes = inner.iter().find(|e| e.name == "notes.txt").unwrap();
        assert!(notes.stat.is_file);
        assert_eq!(notes.stat.size, 5);
        assert_eq!(notes.path.as_str(), "smb://nas/media/notes.txt");
    }

    #[test]
    fn test_stat_missing_is_none() {
        let (_dir, share) = mounted();
        let missing = SharePath::parse("smb://nas/media/nope").unwrap();
        assert!(share.stat(None, &missing).unwrap().is_none());
    }

    #[test]
    fn test_write_read_delete() {
        let (_dir, share) = mounted();
        let path = SharePath::parse("smb://nas/media/new.bin").unwrap();

        let mut writer = share.open_write(None, &path).unwrap();
        writer.write_all(b"abc").unwrap();
        drop(writer);

        let mut buf = Vec::new();
        share.open_read(None, &path).unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"abc");

        share.delete(None, &path).unwrap();
        assert!(share.stat(None, &path).unwrap().is_none());
    }

    #[test]
    fn test_shares_are_read_only() {
        let (_dir, share) = mounted();
        let err = share
            .create_dir(None, &SharePath::parse("smb://nas/newshare").unwrap())
            .unwrap_err();
        assert!(matches!(err, CoreError::RemoteIo { kind: ErrorKind::PermissionDenied, .. }));
    }
}
