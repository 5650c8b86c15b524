//! src/fs/dir_lister.rs
//! ============================================================
//! Remote directory listing: enumerate, filter, classify, sort.
//!
//! Ordering of `list_entries`:
//!   1. kind descending (shares, servers, directories, then files)
//!   2. collated display name ascending
//! The sort is stable; ties keep enumeration order.

use std::time::Instant;

use compact_str::CompactString;
use tracing::{debug, info, instrument};

use crate::error::{CoreError, CoreResult};
use crate::fs::collator::{NameCollator, NameComparator};
use crate::fs::entry_info::{EntryInfo, display_name};
use crate::fs::media::{self, MediaCategory};
use crate::share::client::{RemoteDirEntry, RemoteKind, RemoteStat};
use crate::share::path::SharePath;
use crate::share::session::ShareSession;

/// Administrative shares (`IPC$`, `C$`, ...) end with this raw suffix.
pub const ADMIN_MARKER: &str = "$/";

#[derive(Debug, Clone)]
pub struct DirectoryLister {
    session: ShareSession,
    collator: NameCollator,
}

impl DirectoryLister {
    #[must_use]
    pub fn new(session: ShareSession, collator: NameCollator) -> Self {
        Self { session, collator }
    }

    #[must_use]
    pub fn session(&self) -> &ShareSession {
        &self.session
    }

    /// Only on-disk entries and network shares are browsable.
    fn is_listable(entry: &RemoteDirEntry) -> bool {
        matches!(entry.stat.kind, RemoteKind::Filesystem | RemoteKind::Share)
            && !entry.name.ends_with(ADMIN_MARKER)
    }

    fn is_directory(stat: Option<&RemoteStat>) -> bool {
        stat.is_some_and(|s: &RemoteStat| s.is_dir)
    }

    /// Blocking listing; run on the blocking pool.
    ///
    /// A missing path or a plain file yields an empty list.
    pub fn list_entries_blocking(&self, dir: &SharePath) -> CoreResult<Vec<EntryInfo>> {
        let start: Instant = Instant::now();

        if !Self::is_directory(self.session.stat(dir)?.as_ref()) {
            debug!(
                marker = "LISTING",
                operation_type = "list_entries",
                path = %dir,
                "Not a directory, returning empty listing"
            );
            return Ok(Vec::new());
        }

        let raw: Vec<RemoteDirEntry> = self.session.list(dir)?;
        let total: usize = raw.len();

        let mut entries: Vec<EntryInfo> = raw
            .iter()
            .filter(|e: &&RemoteDirEntry| Self::is_listable(e))
            .map(EntryInfo::from_remote)
            .collect();

        let comparator: NameComparator = self.collator.comparator();
        entries.sort_by(|a: &EntryInfo, b: &EntryInfo| {
            b.kind
                .cmp(&a.kind)
                .then_with(|| comparator.compare(&a.name, &b.name))
        });

        info!(
            marker = "LISTING",
            operation_type = "list_entries",
            path = %dir,
            enumerated = total,
            kept = entries.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Directory listed"
        );

        Ok(entries)
    }

    /// Image children as full paths, ordered by collated raw name only.
    pub fn list_images_blocking(&self, dir: &SharePath) -> CoreResult<Vec<SharePath>> {
        if !Self::is_directory(self.session.stat(dir)?.as_ref()) {
            return Ok(Vec::new());
        }

        let mut names: Vec<CompactString> = self.session.list_names(dir)?;
        self.collator
            .sort_by_key(&mut names, |n: &CompactString| n.as_str());

        let dir: SharePath = dir.to_dir_form();
        let mut images: Vec<SharePath> = Vec::new();

        for name in names
            .iter()
            .filter(|n: &&CompactString| !n.ends_with('/'))
            .filter(|n: &&CompactString| {
                media::classify_name(display_name(n)) == MediaCategory::Image
            })
        {
            images.push(dir.join(name)?);
        }

        debug!(
            marker = "LISTING",
            operation_type = "list_images",
            path = %dir,
            images = images.len(),
            "Image listing built"
        );

        Ok(images)
    }

    #[instrument(level = "debug", skip(self), fields(path = %dir))]
    pub async fn list_entries(&self, dir: SharePath) -> CoreResult<Vec<EntryInfo>> {
        let lister: Self = self.clone();

        tokio::task::spawn_blocking(move || lister.list_entries_blocking(&dir))
            .await
            .map_err(CoreError::from)?
    }

    #[instrument(level = "debug", skip(self), fields(path = %dir))]
    pub async fn list_images(&self, dir: SharePath) -> CoreResult<Vec<SharePath>> {
        let lister: Self = self.clone();

        tokio::task::spawn_blocking(move || lister.list_images_blocking(&dir))
            .await
            .map_err(CoreError::from)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::entry_info::EntryKind;
    use crate::share::memory::MemoryShare;
    use std::sync::Arc;

    fn fixture() -> MemoryShare {
        MemoryShare::new()
            .with_dir("smb://nas", RemoteKind::Server)
            .with_dir("smb://nas/media", RemoteKind::Share)
            .with_dir("smb://nas/IPC$", RemoteKind::Share)
            .with_dir("smb://nas/printer", RemoteKind::Printer)
            .with_dir("smb://nas/media/zeta", RemoteKind::Filesystem)
            .with_dir("smb://nas/media/Alpha", RemoteKind::Filesystem)
            .with_file("smb://nas/media/b.JPG", b"img")
            .with_file("smb://nas/media/a.png", b"img")
            .with_file("smb://nas/media/readme.txt", b"hello")
            .with_file("smb://nas/media/中.jpg", b"img")
            .with_file("smb://nas/media/阿.jpg", b"img")
    }

    fn lister(share: MemoryShare) -> DirectoryLister {
        DirectoryLister::new(ShareSession::new(Arc::new(share)), NameCollator::default())
    }

    fn path(s: &str) -> SharePath {
        SharePath::parse(s).unwrap()
    }

    #[test]
    fn test_listing_sorted_by_kind_then_collation() {
        let lister = lister(fixture());
        let entries = lister.list_entries_blocking(&path("smb://nas/media/")).unwrap();

        // zh collation places Han before Latin.
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Alpha", "zeta", "阿.jpg", "中.jpg", "a.png", "b.JPG", "readme.txt"]
        );

        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[2].kind, EntryKind::File);
        assert_eq!(entries[4].path.as_str(), "smb://nas/media/a.png");
    }

    #[test]
    fn test_names_non_decreasing_within_each_kind() {
        let share = fixture()
            .with_dir("smb://nas/media/Beta", RemoteKind::Filesystem)
            .with_dir("smb://nas/media/été", RemoteKind::Filesystem)
            .with_file("smb://nas/media/Zoo.mp4", b"vid")
            .with_file("smb://nas/media/_notes.md", b"n");
        let lister = lister(share);
        let comparator = NameCollator::default().comparator();

        let entries = lister.list_entries_blocking(&path("smb://nas/media/")).unwrap();
        assert_eq!(entries.len(), 11);

        for pair in entries.windows(2) {
            assert!(pair[0].kind >= pair[1].kind);
            if pair[0].kind == pair[1].kind {
                assert_ne!(
                    comparator.compare(&pair[0].name, &pair[1].name),
                    std::cmp::Ordering::Greater,
                    "{} sorted before {}",
                    pair[0].name,
                    pair[1].name
                );
            }
        }
    }

    #[test]
    fn test_admin_and_foreign_types_are_dropped() {
        let lister = lister(fixture());
        let entries = lister.list_entries_blocking(&path("smb://nas/")).unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["media"]);
        assert_eq!(entries[0].kind, EntryKind::Share);
    }

    #[test]
    fn test_missing_or_file_path_is_empty() {
        let lister = lister(fixture());
        assert!(lister.list_entries_blocking(&path("smb://nas/nope/")).unwrap().is_empty());
        assert!(
            lister
                .list_entries_blocking(&path("smb://nas/media/readme.txt"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_enumeration_failure_is_remote_io() {
        let share = fixture();
        share.fail_list("smb://nas/media");
        let lister = lister(share);

        let err = lister.list_entries_blocking(&path("smb://nas/media/")).unwrap_err();
        assert!(matches!(err, CoreError::RemoteIo { .. }));
    }

    #[test]
    fn test_image_listing_uses_collation_only() {
        let lister = lister(fixture());
        let images = lister.list_images_blocking(&path("smb://nas/media")).unwrap();

        let paths: Vec<&str> = images.iter().map(SharePath::as_str).collect();
        assert_eq!(
            paths,
            vec![
                "smb://nas/media/阿.jpg",
                "smb://nas/media/中.jpg",
                "smb://nas/media/a.png",
                "smb://nas/media/b.JPG",
            ]
        );
    }

    #[tokio::test]
    async fn test_async_listing_runs_off_thread() {
        let lister = lister(fixture());
        let entries = lister.list_entries(path("smb://nas/media/")).await.unwrap();
        assert_eq!(entries.len(), 7);
    }
}
