//! src/tasks/transfer_task.rs
//! ============================================================================
//! # Transfer Task: chunked upload/download with progress tracking
//!
//! Streams bytes between a local file and a remote share location in
//! fixed-size chunks. Progress is reported after every chunk; a
//! [`CancellationToken`] is honoured between chunks. Both stream handles
//! are owned by the copy call and dropped on every exit path.

use std::{
    fmt,
    fs::{self, File},
    io::{Error as IoError, ErrorKind, Read, Write},
    path::{Path, PathBuf},
    time::{Instant, SystemTime},
};

use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::fs::entry_info::{EntryInfo, EntryKind};
use crate::share::client::{RemoteReader, RemoteStat, RemoteWriter};
use crate::share::path::SharePath;
use crate::share::session::ShareSession;

pub const DEFAULT_CHUNK_SIZE: usize = 8192;

// ------------------------------------------------------------
// Progress
// ------------------------------------------------------------

/// One progress notification, emitted after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferProgress {
    /// Bytes copied so far.
    pub transferred: u64,
    /// Expected total; 0 for empty sources.
    pub total: u64,
    /// Bytes copied by the chunk that produced this event.
    pub chunk: u64,
}

impl TransferProgress {
    /// Completed share in `[0.0, 1.0]`; an empty source counts as complete.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let ratio: f64 = self.transferred as f64 / self.total as f64;
        ratio.min(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferDirection {
    Upload { local: PathBuf, remote: SharePath },
    Download { remote: SharePath, local: PathBuf },
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload { .. } => write!(f, "Upload"),
            Self::Download { .. } => write!(f, "Download"),
        }
    }
}

// ------------------------------------------------------------
// Engine
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TransferEngine {
    session: ShareSession,
    chunk_size: usize,
}

impl TransferEngine {
    #[must_use]
    pub fn new(session: ShareSession) -> Self {
        Self {
            session,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copy `local` to `remote`, returning the entry that now exists remotely.
    pub fn upload_blocking(
        &self,
        local: &Path,
        remote: &SharePath,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(TransferProgress),
    ) -> CoreResult<EntryInfo> {
        let start: Instant = Instant::now();
        let local_label: String = local.display().to_string();

        let mut source: File = File::open(local)
            .map_err(|e: IoError| CoreError::transfer(&local_label, "open local source", e))?;

        let total: u64 = source
            .metadata()
            .map_err(|e: IoError| CoreError::transfer(&local_label, "read local length", e))?
            .len();

        let mut dest: RemoteWriter = self
            .session
            .open_write(remote)
            .map_err(|e: CoreError| as_transfer(e, "open remote destination"))?;

        let copied: u64 = copy_chunks(
            &mut source,
            &mut dest,
            &CopyPlan {
                source: &local_label,
                dest: remote.as_str(),
                total,
                chunk_size: self.chunk_size,
            },
            cancel,
            on_progress,
        )?;

        dest.flush().map_err(|e: IoError| {
            CoreError::transfer(remote.as_str(), "flush remote destination", e)
        })?;
        drop(dest);
        drop(source);

        let written_at: SystemTime = SystemTime::now();
        let final_size: u64 = match self.session.stat(remote) {
            Ok(Some(stat)) => stat.size,

            Ok(None) | Err(_) => {
                warn!(
                    marker = "TRANSFER",
                    operation_type = "upload",
                    remote = %remote,
                    "Could not re-read uploaded size, using copied byte count"
                );
                copied
            }
        };

        info!(
            marker = "TRANSFER",
            operation_type = "upload",
            local = %local_label,
            remote = %remote,
            bytes = copied,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upload complete"
        );

        Ok(EntryInfo::written(
            remote.clone(),
            EntryKind::File,
            final_size,
            written_at,
        ))
    }

    /// Copy `remote` to `local`, returning the local path written.
    pub fn download_blocking(
        &self,
        remote: &SharePath,
        local: &Path,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(TransferProgress),
    ) -> CoreResult<PathBuf> {
        let start: Instant = Instant::now();
        let local_label: String = local.display().to_string();

        let stat: RemoteStat = self
            .session
            .stat(remote)
            .map_err(|e: CoreError| as_transfer(e, "stat remote source"))?
            .ok_or_else(|| {
                CoreError::transfer(
                    remote.as_str(),
                    "remote source does not exist",
                    IoError::from(ErrorKind::NotFound),
                )
            })?;

        let mut source: RemoteReader = self
            .session
            .open_read(remote)
            .map_err(|e: CoreError| as_transfer(e, "open remote source"))?;

        if let Some(parent) = local.parent().filter(|p: &&Path| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e: IoError| {
                CoreError::transfer(&local_label, "create local directory", e)
            })?;
        }

        let mut dest: File = File::create(local).map_err(|e: IoError| {
            CoreError::transfer(&local_label, "create local destination", e)
        })?;

        let copied: u64 = copy_chunks(
            &mut source,
            &mut dest,
            &CopyPlan {
                source: remote.as_str(),
                dest: &local_label,
                total: stat.size,
                chunk_size: self.chunk_size,
            },
            cancel,
            on_progress,
        )?;

        dest.flush()
            .map_err(|e: IoError| CoreError::transfer(&local_label, "flush local destination", e))?;

        info!(
            marker = "TRANSFER",
            operation_type = "download",
            remote = %remote,
            local = %local_label,
            bytes = copied,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Download complete"
        );

        Ok(local.to_path_buf())
    }

    /// Run an upload on the blocking pool.
    #[must_use]
    pub fn spawn_upload(&self, local: PathBuf, remote: SharePath) -> TransferHandle<EntryInfo> {
        let direction = TransferDirection::Upload {
            local: local.clone(),
            remote: remote.clone(),
        };
        let engine: Self = self.clone();

        TransferHandle::spawn(direction, move |cancel, on_progress| {
            engine.upload_blocking(&local, &remote, cancel, on_progress)
        })
    }

    /// Run a download on the blocking pool.
    #[must_use]
    pub fn spawn_download(&self, remote: SharePath, local: PathBuf) -> TransferHandle<PathBuf> {
        let direction = TransferDirection::Download {
            remote: remote.clone(),
            local: local.clone(),
        };
        let engine: Self = self.clone();

        TransferHandle::spawn(direction, move |cancel, on_progress| {
            engine.download_blocking(&remote, &local, cancel, on_progress)
        })
    }
}

// ------------------------------------------------------------
// Chunk loop
// ------------------------------------------------------------

struct CopyPlan<'a> {
    source: &'a str,
    dest: &'a str,
    total: u64,
    chunk_size: usize,
}

/// Remote open/stat failures of a transfer surface as transfer failures.
fn as_transfer(err: CoreError, reason: &str) -> CoreError {
    match err {
        CoreError::RemoteIo { path, source, .. } => CoreError::Transfer {
            path,
            reason: reason.into(),
            source,
        },

        other => other,
    }
}

fn copy_chunks(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    plan: &CopyPlan<'_>,
    cancel: &CancellationToken,
    on_progress: &mut dyn FnMut(TransferProgress),
) -> CoreResult<u64> {
    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }

    let total: u64 = plan.total;
    let mut buffer: Vec<u8> = vec![0; plan.chunk_size];
    let mut transferred: u64 = 0;

    // Nothing to divide by: report completion once.
    if total == 0 {
        on_progress(TransferProgress {
            transferred: 0,
            total: 0,
            chunk: 0,
        });
    }

    loop {
        let read: usize = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CoreError::transfer(plan.source, "read failed", e)),
        };

        writer
            .write_all(&buffer[..read])
            .map_err(|e: IoError| CoreError::transfer(plan.dest, "write failed", e))?;

        transferred += read as u64;

        if total > 0 {
            on_progress(TransferProgress {
                transferred,
                total,
                chunk: read as u64,
            });
        }

        if cancel.is_cancelled() {
            info!(
                marker = "TRANSFER",
                operation_type = "cancel",
                source = plan.source,
                transferred,
                "Transfer cancelled between chunks"
            );
            return Err(CoreError::Cancelled);
        }
    }

    Ok(transferred)
}

// ------------------------------------------------------------
// Async handle
// ------------------------------------------------------------

/// A transfer running on the blocking pool.
///
/// The progress channel closes when the copy finishes, successfully or not.
/// Dropping the handle cancels the copy after its current chunk.
#[derive(Debug)]
pub struct TransferHandle<T> {
    pub id: String,
    pub direction: TransferDirection,
    pub progress: mpsc::UnboundedReceiver<TransferProgress>,
    join: JoinHandle<CoreResult<T>>,
    _cancel_on_drop: DropGuard,
}

impl<T: Send + 'static> TransferHandle<T> {
    fn spawn<F>(direction: TransferDirection, job: F) -> Self
    where
        F: FnOnce(&CancellationToken, &mut dyn FnMut(TransferProgress)) -> CoreResult<T>
            + Send
            + 'static,
    {
        let id: String = nanoid::nanoid!();
        let cancel: CancellationToken = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel::<TransferProgress>();

        info!(
            marker = "TRANSFER",
            operation_type = "spawn",
            transfer_id = %id,
            direction = %direction,
            "Transfer queued"
        );

        let worker_cancel: CancellationToken = cancel.clone();
        let join: JoinHandle<CoreResult<T>> = tokio::task::spawn_blocking(move || {
            // A dropped receiver only means nobody is watching progress.
            let mut forward = |p: TransferProgress| {
                let _ = tx.send(p);
            };
            job(&worker_cancel, &mut forward)
        });

        Self {
            id,
            direction,
            progress: rx,
            join,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }

    /// Forward every progress event to `on_progress`, then resolve the result.
    pub async fn drive(mut self, mut on_progress: impl FnMut(TransferProgress)) -> CoreResult<T> {
        while let Some(progress) = self.progress.recv().await {
            on_progress(progress);
        }

        self.join.await.map_err(CoreError::from)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::client::RemoteKind;
    use crate::share::memory::MemoryShare;
    use std::sync::{Arc, mpsc as std_mpsc};
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (Arc<MemoryShare>, TransferEngine) {
        let share = Arc::new(
            MemoryShare::new()
                .with_dir("smb://nas", RemoteKind::Server)
                .with_dir("smb://nas/media", RemoteKind::Share),
        );
        let engine = TransferEngine::new(ShareSession::new(share.clone()));
        (share, engine)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn remote(s: &str) -> SharePath {
        SharePath::parse(s).unwrap()
    }

    #[test]
    fn test_upload_reports_every_chunk() {
        let (share, engine) = setup();
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("big.bin");
        fs::write(&local, payload(20_000)).unwrap();

        let mut events: Vec<TransferProgress> = Vec::new();
        let entry = engine
            .upload_blocking(
                &local,
                &remote("smb://nas/media/big.bin"),
                &CancellationToken::new(),
                &mut |p| events.push(p),
            )
            .unwrap();

        assert_eq!(entry.name, "big.bin");
        assert_eq!(entry.extension, "bin");
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, 20_000);

        let chunks: Vec<u64> = events.iter().map(|p| p.chunk).collect();
        assert_eq!(chunks, vec![8192, 8192, 3616]);
        assert_eq!(chunks.iter().sum::<u64>(), 20_000);
        assert!(events.windows(2).all(|w| w[0].fraction() <= w[1].fraction()));
        assert!((events.last().unwrap().fraction() - 1.0).abs() < f64::EPSILON);

        assert_eq!(share.file_bytes("smb://nas/media/big.bin").unwrap(), payload(20_000));
        assert_eq!(share.live_handles(), 0);
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let (_share, engine) = setup();
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("photo.jpg");
        fs::write(&original, payload(12_345)).unwrap();

        let target = remote("smb://nas/media/photo.jpg");
        let cancel = CancellationToken::new();
        let uploaded = engine
            .upload_blocking(&original, &target, &cancel, &mut |_p| {})
            .unwrap();

        let back = dir.path().join("nested/photo.jpg");
        let written = engine
            .download_blocking(&target, &back, &cancel, &mut |_p| {})
            .unwrap();

        assert_eq!(written, back);
        assert_eq!(fs::read(&back).unwrap(), fs::read(&original).unwrap());
        assert_eq!(fs::metadata(&back).unwrap().len(), uploaded.size);
    }

    #[test]
    fn test_empty_source_reports_completion_once() {
        let (_share, engine) = setup();
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("empty.txt");
        fs::write(&local, b"").unwrap();

        let mut events: Vec<TransferProgress> = Vec::new();
        engine
            .upload_blocking(
                &local,
                &remote("smb://nas/media/empty.txt"),
                &CancellationToken::new(),
                &mut |p| events.push(p),
            )
            .unwrap();

        assert_eq!(events.len(), 1);
        assert!((events[0].fraction() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_write_failure_keeps_partial_bytes_and_releases_handles() {
        let (share, engine) = setup();
        share.fail_write_after("smb://nas/media/part.bin", 10_000);

        let dir = TempDir::new().unwrap();
        let local = dir.path().join("part.bin");
        fs::write(&local, payload(30_000)).unwrap();

        let err = engine
            .upload_blocking(
                &local,
                &remote("smb://nas/media/part.bin"),
                &CancellationToken::new(),
                &mut |_p| {},
            )
            .unwrap_err();

        assert!(matches!(err, CoreError::Transfer { .. }));
        assert_eq!(share.file_bytes("smb://nas/media/part.bin").unwrap().len(), 10_000);
        assert_eq!(share.live_handles(), 0);
    }

    #[test]
    fn test_read_failure_is_transfer_error() {
        let (share, engine) = setup();
        share.put_file("smb://nas/media/flaky.bin", &payload(50_000), SystemTime::now());
        share.fail_read_after("smb://nas/media/flaky.bin", 9_000);

        let dir = TempDir::new().unwrap();
        let local = dir.path().join("flaky.bin");
        let err = engine
            .download_blocking(
                &remote("smb://nas/media/flaky.bin"),
                &local,
                &CancellationToken::new(),
                &mut |_p| {},
            )
            .unwrap_err();

        assert!(matches!(err, CoreError::Transfer { .. }));
        assert_eq!(fs::metadata(&local).unwrap().len(), 9_000);
        assert_eq!(share.live_handles(), 0);
    }

    #[test]
    fn test_missing_remote_source_fails() {
        let (_share, engine) = setup();
        let dir = TempDir::new().unwrap();
        let err = engine
            .download_blocking(
                &remote("smb://nas/media/nope.bin"),
                &dir.path().join("nope.bin"),
                &CancellationToken::new(),
                &mut |_p| {},
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Transfer { .. }));
    }

    #[test]
    fn test_cancel_stops_after_current_chunk() {
        let (share, engine) = setup();
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("movie.mkv");
        fs::write(&local, payload(40_000)).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let err = engine
            .upload_blocking(&local, &remote("smb://nas/media/movie.mkv"), &cancel, &mut |_p| {
                trigger.cancel();
            })
            .unwrap_err();

        assert!(matches!(err, CoreError::Cancelled));
        assert_eq!(share.file_bytes("smb://nas/media/movie.mkv").unwrap().len(), 8192);
        assert_eq!(share.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_spawned_download_streams_progress() {
        let (share, engine) = setup();
        share.put_file("smb://nas/media/song.mp3", &payload(17_000), SystemTime::now());

        let dir = TempDir::new().unwrap();
        let handle = engine.spawn_download(
            remote("smb://nas/media/song.mp3"),
            dir.path().join("song.mp3"),
        );
        assert!(!handle.id.is_empty());

        let mut seen: u64 = 0;
        let path = handle.drive(|p| seen += p.chunk).await.unwrap();

        assert_eq!(seen, 17_000);
        assert_eq!(fs::read(path).unwrap(), payload(17_000));
    }

    #[tokio::test]
    async fn test_dropped_handle_cancels_running_download() {
        let (share, engine) = setup();
        share.put_file("smb://nas/media/film.mkv", &payload(40_000), SystemTime::now());

        let dir = TempDir::new().unwrap();
        let local = dir.path().join("film.mkv");
        let source = remote("smb://nas/media/film.mkv");

        let (first_chunk_tx, first_chunk_rx) = std_mpsc::channel::<()>();
        let (resume_tx, resume_rx) = std_mpsc::channel::<()>();
        let (done_tx, done_rx) = std_mpsc::channel::<CoreResult<PathBuf>>();

        let direction = TransferDirection::Download {
            remote: source.clone(),
            local: local.clone(),
        };
        let target = local.clone();
        let handle = TransferHandle::spawn(direction, move |cancel, on_progress| {
            let mut gated = |p: TransferProgress| {
                on_progress(p);
                if p.transferred == p.chunk {
                    first_chunk_tx.send(()).unwrap();
                    resume_rx.recv().unwrap();
                }
            };
            let result = engine.download_blocking(&source, &target, cancel, &mut gated);
            done_tx.send(result).unwrap();
            Ok(target)
        });

        first_chunk_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(handle);
        resume_tx.send(()).unwrap();

        let result = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(fs::metadata(&local).unwrap().len(), 8192);
        assert_eq!(share.live_handles(), 0);
    }
}
