//! src/tasks/media_source.rs
//! ============================================================================
//! # Media Source: random-access byte ranges over a remote file
//!
//! Players ask for `(offset, len)` ranges. Sequential requests reuse one open
//! remote stream; a forward jump skips within it, a backward jump reopens.

use std::{
    io::{self, Read},
    sync::Arc,
};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{CoreError, CoreResult};
use crate::share::client::{RemoteReader, RemoteStat};
use crate::share::path::SharePath;
use crate::share::session::ShareSession;

pub const SUBTITLE_EXTENSION: &str = "srt";

struct OpenStream {
    reader: RemoteReader,
    position: u64,
}

pub struct RemoteByteSource {
    session: ShareSession,
    path: SharePath,
    len: u64,
    stream: Mutex<Option<OpenStream>>,
}

impl RemoteByteSource {
    /// Fails unless `path` is an existing remote file.
    pub fn open(session: ShareSession, path: SharePath) -> CoreResult<Self> {
        let stat: RemoteStat = session.stat(&path)?.ok_or_else(|| {
            CoreError::remote_io(path.as_str(), io::Error::from(io::ErrorKind::NotFound))
        })?;

        if !stat.is_file {
            return Err(CoreError::invalid_input("path", "media source must be a file"));
        }

        Ok(Self {
            session,
            path,
            len: stat.size,
            stream: Mutex::new(None),
        })
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn path(&self) -> &SharePath {
        &self.path
    }

    /// Fill `buf` from `offset`; returns the byte count, 0 at or past the end.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> CoreResult<usize> {
        if offset >= self.len || buf.is_empty() {
            return Ok(0);
        }

        let mut guard = self.stream.lock();

        let reusable: bool = guard
            .as_ref()
            .is_some_and(|s: &OpenStream| s.position <= offset);

        if !reusable {
            debug!(
                marker = "MEDIA_SOURCE",
                path = %self.path,
                offset,
                "Opening remote stream"
            );
            *guard = Some(OpenStream {
                reader: self.session.open_read(&self.path)?,
                position: 0,
            });
        }

        let Some(stream) = guard.as_mut() else {
            return Ok(0);
        };

        let gap: u64 = offset - stream.position;
        if gap > 0 {
            let skip: io::Result<u64> =
                io::copy(&mut (&mut stream.reader).take(gap), &mut io::sink());
            let skipped: u64 = match skip {
                Ok(n) => n,
                Err(e) => {
                    // Part of the gap may be consumed; the position is unknown.
                    *guard = None;
                    return Err(CoreError::remote_io(self.path.as_str(), e));
                }
            };
            stream.position += skipped;

            if skipped < gap {
                return Ok(0);
            }
        }

        let mut filled: usize = 0;
        while filled < buf.len() {
            match stream.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // The stream position is unknown now; start over next time.
                    *guard = None;
                    return Err(CoreError::remote_io(self.path.as_str(), e));
                }
            }
        }

        stream.position += filled as u64;
        Ok(filled)
    }
}

impl std::fmt::Debug for RemoteByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteByteSource")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Subtitle text stored next to `media` as `<stem>.srt`, if readable.
#[must_use]
pub fn subtitle_for(session: &ShareSession, media: &SharePath) -> Option<String> {
    let candidate: SharePath = media.sibling_with_extension(SUBTITLE_EXTENSION).ok()?;

    let is_file: bool = matches!(session.stat(&candidate), Ok(Some(stat)) if stat.is_file);
    if !is_file {
        return None;
    }

    let mut bytes: Vec<u8> = Vec::new();
    let read: CoreResult<usize> = session.open_read(&candidate).and_then(|mut r: RemoteReader| {
        r.read_to_end(&mut bytes)
            .map_err(|e: io::Error| CoreError::remote_io(candidate.as_str(), e))
    });

    match read {
        Ok(_) => Some(String::from_utf8_lossy(&bytes).into_owned()),

        Err(e) => {
            debug!(
                marker = "MEDIA_SOURCE",
                subtitle = %candidate,
                error = %e,
                "Subtitle not readable"
            );
            None
        }
    }
}

/// What the player receives for one media entry.
#[derive(Debug, Clone)]
pub struct MediaHandle {
    pub source: Arc<RemoteByteSource>,
    pub subtitle: Option<String>,
}

/// Shell-facing summary of a [`MediaHandle`].
#[derive(Debug, Clone, Serialize)]
pub struct MediaSummary {
    pub path: SharePath,
    pub size: u64,
    pub subtitle: Option<String>,
}

impl MediaHandle {
    #[must_use]
    pub fn summary(&self) -> MediaSummary {
        MediaSummary {
            path: self.source.path().clone(),
            size: self.source.len(),
            subtitle: self.subtitle.clone(),
        }
    }
}

#[instrument(level = "debug", skip(session), fields(path = %path))]
pub async fn open_media(session: ShareSession, path: SharePath) -> CoreResult<MediaHandle> {
    tokio::task::spawn_blocking(move || {
        let subtitle: Option<String> = subtitle_for(&session, &path);
        let source: RemoteByteSource = RemoteByteSource::open(session, path)?;

        Ok(MediaHandle {
            source: Arc::new(source),
            subtitle,
        })
    })
    .await
    .map_err(CoreError::from)?
}
