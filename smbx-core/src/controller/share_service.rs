//! src/controller/share_service.rs
//! ============================================================================
//! # ShareService: executes shell operations against one share session
//!
//! Owns every piece of per-process state: the session (principal), the
//! lister, the transfer engine, the decode cache and the wake sender. Each
//! operation resolves to exactly one JSON payload or one error; transfers
//! report progress through the caller's callback before resolving.

use std::{
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use directories::UserDirs;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::cache::decode_cache::{CacheStatsSnapshot, DecodeCache, DecodedImage};
use crate::cache::gallery::RemoteGallery;
use crate::config::Config;
use crate::controller::operation::Operation;
use crate::error::{CoreError, CoreResult};
use crate::fs::collator::NameCollator;
use crate::fs::dir_lister::DirectoryLister;
use crate::fs::entry_info::{EntryInfo, EntryKind};
use crate::fs::media::{self, MediaCategory};
use crate::net::wake_on_lan::WakeSender;
use crate::share::client::{RemoteReader, ShareClient};
use crate::share::mounted::MountedShare;
use crate::share::path::SharePath;
use crate::share::session::ShareSession;
use crate::tasks::media_source::{self, MediaHandle};
use crate::tasks::transfer_task::{TransferEngine, TransferProgress};

pub struct ShareService {
    session: ShareSession,
    lister: DirectoryLister,
    engine: TransferEngine,
    cache: DecodeCache,
    wake: WakeSender,
    download_dir: Option<PathBuf>,
}

impl ShareService {
    /// Service over `client`, sized and tuned by `config`.
    #[must_use]
    pub fn new(client: Arc<dyn ShareClient>, config: &Config) -> Self {
        let session: ShareSession = ShareSession::new(client)
            .with_principal(&config.share.username, &config.share.password);

        let lister: DirectoryLister = DirectoryLister::new(
            session.clone(),
            NameCollator::new(&config.share.collation_locale),
        );

        let engine: TransferEngine =
            TransferEngine::new(session.clone()).with_chunk_size(config.transfer.chunk_size);

        Self {
            session,
            lister,
            engine,
            cache: DecodeCache::from_config(&config.cache),
            wake: WakeSender::from_config(&config.wake),
            download_dir: config.transfer.download_dir.clone(),
        }
    }

    /// Service over the shares mounted under `config.share.mount_root`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let client: Arc<dyn ShareClient> = Arc::new(MountedShare::new(&config.share.mount_root));
        Self::new(client, config)
    }

    #[must_use]
    pub fn session(&self) -> &ShareSession {
        &self.session
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    /// Parse and run one named request; failures collapse to their message.
    pub async fn call(
        &self,
        method: &str,
        args: &[Value],
        on_progress: impl FnMut(TransferProgress),
    ) -> Result<Value, String> {
        let result: CoreResult<Value> = match Operation::parse(method, args) {
            Ok(op) => self.execute(op, on_progress).await,
            Err(e) => Err(e),
        };

        result.map_err(|e: CoreError| e.trace().to_string())
    }

    #[instrument(level = "info", skip(self, on_progress), fields(method = op.name()))]
    pub async fn execute(
        &self,
        op: Operation,
        on_progress: impl FnMut(TransferProgress),
    ) -> CoreResult<Value> {
        match op {
            Operation::Auth { username, password } => {
                self.session.set_principal(&username, &password);
                Ok(json!({ "authenticated": self.session.is_authenticated() }))
            }

            Operation::ListEntries { path } => to_json(&self.lister.list_entries(path).await?),

            Operation::ReadAsText { path } => {
                let bytes: Vec<u8> = self.read_all(path).await?;
                Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            }

            Operation::ReadAsByteArray { path } => to_json(&self.read_all(path).await?),

            Operation::CreateFile { path } => to_json(&self.create(path, EntryKind::File).await?),

            Operation::CreateDirectory { path } => {
                to_json(&self.create(path, EntryKind::Directory).await?)
            }

            Operation::Delete { path } => {
                let session: ShareSession = self.session.clone();
                blocking(move || session.delete(&path)).await?;
                Ok(Value::Null)
            }

            Operation::Upload { local, remote_dir } => {
                to_json(&self.upload(local, &remote_dir, on_progress).await?)
            }

            Operation::Download { remote } => {
                let written: PathBuf = self.download(remote, on_progress).await?;
                Ok(Value::String(written.to_string_lossy().into_owned()))
            }

            Operation::OpenImage { path } => {
                let gallery: Arc<RemoteGallery> = self.open_image(path).await?;
                let preview: Option<Arc<DecodedImage>> =
                    self.gallery_image(&gallery, gallery.current_index()).await;

                let mut payload: Value = to_json(&gallery.summary())?;
                payload["preview"] = preview.map_or(Value::Null, |img: Arc<DecodedImage>| {
                    json!({ "width": img.width, "height": img.height })
                });
                Ok(payload)
            }

            Operation::OpenMedia { path } => to_json(&self.open_media(path).await?.summary()),

            Operation::WakeOnLan {
                mac,
                port,
                broadcast,
            } => to_json(&self.wake.send(&mac, port, broadcast).await?),
        }
    }

    // ------------------------------------------------------------
    // Operations also usable directly from Rust callers
    // ------------------------------------------------------------

    pub async fn read_all(&self, path: SharePath) -> CoreResult<Vec<u8>> {
        let session: ShareSession = self.session.clone();

        blocking(move || {
            let mut reader: RemoteReader = session.open_read(&path)?;
            let mut bytes: Vec<u8> = Vec::new();
            reader
                .read_to_end(&mut bytes)
                .map_err(|e: std::io::Error| CoreError::remote_io(path.as_str(), e))?;
            Ok(bytes)
        })
        .await
    }

    /// Create an empty file or a directory and describe it as just written.
    pub async fn create(&self, path: SharePath, kind: EntryKind) -> CoreResult<EntryInfo> {
        let session: ShareSession = self.session.clone();

        blocking(move || {
            match kind {
                EntryKind::Directory => session.create_dir(&path)?,
                _ => session.create_file(&path)?,
            }

            info!(
                marker = "SHARE_SERVICE",
                operation_type = "create",
                path = %path,
                kind = %kind,
                "Remote entry created"
            );

            Ok(EntryInfo::written(path, kind, 0, SystemTime::now()))
        })
        .await
    }

    /// Upload `local` into `remote_dir`, keeping the local file name.
    pub async fn upload(
        &self,
        local: PathBuf,
        remote_dir: &SharePath,
        on_progress: impl FnMut(TransferProgress),
    ) -> CoreResult<EntryInfo> {
        let name: &str = local
            .file_name()
            .and_then(|n: &std::ffi::OsStr| n.to_str())
            .ok_or_else(|| CoreError::invalid_input("localPath", "no usable file name"))?;

        let remote: SharePath = remote_dir.to_dir_form().join(name)?;

        self.engine.spawn_upload(local, remote).drive(on_progress).await
    }

    /// Download `remote` into its category directory; returns the local path.
    pub async fn download(
        &self,
        remote: SharePath,
        on_progress: impl FnMut(TransferProgress),
    ) -> CoreResult<PathBuf> {
        let local: PathBuf = self.download_target(&remote)?;
        self.engine.spawn_download(remote, local).drive(on_progress).await
    }

    pub async fn open_image(&self, path: SharePath) -> CoreResult<Arc<RemoteGallery>> {
        Ok(Arc::new(RemoteGallery::open(&self.lister, path).await?))
    }

    /// Image `index` of `gallery`, decoded through the shared cache.
    pub async fn gallery_image(
        &self,
        gallery: &Arc<RemoteGallery>,
        index: usize,
    ) -> Option<Arc<DecodedImage>> {
        gallery.image(&self.cache, index).await
    }

    pub async fn open_media(&self, path: SharePath) -> CoreResult<MediaHandle> {
        media_source::open_media(self.session.clone(), path).await
    }

    fn download_target(&self, remote: &SharePath) -> CoreResult<PathBuf> {
        let name: &str = remote.file_name();
        if name.is_empty() || remote.is_dir_form() {
            return Err(CoreError::invalid_input("remotePath", "download source must be a file"));
        }

        let dir: PathBuf = match &self.download_dir {
            Some(dir) => dir.clone(),
            None => category_dir(media::classify_name(name)).ok_or_else(|| {
                CoreError::invalid_input("download_dir", "no user directory available")
            })?,
        };

        Ok(dir.join(name))
    }
}

impl std::fmt::Debug for ShareService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareService")
            .field("session", &self.session)
            .field("cache", &self.cache)
            .field("download_dir", &self.download_dir)
            .finish_non_exhaustive()
    }
}

/// Pictures / Music / Videos / Downloads of the current user.
#[must_use]
pub fn category_dir(category: MediaCategory) -> Option<PathBuf> {
    let dirs: UserDirs = UserDirs::new()?;

    let preferred: Option<&Path> = match category {
        MediaCategory::Image => dirs.picture_dir(),
        MediaCategory::Audio => dirs.audio_dir(),
        MediaCategory::Video => dirs.video_dir(),
        MediaCategory::Other => dirs.download_dir(),
    };

    let dir: PathBuf = preferred.map_or_else(
        || {
            warn!(
                marker = "SHARE_SERVICE",
                operation_type = "download_dir",
                category = ?category,
                "No user directory for category, using ~/Downloads"
            );
            dirs.home_dir().join("Downloads")
        },
        Path::to_path_buf,
    );

    Some(dir)
}

async fn blocking<T, F>(job: F) -> CoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job).await.map_err(CoreError::from)?
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> CoreResult<Value> {
    serde_json::to_value(value).map_err(|e: serde_json::Error| {
        CoreError::Other(compact_str::CompactString::new(e.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::client::RemoteKind;
    use crate::share::memory::MemoryShare;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tokio::net::UdpSocket;

    fn png() -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        image::RgbaImage::from_pixel(3, 2, image::Rgba([9, 9, 9, 255]))
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn service(downloads: &Path) -> (Arc<MemoryShare>, ShareService) {
        let share = Arc::new(
            MemoryShare::new()
                .with_dir("smb://nas/", RemoteKind::Server)
                .with_dir("smb://nas/docs", RemoteKind::Share)
                .with_dir("smb://nas/docs/sub", RemoteKind::Filesystem)
                .with_file("smb://nas/docs/readme.txt", "héllo".as_bytes())
                .with_file("smb://nas/docs/pic.png", &png())
                .with_file("smb://nas/docs/film.mp4", b"0123456789")
                .with_file("smb://nas/docs/film.srt", b"subs"),
        );

        let mut config = Config::default();
        config.share.collation_locale = "en".to_owned();
        config.transfer.download_dir = Some(downloads.to_path_buf());
        config.transfer.chunk_size = 4;
        config.cache.budget_bytes = Some(1 << 20);

        let service = ShareService::new(share.clone(), &config);
        (share, service)
    }

    async fn call(service: &ShareService, method: &str, args: &[Value]) -> Result<Value, String> {
        service.call(method, args, |_p: TransferProgress| {}).await
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dir = TempDir::new().unwrap();
        let (_share, service) = service(dir.path());
        assert_eq!(
            call(&service, "rename", &[]).await.unwrap_err(),
            "Undefined method:rename"
        );
    }

    #[tokio::test]
    async fn test_list_entries_payload() {
        let dir = TempDir::new().unwrap();
        let (_share, service) = service(dir.path());

        let listed = call(&service, "listEntries", &[json!("smb://nas/docs/")]).await.unwrap();
        let entries = listed.as_array().unwrap();

        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0]["name"], "sub");
        assert_eq!(entries[0]["type"], 1);
        assert_eq!(entries[1]["name"], "film.mp4");
        assert_eq!(entries[1]["ext"], "mp4");
        assert_eq!(entries[1]["size"], 10);
        assert!(entries[1]["lastModified"].is_i64());

        let missing = call(&service, "listEntries", &[json!("smb://nas/none/")]).await.unwrap();
        assert_eq!(missing, json!([]));
    }

    #[tokio::test]
    async fn test_read_text_and_bytes() {
        let dir = TempDir::new().unwrap();
        let (_share, service) = service(dir.path());

        let text = call(&service, "readAsText", &[json!("smb://nas/docs/readme.txt")])
            .await
            .unwrap();
        assert_eq!(text, json!("héllo"));

        let bytes = call(&service, "readAsByteArray", &[json!("smb://nas/docs/film.srt")])
            .await
            .unwrap();
        assert_eq!(bytes, json!([115, 117, 98, 115]));

        assert!(call(&service, "readAsText", &[json!("smb://nas/docs/nope.txt")])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let dir = TempDir::new().unwrap();
        let (share, service) = service(dir.path());

        let file = call(&service, "createFile", &[json!("smb://nas/docs/new.txt")])
            .await
            .unwrap();
        assert_eq!(file["name"], "new.txt");
        assert_eq!(file["type"], 0);
        assert_eq!(file["size"], 0);
        assert_eq!(share.file_bytes("smb://nas/docs/new.txt"), Some(Vec::new()));

        let folder = call(&service, "createDirectory", &[json!("smb://nas/docs/fresh/")])
            .await
            .unwrap();
        assert_eq!(folder["name"], "fresh");
        assert_eq!(folder["type"], 1);

        let deleted = call(&service, "delete", &[json!("smb://nas/docs/new.txt")]).await.unwrap();
        assert_eq!(deleted, Value::Null);
        assert!(share.file_bytes("smb://nas/docs/new.txt").is_none());
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let dir = TempDir::new().unwrap();
        let (share, service) = service(dir.path());

        let local = dir.path().join("notes.bin");
        std::fs::write(&local, b"0123456789").unwrap();

        let mut fractions: Vec<f64> = Vec::new();
        let uploaded = service
            .call(
                "upload",
                &[json!(local.to_str().unwrap()), json!("smb://nas/docs/sub")],
                |p: TransferProgress| fractions.push(p.fraction()),
            )
            .await
            .unwrap();

        assert_eq!(uploaded["path"], "smb://nas/docs/sub/notes.bin");
        assert_eq!(uploaded["size"], 10);
        assert_eq!(fractions, vec![0.4, 0.8, 1.0]);
        assert_eq!(
            share.file_bytes("smb://nas/docs/sub/notes.bin").unwrap(),
            b"0123456789"
        );

        let written = call(&service, "download", &[json!("smb://nas/docs/film.mp4")])
            .await
            .unwrap();
        let written = PathBuf::from(written.as_str().unwrap());
        assert_eq!(written, dir.path().join("film.mp4"));
        assert_eq!(std::fs::read(&written).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_download_rejects_directories() {
        let dir = TempDir::new().unwrap();
        let (_share, service) = service(dir.path());
        assert!(call(&service, "download", &[json!("smb://nas/docs/sub/")])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_auth_updates_session() {
        let dir = TempDir::new().unwrap();
        let (share, service) = service(dir.path());
        share.require("alice", "secret");

        assert!(call(&service, "readAsText", &[json!("smb://nas/docs/readme.txt")])
            .await
            .is_err());

        let auth = call(&service, "auth", &[json!("alice"), json!("secret")]).await.unwrap();
        assert_eq!(auth, json!({ "authenticated": true }));
        assert!(call(&service, "readAsText", &[json!("smb://nas/docs/readme.txt")])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_open_image_and_media() {
        let dir = TempDir::new().unwrap();
        let (_share, service) = service(dir.path());

        let image = call(&service, "openImage", &[json!("smb://nas/docs/pic.png")])
            .await
            .unwrap();
        assert_eq!(image["current"], 0);
        assert_eq!(image["images"], json!(["smb://nas/docs/pic.png"]));
        assert_eq!(image["preview"], json!({ "width": 3, "height": 2 }));
        assert_eq!(service.cache_stats().loads, 1);

        let media = call(&service, "openMedia", &[json!("smb://nas/docs/film.mp4")])
            .await
            .unwrap();
        assert_eq!(media["size"], 10);
        assert_eq!(media["subtitle"], "subs");
    }

    #[tokio::test]
    async fn test_wake_on_lan_over_loopback() {
        let dir = TempDir::new().unwrap();
        let (_share, service) = service(dir.path());

        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let report = call(
            &service,
            "wakeOnLan",
            &[json!("aa:bb:cc:dd:ee:ff"), json!(port), json!("127.0.0.1")],
        )
        .await
        .unwrap();
        assert_eq!(report["bytes"], 102);

        let mut buf = [0u8; 128];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, 102);

        assert!(call(&service, "wakeOnLan", &[json!("zz")])
            .await
            .unwrap_err()
            .contains("Invalid MAC address"));
    }
}
