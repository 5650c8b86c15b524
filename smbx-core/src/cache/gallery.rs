//! src/cache/gallery.rs
//! ============================================================================
//! Sibling images of one selected picture, loadable through the decode cache.

use std::{io::Read, sync::Arc};

use serde::Serialize;
use tracing::info;

use crate::cache::decode_cache::{DecodeCache, DecodedImage, ImageKey, ImageSource};
use crate::error::{CoreError, CoreResult};
use crate::fs::dir_lister::DirectoryLister;
use crate::share::client::RemoteReader;
use crate::share::path::SharePath;
use crate::share::session::ShareSession;

#[derive(Debug, Clone)]
pub struct RemoteGallery {
    session: ShareSession,
    images: Vec<SharePath>,
    current: usize,
}

/// Shell-facing view of a gallery.
#[derive(Debug, Clone, Serialize)]
pub struct GallerySummary {
    pub current: usize,
    pub images: Vec<SharePath>,
}

impl RemoteGallery {
    /// `current` is the position of `selected`, or 0 if it is not listed.
    #[must_use]
    pub fn new(session: ShareSession, images: Vec<SharePath>, selected: &SharePath) -> Self {
        let current: usize = images
            .iter()
            .position(|p: &SharePath| p == selected)
            .unwrap_or(0);

        Self {
            session,
            images,
            current,
        }
    }

    /// Gallery over the images that sit next to `selected`.
    pub async fn open(lister: &DirectoryLister, selected: SharePath) -> CoreResult<Self> {
        let parent: SharePath = selected.parent().ok_or_else(|| {
            CoreError::invalid_path(selected.as_str(), "image has no parent directory")
        })?;

        let images: Vec<SharePath> = lister.list_images(parent).await?;
        let gallery: Self = Self::new(lister.session().clone(), images, &selected);

        info!(
            marker = "GALLERY",
            operation_type = "open_image",
            selected = %selected,
            images = gallery.images.len(),
            current = gallery.current,
            "Gallery opened"
        );

        Ok(gallery)
    }

    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn images(&self) -> &[SharePath] {
        &self.images
    }

    #[must_use]
    pub fn summary(&self) -> GallerySummary {
        GallerySummary {
            current: self.current,
            images: self.images.clone(),
        }
    }

    /// Decode the image at `index` through `cache`.
    pub async fn image(
        self: &Arc<Self>,
        cache: &DecodeCache,
        index: usize,
    ) -> Option<Arc<DecodedImage>> {
        let source: Arc<dyn ImageSource> = self.clone();
        cache.resolve(source, index).await
    }
}

impl ImageSource for RemoteGallery {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn key(&self, index: usize) -> Option<ImageKey> {
        self.images.get(index).map(|p: &SharePath| Arc::from(p.as_str()))
    }

    fn fetch(&self, index: usize) -> CoreResult<Vec<u8>> {
        let path: &SharePath = self
            .images
            .get(index)
            .ok_or_else(|| CoreError::invalid_input("index", "image index out of range"))?;

        let mut reader: RemoteReader = self.session.open_read(path)?;
        let mut bytes: Vec<u8> = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e: std::io::Error| CoreError::remote_io(path.as_str(), e))?;

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::decode_cache::RasterDecoder;
    use crate::fs::collator::NameCollator;
    use crate::share::client::RemoteKind;
    use crate::share::memory::MemoryShare;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        image::RgbaImage::from_pixel(width, height, image::Rgba([1, 2, 3, 255]))
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn lister() -> DirectoryLister {
        let share = MemoryShare::new()
            .with_dir("smb://nas/photos", RemoteKind::Share)
            .with_file("smb://nas/photos/b.png", &png(2, 2))
            .with_file("smb://nas/photos/a.png", &png(1, 1))
            .with_file("smb://nas/photos/notes.txt", b"x")
            .with_file("smb://nas/photos/c.jpg", b"not really a jpeg");
        DirectoryLister::new(ShareSession::new(Arc::new(share)), NameCollator::new("en"))
    }

    fn path(s: &str) -> SharePath {
        SharePath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_open_positions_on_selected_image() {
        let gallery = RemoteGallery::open(&lister(), path("smb://nas/photos/b.png"))
            .await
            .unwrap();

        assert_eq!(gallery.len(), 3);
        assert_eq!(gallery.current_index(), 1);
        assert_eq!(gallery.key(0).unwrap().as_ref(), "smb://nas/photos/a.png");
    }

    #[tokio::test]
    async fn test_unlisted_selection_starts_at_zero() {
        let gallery = RemoteGallery::open(&lister(), path("smb://nas/photos/notes.txt"))
            .await
            .unwrap();
        assert_eq!(gallery.current_index(), 0);
    }

    #[tokio::test]
    async fn test_images_decode_through_cache() {
        let gallery = Arc::new(
            RemoteGallery::open(&lister(), path("smb://nas/photos/a.png"))
                .await
                .unwrap(),
        );
        let cache = DecodeCache::with_budget(1 << 20, Arc::new(RasterDecoder), true);

        let second = gallery.image(&cache, 1).await.unwrap();
        assert_eq!((second.width, second.height), (2, 2));

        // Undecodable bytes give no preview instead of an error.
        assert!(gallery.image(&cache, 2).await.is_none());
        assert!(gallery.image(&cache, 9).await.is_none());
    }
}
