pub mod error;

pub mod config;

pub mod logging;

pub mod share {
    pub mod path;
    pub use path::SharePath;

    pub mod client;
    pub use client::{Credentials, RemoteDirEntry, RemoteKind, RemoteStat, ShareClient};

    pub mod session;
    pub use session::ShareSession;

    pub mod mounted;
    pub use mounted::MountedShare;

    #[cfg(test)]
    pub(crate) mod memory;
}

pub mod fs {
    pub mod entry_info;
    pub use entry_info::{EntryInfo, EntryKind};

    pub mod media;
    pub use media::MediaCategory;

    pub mod collator;

    pub mod dir_lister;
    pub use dir_lister::DirectoryLister;
}

pub mod tasks {
    pub mod transfer_task;
    pub use transfer_task::{TransferEngine, TransferHandle, TransferProgress};

    pub mod media_source;
    pub use media_source::{MediaHandle, RemoteByteSource};
}

pub mod cache {
    pub mod decode_cache;
    pub use decode_cache::{DecodeCache, DecodedImage, ImageDecoder, ImageSource};

    pub mod gallery;
    pub use gallery::RemoteGallery;
}

pub mod net {
    pub mod wake_on_lan;
    pub use wake_on_lan::{MacAddress, WakeSender};
}

pub mod controller {
    pub mod operation;
    pub use operation::Operation;

    pub mod share_service;
    pub use share_service::ShareService;
}

pub use config::Config;
pub use error::{CoreError, CoreResult};
