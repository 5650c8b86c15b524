//! src/share/session.rs
//! ============================================================
//! Explicit, cloneable connection context: one client plus the principal
//! applied to every subsequent call until it is replaced or cleared.

use std::sync::Arc;

use compact_str::CompactString;
use parking_lot::RwLock;
use tracing::info;

use crate::error::CoreResult;
use crate::share::client::{
    Credentials, RemoteDirEntry, RemoteReader, RemoteStat, RemoteWriter, ShareClient,
};
use crate::share::path::SharePath;

#[derive(Clone)]
pub struct ShareSession {
    client: Arc<dyn ShareClient>,
    principal: Arc<RwLock<Option<Credentials>>>,
}

impl ShareSession {
    #[must_use]
    pub fn new(client: Arc<dyn ShareClient>) -> Self {
        Self {
            client,
            principal: Arc::new(RwLock::new(None)),
        }
    }

    #[must_use]
    pub fn with_principal(self, username: &str, password: &str) -> Self {
        self.set_principal(username, password);
        self
    }

    /// Replace the principal; empty username or password clears it.
    pub fn set_principal(&self, username: &str, password: &str) {
        let creds: Option<Credentials> = Credentials::new(username, password);

        info!(
            marker = "SESSION_AUTH",
            operation_type = "set_principal",
            authenticated = creds.is_some(),
            username = %username,
            "Share principal updated"
        );

        *self.principal.write() = creds;
    }

    #[must_use]
    pub fn principal(&self) -> Option<Credentials> {
        self.principal.read().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.principal.read().is_some()
    }

    // Snapshot the principal once per call so a concurrent `set_principal`
    // never changes credentials halfway through an operation.

    pub fn stat(&self, path: &SharePath) -> CoreResult<Option<RemoteStat>> {
        let auth: Option<Credentials> = self.principal();
        self.client.stat(auth.as_ref(), path)
    }

    pub fn list(&self, path: &SharePath) -> CoreResult<Vec<RemoteDirEntry>> {
        let auth: Option<Credentials> = self.principal();
        self.client.list(auth.as_ref(), path)
    }

    pub fn list_names(&self, path: &SharePath) -> CoreResult<Vec<CompactString>> {
        let auth: Option<Credentials> = self.principal();
        self.client.list_names(auth.as_ref(), path)
    }

    pub fn open_read(&self, path: &SharePath) -> CoreResult<RemoteReader> {
        let auth: Option<Credentials> = self.principal();
        self.client.open_read(auth.as_ref(), path)
    }

    pub fn open_write(&self, path: &SharePath) -> CoreResult<RemoteWriter> {
        let auth: Option<Credentials> = self.principal();
        self.client.open_write(auth.as_ref(), path)
    }

    pub fn create_file(&self, path: &SharePath) -> CoreResult<()> {
        let auth: Option<Credentials> = self.principal();
        self.client.create_file(auth.as_ref(), path)
    }

    pub fn create_dir(&self, path: &SharePath) -> CoreResult<()> {
        let auth: Option<Credentials> = self.principal();
        self.client.create_dir(auth.as_ref(), path)
    }

    pub fn delete(&self, path: &SharePath) -> CoreResult<()> {
        let auth: Option<Credentials> = self.principal();
        self.client.delete(auth.as_ref(), path)
    }
}

impl std::fmt::Debug for ShareSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareSession")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
