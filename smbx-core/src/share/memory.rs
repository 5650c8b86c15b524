//! In-memory [`ShareClient`] with fault injection, for tests.

use std::{
    collections::{BTreeMap, HashSet},
    io::{self, Cursor, ErrorKind, Read, Write},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use compact_str::{CompactString, format_compact};
use parking_lot::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::share::client::{
    Credentials, RemoteDirEntry, RemoteKind, RemoteReader, RemoteStat, RemoteWriter, ShareClient,
};
use crate::share::path::SharePath;

#[derive(Clone)]
enum Node {
    Dir(RemoteKind),
    File {
        data: Arc<Mutex<Vec<u8>>>,
        modified: SystemTime,
    },
}

#[derive(Default)]
pub(crate) struct MemoryShare {
    // key -> (parent key, node)
    nodes: Mutex<BTreeMap<String, (String, Node)>>,
    failing_lists: Mutex<HashSet<String>>,
    read_fault: Mutex<Option<(String, usize)>>,
    write_fault: Mutex<Option<(String, usize)>>,
    required: Mutex<Option<Credentials>>,
    pub(crate) reads_opened: AtomicUsize,
    live_handles: Arc<AtomicUsize>,
}

fn key(path: &SharePath) -> String {
    path.as_str().trim_end_matches('/').to_owned()
}

fn parent_key(path: &SharePath) -> String {
    path.parent().map_or_else(String::new, |p: SharePath| key(&p))
}

impl MemoryShare {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_dir(self, path: &str, kind: RemoteKind) -> Self {
        let path = SharePath::parse(path).unwrap();
        self.nodes
            .lock()
            .insert(key(&path), (parent_key(&path), Node::Dir(kind)));
        self
    }

    pub(crate) fn with_file(self, path: &str, bytes: &[u8]) -> Self {
        self.put_file(path, bytes, UNIX_EPOCH + Duration::from_secs(1_600_000_000));
        self
    }

    pub(crate) fn put_file(&self, path: &str, bytes: &[u8], modified: SystemTime) {
        let path = SharePath::parse(path).unwrap();
        self.nodes.lock().insert(
            key(&path),
            (
                parent_key(&path),
                Node::File {
                    data: Arc::new(Mutex::new(bytes.to_vec())),
                    modified,
                },
            ),
        );
    }

    pub(crate) fn fail_list(&self, path: &str) {
        let path = SharePath::parse(path).unwrap();
        self.failing_lists.lock().insert(key(&path));
    }

    /// Reads of `path` fail once `after` bytes have been delivered.
    pub(crate) fn fail_read_after(&self, path: &str, after: usize) {
        let path = SharePath::parse(path).unwrap();
        *self.read_fault.lock() = Some((key(&path), after));
    }

    /// Writes to `path` fail once `after` bytes have been accepted.
    pub(crate) fn fail_write_after(&self, path: &str, after: usize) {
        let path = SharePath::parse(path).unwrap();
        *self.write_fault.lock() = Some((key(&path), after));
    }

    pub(crate) fn require(&self, username: &str, password: &str) {
        *self.required.lock() = Credentials::new(username, password);
    }

    pub(crate) fn file_bytes(&self, path: &str) -> Option<Vec<u8>> {
        let path = SharePath::parse(path).unwrap();
        match self.nodes.lock().get(&key(&path)) {
            Some((_, Node::File { data, .. })) => Some(data.lock().clone()),
            _ => None,
        }
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    fn check_auth(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()> {
        match &*self.required.lock() {
            Some(required) if Some(required) != auth => Err(CoreError::remote_io(
                path.as_str(),
                io::Error::new(ErrorKind::PermissionDenied, "logon failure"),
            )),
            _ => Ok(()),
        }
    }

    fn node(&self, path: &SharePath) -> Option<Node> {
        if path.is_root() {
            return Some(Node::Dir(RemoteKind::Workgroup));
        }
        self.nodes.lock().get(&key(path)).map(|(_, n)| n.clone())
    }

    fn stat_of(node: &Node) -> RemoteStat {
        match node {
            Node::Dir(kind) => RemoteStat {
                kind: *kind,
                is_file: false,
                is_dir: true,
                size: 0,
                modified: UNIX_EPOCH,
            },
            Node::File { data, modified } => RemoteStat {
                kind: RemoteKind::Filesystem,
                is_file: true,
                is_dir: false,
                size: data.lock().len() as u64,
                modified: *modified,
            },
        }
    }

    fn not_found(path: &SharePath) -> CoreError {
        CoreError::remote_io(path.as_str(), io::Error::new(ErrorKind::NotFound, "not found"))
    }

    fn guard(&self) -> HandleGuard {
        self.live_handles.fetch_add(1, Ordering::SeqCst);
        HandleGuard(self.live_handles.clone())
    }
}

struct HandleGuard(Arc<AtomicUsize>);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FaultyReader {
    inner: Cursor<Vec<u8>>,
    fail_after: Option<usize>,
    delivered: usize,
    _guard: HandleGuard,
}

impl Read for FaultyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit: usize = match self.fail_after {
            Some(after) if self.delivered >= after => {
                return Err(io::Error::new(ErrorKind::ConnectionReset, "connection reset"));
            }
            Some(after) => buf.len().min(after - self.delivered),
            None => buf.len(),
        };
        let n = self.inner.read(&mut buf[..limit])?;
        self.delivered += n;
        Ok(n)
    }
}

struct MemWriter {
    data: Arc<Mutex<Vec<u8>>>,
    fail_after: Option<usize>,
    _guard: HandleGuard,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.lock();
        if let Some(after) = self.fail_after {
            if data.len() >= after {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"));
            }
            let n = buf.len().min(after - data.len());
            data.extend_from_slice(&buf[..n]);
            return Ok(n);
        }
        data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ShareClient for MemoryShare {
    fn stat(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<Option<RemoteStat>> {
        self.check_auth(auth, path)?;
        Ok(self.node(path).as_ref().map(Self::stat_of))
    }

    fn list(
        &self,
        auth: Option<&Credentials>,
        path: &SharePath,
    ) -> CoreResult<Vec<RemoteDirEntry>> {
        self.check_auth(auth, path)?;

        let dir_key = key(path);
        if self.failing_lists.lock().contains(&dir_key) {
            return Err(CoreError::remote_io(
                path.as_str(),
                io::Error::new(ErrorKind::TimedOut, "enumeration timed out"),
            ));
        }

        let nodes = self.nodes.lock();
        let mut entries = Vec::new();
        for (child_key, (parent, node)) in nodes.iter() {
            if *parent != dir_key {
                continue;
            }
            let base = child_key.rsplit('/').next().unwrap_or("");
            let name: CompactString = match node {
                Node::Dir(_) => format_compact!("{base}/"),
                Node::File { .. } => CompactString::new(base),
            };
            entries.push(RemoteDirEntry {
                path: path.join(&name)?,
                name,
                stat: Self::stat_of(node),
            });
        }
        Ok(entries)
    }

    fn open_read(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<RemoteReader> {
        self.check_auth(auth, path)?;

        match self.node(path) {
            Some(Node::File { data, .. }) => {
                self.reads_opened.fetch_add(1, Ordering::SeqCst);
                let fail_after = match &*self.read_fault.lock() {
                    Some((k, after)) if *k == key(path) => Some(*after),
                    _ => None,
                };
                Ok(Box::new(FaultyReader {
                    inner: Cursor::new(data.lock().clone()),
                    fail_after,
                    delivered: 0,
                    _guard: self.guard(),
                }))
            }
            _ => Err(Self::not_found(path)),
        }
    }

    fn open_write(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<RemoteWriter> {
        self.check_auth(auth, path)?;

        let parent = path.parent().ok_or_else(|| Self::not_found(path))?;
        if !matches!(self.node(&parent), Some(Node::Dir(_))) {
            return Err(Self::not_found(&parent));
        }

        let data = Arc::new(Mutex::new(Vec::new()));
        self.nodes.lock().insert(
            key(path),
            (
                parent_key(path),
                Node::File {
                    data: data.clone(),
                    modified: SystemTime::now(),
                },
            ),
        );

        let fail_after = match &*self.write_fault.lock() {
            Some((k, after)) if *k == key(path) => Some(*after),
            _ => None,
        };

        Ok(Box::new(MemWriter {
            data,
            fail_after,
            _guard: self.guard(),
        }))
    }

    fn create_file(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()> {
        self.check_auth(auth, path)?;
        if self.node(path).is_some() {
            return Err(CoreError::remote_io(
                path.as_str(),
                io::Error::new(ErrorKind::AlreadyExists, "exists"),
            ));
        }
        self.put_file(path.as_str(), b"", SystemTime::now());
        Ok(())
    }

    fn create_dir(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()> {
        self.check_auth(auth, path)?;
        self.nodes.lock().insert(
            key(path),
            (parent_key(path), Node::Dir(RemoteKind::Filesystem)),
        );
        Ok(())
    }

    fn delete(&self, auth: Option<&Credentials>, path: &SharePath) -> CoreResult<()> {
        self.check_auth(auth, path)?;
        let target = key(path);
        let prefix = format!("{target}/");
        let mut nodes = self.nodes.lock();
        if nodes.remove(&target).is_none() {
            return Err(Self::not_found(path));
        }
        nodes.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }
}
