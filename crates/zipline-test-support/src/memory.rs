//! In-memory namespace and movers with failure injection.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use zipline_core::{
    AttributeSet, DirectoryEntry, FileAttributes, FsPath, NamespaceError, NamespaceResult,
    NamespaceService, RedirectTarget, Subject, Transfer, TransferError, TransferId,
    TransferReader, TransferResult, TransferService,
};

/// Start failure returned by [`MemoryTransferService::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailure {
    /// The mover reports the file as missing.
    NotFound,
    /// The mover refuses the subject.
    PermissionDenied,
    /// The file is locked by another transfer.
    Locked,
    /// Any other backend failure.
    Other,
}

impl StartFailure {
    fn into_error(self, path: &FsPath) -> TransferError {
        let path = path.clone();
        match self {
            Self::NotFound => TransferError::NotFound { path },
            Self::PermissionDenied => TransferError::PermissionDenied { path },
            Self::Locked => TransferError::Locked { path },
            Self::Other => {
                TransferError::other("start", path, io::Error::other("injected start failure"))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    attributes: FileAttributes,
    children: Vec<String>,
    contents: Arc<[u8]>,
}

#[derive(Debug, Default, Clone)]
struct Faults {
    listing: BTreeSet<FsPath>,
    start: BTreeMap<FsPath, StartFailure>,
    stalled: BTreeSet<FsPath>,
    broken_reads: BTreeSet<FsPath>,
    hung_reads: BTreeSet<FsPath>,
    ready_delay: Option<Duration>,
}

/// Builder for an in-memory directory tree.
///
/// Children list in insertion order; parents are created on demand.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    nodes: BTreeMap<FsPath, Node>,
    faults: Faults,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    /// Tree containing only the root directory.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            FsPath::root(),
            Node {
                attributes: FileAttributes::directory().with_mode(0o755).with_owner(0, 0),
                children: Vec::new(),
                contents: Arc::from(Vec::new()),
            },
        );
        Self {
            nodes,
            faults: Faults::default(),
        }
    }

    /// Add a world-listable directory.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path or when a parent is not a directory.
    pub fn dir(self, path: &str) -> Result<Self> {
        self.entry(
            path,
            FileAttributes::directory().with_mode(0o755).with_owner(0, 0),
            Vec::new(),
        )
    }

    /// Add a world-readable regular file.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path or when a parent is not a directory.
    pub fn file(self, path: &str, contents: impl Into<Vec<u8>>) -> Result<Self> {
        let contents = contents.into();
        let attributes = FileAttributes::regular(contents.len() as u64)
            .with_mode(0o644)
            .with_owner(0, 0);
        self.entry(path, attributes, contents)
    }

    /// Add a symbolic link.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path or when a parent is not a directory.
    pub fn symlink(self, path: &str) -> Result<Self> {
        self.entry(path, FileAttributes::link(), Vec::new())
    }

    /// Add a special entry such as a device node.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path or when a parent is not a directory.
    pub fn special(self, path: &str) -> Result<Self> {
        self.entry(path, FileAttributes::special(), Vec::new())
    }

    /// Add an entry with explicit attributes.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path or when a parent is not a directory.
    pub fn entry(
        mut self,
        path: &str,
        attributes: FileAttributes,
        contents: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let path = FsPath::parse(path)?;
        self.insert(path, attributes, contents.into())?;
        Ok(self)
    }

    /// Make listing `path` fail.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path.
    pub fn fail_listing(mut self, path: &str) -> Result<Self> {
        self.faults.listing.insert(FsPath::parse(path)?);
        Ok(self)
    }

    /// Make starting a transfer for `path` fail.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path.
    pub fn fail_start(mut self, path: &str, failure: StartFailure) -> Result<Self> {
        self.faults.start.insert(FsPath::parse(path)?, failure);
        Ok(self)
    }

    /// Make the mover for `path` never become ready.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path.
    pub fn stall(mut self, path: &str) -> Result<Self> {
        self.faults.stalled.insert(FsPath::parse(path)?);
        Ok(self)
    }

    /// Make reading `path` fail after returning part of its contents.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path.
    pub fn break_read(mut self, path: &str) -> Result<Self> {
        self.faults.broken_reads.insert(FsPath::parse(path)?);
        Ok(self)
    }

    /// Make reading `path` block forever.
    ///
    /// # Errors
    ///
    /// Fails on an invalid path.
    pub fn hang_read(mut self, path: &str) -> Result<Self> {
        self.faults.hung_reads.insert(FsPath::parse(path)?);
        Ok(self)
    }

    /// Delay every mover's readiness.
    #[must_use]
    pub const fn ready_delay(mut self, delay: Duration) -> Self {
        self.faults.ready_delay = Some(delay);
        self
    }

    /// Freeze the tree into a namespace and a transfer service sharing it.
    #[must_use]
    pub fn build(self) -> (Arc<MemoryNamespace>, Arc<MemoryTransferService>) {
        let shared = Arc::new(self);
        (
            Arc::new(MemoryNamespace {
                tree: Arc::clone(&shared),
            }),
            Arc::new(MemoryTransferService {
                tree: shared,
                log: TransferLog::default(),
            }),
        )
    }

    fn insert(&mut self, path: FsPath, attributes: FileAttributes, contents: Vec<u8>) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("cannot replace the root directory"))?;
        let name = path
            .name()
            .ok_or_else(|| anyhow!("path {path} has no name"))?
            .to_owned();
        if !self.nodes.contains_key(&parent) {
            self.insert(
                parent.clone(),
                FileAttributes::directory().with_mode(0o755).with_owner(0, 0),
                Vec::new(),
            )?;
        }
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or_else(|| anyhow!("parent {parent} missing"))?;
        if !parent_node.attributes.is_directory() {
            return Err(anyhow!("parent {parent} is not a directory"));
        }
        if !parent_node.children.contains(&name) {
            parent_node.children.push(name);
        }
        match self.nodes.get_mut(&path) {
            Some(existing) => {
                existing.attributes = attributes;
                existing.contents = Arc::from(contents);
            }
            None => {
                self.nodes.insert(
                    path,
                    Node {
                        attributes,
                        children: Vec::new(),
                        contents: Arc::from(contents),
                    },
                );
            }
        }
        Ok(())
    }
}

/// Namespace backed by a [`MemoryTree`].
#[derive(Debug)]
pub struct MemoryNamespace {
    tree: Arc<MemoryTree>,
}

#[async_trait]
impl NamespaceService for MemoryNamespace {
    async fn stat(
        &self,
        _subject: &Subject,
        path: &FsPath,
        _required: &AttributeSet,
    ) -> NamespaceResult<FileAttributes> {
        self.tree
            .nodes
            .get(path)
            .map(|node| node.attributes.clone())
            .ok_or_else(|| NamespaceError::NotFound { path: path.clone() })
    }

    async fn list(
        &self,
        _subject: &Subject,
        path: &FsPath,
        _required: &AttributeSet,
    ) -> NamespaceResult<Vec<DirectoryEntry>> {
        if self.tree.faults.listing.contains(path) {
            return Err(NamespaceError::Other {
                operation: "list",
                path: path.clone(),
                source: Box::new(io::Error::other("injected listing failure")),
            });
        }
        let node = self
            .tree
            .nodes
            .get(path)
            .ok_or_else(|| NamespaceError::NotFound { path: path.clone() })?;
        if !node.attributes.is_directory() {
            return Err(NamespaceError::NotADirectory { path: path.clone() });
        }
        let mut entries = Vec::with_capacity(node.children.len());
        for name in &node.children {
            let child = path.join(name).map_err(|err| NamespaceError::Other {
                operation: "list",
                path: path.clone(),
                source: Box::new(err),
            })?;
            if let Some(child) = self.tree.nodes.get(&child) {
                entries.push(DirectoryEntry::new(name.clone(), child.attributes.clone()));
            }
        }
        Ok(entries)
    }
}

#[derive(Debug, Default)]
struct LogState {
    started: Vec<FsPath>,
    releases: HashMap<FsPath, usize>,
    kills: HashMap<FsPath, usize>,
    outstanding: usize,
    max_outstanding: usize,
}

/// Records what the pipeline did with each transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferLog {
    state: Arc<Mutex<LogState>>,
}

impl TransferLog {
    fn lock(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn started_transfer(&self, path: &FsPath) {
        let mut state = self.lock();
        state.started.push(path.clone());
        state.outstanding += 1;
        state.max_outstanding = state.max_outstanding.max(state.outstanding);
    }

    fn released(&self, path: &FsPath) {
        let mut state = self.lock();
        let count = state.releases.entry(path.clone()).or_default();
        *count += 1;
        if *count == 1 {
            state.outstanding = state.outstanding.saturating_sub(1);
        }
    }

    fn killed(&self, path: &FsPath) {
        *self.lock().kills.entry(path.clone()).or_default() += 1;
    }

    /// Paths in the order transfers were successfully started.
    #[must_use]
    pub fn started(&self) -> Vec<FsPath> {
        self.lock().started.clone()
    }

    /// How often the transfer for `path` was released.
    #[must_use]
    pub fn releases(&self, path: &str) -> usize {
        FsPath::parse(path)
            .ok()
            .and_then(|path| self.lock().releases.get(&path).copied())
            .unwrap_or(0)
    }

    /// How often the transfer for `path` was killed.
    #[must_use]
    pub fn kills(&self, path: &str) -> usize {
        FsPath::parse(path)
            .ok()
            .and_then(|path| self.lock().kills.get(&path).copied())
            .unwrap_or(0)
    }

    /// Transfers started but not yet released.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Highest number of simultaneously unreleased transfers.
    #[must_use]
    pub fn max_outstanding(&self) -> usize {
        self.lock().max_outstanding
    }

    /// Whether every started transfer was released exactly once.
    #[must_use]
    pub fn each_released_once(&self) -> bool {
        let state = self.lock();
        state.releases.len() == state.started.len()
            && state.started.iter().all(|path| state.releases.get(path) == Some(&1))
    }
}

/// Transfer service serving file contents from a [`MemoryTree`].
#[derive(Debug)]
pub struct MemoryTransferService {
    tree: Arc<MemoryTree>,
    log: TransferLog,
}

impl MemoryTransferService {
    /// Log shared by every transfer this service starts.
    #[must_use]
    pub fn log(&self) -> TransferLog {
        self.log.clone()
    }
}

#[async_trait]
impl TransferService for MemoryTransferService {
    async fn start(
        &self,
        _subject: &Subject,
        path: &FsPath,
        _attributes: &FileAttributes,
    ) -> TransferResult<Box<dyn Transfer>> {
        if let Some(failure) = self.tree.faults.start.get(path) {
            return Err(failure.into_error(path));
        }
        let node = self
            .tree
            .nodes
            .get(path)
            .ok_or_else(|| TransferError::NotFound { path: path.clone() })?;
        if !node.attributes.is_regular() {
            return Err(TransferError::NotAFile { path: path.clone() });
        }
        self.log.started_transfer(path);
        Ok(Box::new(MemoryTransfer {
            id: TransferId::new(),
            path: path.clone(),
            contents: Arc::clone(&node.contents),
            faults: self.tree.faults.clone(),
            log: self.log.clone(),
        }))
    }
}

struct MemoryTransfer {
    id: TransferId,
    path: FsPath,
    contents: Arc<[u8]>,
    faults: Faults,
    log: TransferLog,
}

#[async_trait]
impl Transfer for MemoryTransfer {
    fn id(&self) -> TransferId {
        self.id
    }

    async fn wait_ready(&mut self) -> TransferResult<RedirectTarget> {
        if self.faults.stalled.contains(&self.path) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.faults.ready_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(RedirectTarget::new(format!("memory://{}", self.path)))
    }

    async fn open(&mut self) -> TransferResult<TransferReader> {
        if self.faults.hung_reads.contains(&self.path) {
            return Ok(Box::new(HungReader));
        }
        if self.faults.broken_reads.contains(&self.path) {
            let half = self.contents.len() / 2;
            let prefix = Cursor::new(self.contents[..half].to_vec());
            return Ok(Box::new(prefix.chain(BrokenReader)));
        }
        Ok(Box::new(Cursor::new(self.contents.to_vec())))
    }

    async fn finish(&mut self) -> TransferResult<()> {
        Ok(())
    }

    async fn kill(&self, _reason: &str) -> TransferResult<()> {
        self.log.killed(&self.path);
        Ok(())
    }

    fn release(&self) {
        self.log.released(&self.path);
    }
}

struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "injected read failure",
        )))
    }
}

struct HungReader;

impl AsyncRead for HungReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}
