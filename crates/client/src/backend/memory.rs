//! In-process share tree.
//!
//! Holds servers, shares, directories, files and the special subtypes
//! (printers, named pipes, comm devices, workgroups) in memory. Writers append
//! straight into the tree, so bytes written before a failure stay visible.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tracing::debug;

use super::{RawEntry, RemoteFs, RemoteKind, RemoteReader, RemoteStat, RemoteWriter};
use crate::error::{ShareError, ShareResult};
use crate::session::{AddressLevel, RemoteAddress, RemoteHandle};

#[derive(Debug, Clone)]
struct Node {
    kind: RemoteKind,
    is_directory: bool,
    data: Vec<u8>,
    modified: SystemTime,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn dir(kind: RemoteKind) -> Self {
        Self {
            kind,
            is_directory: true,
            data: Vec::new(),
            modified: SystemTime::now(),
            children: BTreeMap::new(),
        }
    }

    fn file(data: Vec<u8>) -> Self {
        Self {
            kind: RemoteKind::Filesystem,
            is_directory: false,
            data,
            modified: SystemTime::now(),
            children: BTreeMap::new(),
        }
    }

    fn stat(&self) -> RemoteStat {
        RemoteStat {
            kind: self.kind,
            is_directory: self.is_directory,
            size: if self.is_directory { 0 } else { self.data.len() as u64 },
            modified: self.modified,
        }
    }

    fn get(&self, keys: &[String]) -> Option<&Node> {
        keys.iter().try_fold(self, |node, key| node.children.get(key))
    }

    fn get_mut(&mut self, keys: &[String]) -> Option<&mut Node> {
        keys.iter()
            .try_fold(self, |node, key| node.children.get_mut(key))
    }
}

#[derive(Debug)]
struct State {
    root: Node,
    credentials: HashMap<(String, String), (String, String)>,
    read_only: HashSet<Vec<String>>,
    read_faults: HashMap<Vec<String>, u64>,
}

/// [`RemoteFs`] over an in-memory tree.
///
/// Cloning yields another handle onto the same tree.
#[derive(Debug, Clone)]
pub struct MemoryShares {
    state: Arc<Mutex<State>>,
    reads_opened: Arc<AtomicUsize>,
}

impl Default for MemoryShares {
    fn default() -> Self {
        Self::new()
    }
}

fn keys_of(address: &RemoteAddress) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(host) = address.host() {
        keys.push(host.to_string());
        if let Some(share) = address.share() {
            keys.push(share.to_string());
            keys.extend(address.entry_segments().iter().cloned());
        }
    }
    keys
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryShares {
    /// Create an empty network.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                root: Node::dir(RemoteKind::Workgroup),
                credentials: HashMap::new(),
                read_only: HashSet::new(),
                read_faults: HashMap::new(),
            })),
            reads_opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn parse(path: &str) -> ShareResult<Vec<String>> {
        Ok(keys_of(&RemoteAddress::parse(path)?))
    }

    /// Publish a server.
    pub fn add_server(&self, host: &str) -> &Self {
        let mut state = lock(&self.state);
        state
            .root
            .children
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| Node::dir(RemoteKind::Server));
        self
    }

    /// Publish a share, adding its server if needed.
    pub fn add_share(&self, host: &str, share: &str) -> &Self {
        let mut state = lock(&self.state);
        state
            .root
            .children
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| Node::dir(RemoteKind::Server))
            .children
            .entry(share.to_string())
            .or_insert_with(|| Node::dir(RemoteKind::Share));
        self
    }

    /// Add a non-filesystem object (printer, pipe, workgroup...) under `parent`.
    pub fn add_special(&self, parent: &str, name: &str, kind: RemoteKind) -> ShareResult<()> {
        let keys = Self::parse(parent)?;
        let mut state = lock(&self.state);
        let node = state
            .root
            .get_mut(&keys)
            .ok_or_else(|| ShareError::NotFound(parent.to_string()))?;
        let mut special = Node::dir(kind);
        special.is_directory = matches!(kind, RemoteKind::Workgroup);
        node.children.insert(name.to_string(), special);
        Ok(())
    }

    /// Create directories along `path`, including its server and share.
    pub fn mkdir(&self, path: &str) -> ShareResult<()> {
        let keys = Self::parse(path)?;
        let mut state = lock(&self.state);
        let mut node = &mut state.root;
        for (depth, key) in keys.iter().enumerate() {
            let kind = match depth {
                0 => RemoteKind::Server,
                1 => RemoteKind::Share,
                _ => RemoteKind::Filesystem,
            };
            node = node
                .children
                .entry(key.clone())
                .or_insert_with(|| Node::dir(kind));
            if !node.is_directory {
                return Err(ShareError::Protocol(format!("{path}: not a directory")));
            }
        }
        Ok(())
    }

    /// Store a file, creating parent directories as needed.
    pub fn put_file(&self, path: &str, data: impl Into<Vec<u8>>) -> ShareResult<()> {
        let address = RemoteAddress::parse(path)?;
        if address.level() != AddressLevel::Entry {
            return Err(ShareError::MalformedAddress(format!("{path}: not a file path")));
        }
        if let Some(parent) = address.parent() {
            self.mkdir(parent.as_str())?;
        }
        let keys = keys_of(&address);
        let (name, parent_keys) = keys
            .split_last()
            .ok_or_else(|| ShareError::MalformedAddress(path.to_string()))?;
        let mut state = lock(&self.state);
        if let Some(parent) = state.root.get_mut(parent_keys) {
            parent.children.insert(name.clone(), Node::file(data.into()));
        }
        Ok(())
    }

    /// Contents of a file, if present.
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        let keys = Self::parse(path).ok()?;
        let state = lock(&self.state);
        state
            .root
            .get(&keys)
            .filter(|n| !n.is_directory)
            .map(|n| n.data.clone())
    }

    /// Require a credential for every access to a share.
    pub fn require_credential(&self, host: &str, share: &str, username: &str, password: &str) {
        lock(&self.state).credentials.insert(
            (host.to_ascii_lowercase(), share.to_string()),
            (username.to_string(), password.to_string()),
        );
    }

    /// Mark an object read-only: delete, rename and writes are refused.
    pub fn set_read_only(&self, path: &str, read_only: bool) -> ShareResult<()> {
        let keys = Self::parse(path)?;
        let mut state = lock(&self.state);
        if read_only {
            state.read_only.insert(keys);
        } else {
            state.read_only.remove(&keys);
        }
        Ok(())
    }

    /// Make readers of `path` fail with a connection reset after `after` bytes.
    pub fn interrupt_reads_after(&self, path: &str, after: u64) -> ShareResult<()> {
        let keys = Self::parse(path)?;
        lock(&self.state).read_faults.insert(keys, after);
        Ok(())
    }

    /// Number of read streams opened so far.
    pub fn reads_opened(&self) -> usize {
        self.reads_opened.load(Ordering::Relaxed)
    }

    fn authorize(state: &State, handle: &RemoteHandle, keys: &[String]) -> ShareResult<()> {
        if keys.len() < 2 {
            return Ok(());
        }
        let Some((user, pass)) = state.credentials.get(&(keys[0].clone(), keys[1].clone()))
        else {
            return Ok(());
        };
        match handle.credential() {
            Some(c) if c.matches(user, pass) => Ok(()),
            Some(c) => Err(ShareError::AuthenticationFailure(format!(
                "{}: logon failure for {}",
                handle.path(),
                c.username()
            ))),
            None => Err(ShareError::AuthenticationFailure(format!(
                "{}: share requires a credential",
                handle.path()
            ))),
        }
    }

    fn entry_keys(state: &State, handle: &RemoteHandle) -> ShareResult<Vec<String>> {
        let keys = keys_of(handle.address());
        Self::authorize(state, handle, &keys)?;
        if keys.len() < 3 {
            return Err(ShareError::PermissionDenied(format!(
                "{}: servers and shares cannot be modified",
                handle.path()
            )));
        }
        Ok(keys)
    }

    fn writable(state: &State, handle: &RemoteHandle, keys: &[String]) -> ShareResult<()> {
        if state.read_only.iter().any(|ro| keys.starts_with(ro)) {
            return Err(ShareError::PermissionDenied(format!(
                "{}: read-only",
                handle.path()
            )));
        }
        Ok(())
    }

    fn parent_dir<'s>(
        root: &'s mut Node,
        keys: &[String],
        target: &str,
    ) -> ShareResult<&'s mut Node> {
        let parent_keys = &keys[..keys.len() - 1];
        match root.get_mut(parent_keys) {
            Some(node) if node.is_directory => Ok(node),
            Some(_) => Err(ShareError::Protocol(format!("{target}: parent is not a directory"))),
            None => Err(ShareError::NotFound(target.to_string())),
        }
    }

    fn insert_new(&self, handle: &RemoteHandle, node: Node) -> ShareResult<()> {
        let mut state = lock(&self.state);
        let keys = Self::entry_keys(&state, handle)?;
        Self::writable(&state, handle, &keys)?;
        let parent = Self::parent_dir(&mut state.root, &keys, handle.path())?;
        let name = &keys[keys.len() - 1];
        if parent.children.contains_key(name) {
            return Err(ShareError::Protocol(format!("{}: already exists", handle.path())));
        }
        parent.children.insert(name.clone(), node);
        parent.modified = SystemTime::now();
        Ok(())
    }
}

impl RemoteFs for MemoryShares {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn stat(&self, handle: &RemoteHandle) -> ShareResult<Option<RemoteStat>> {
        let state = lock(&self.state);
        let keys = keys_of(handle.address());
        if state.root.get(&keys).is_none() {
            return Ok(None);
        }
        Self::authorize(&state, handle, &keys)?;
        Ok(state.root.get(&keys).map(Node::stat))
    }

    fn list(&self, handle: &RemoteHandle) -> ShareResult<Vec<RawEntry>> {
        let state = lock(&self.state);
        let keys = keys_of(handle.address());
        let node = state
            .root
            .get(&keys)
            .ok_or_else(|| ShareError::NotFound(handle.path().to_string()))?;
        Self::authorize(&state, handle, &keys)?;
        if !node.is_directory {
            return Err(ShareError::Protocol(format!("{}: not a directory", handle.path())));
        }
        let base = handle.address().with_directory(true);
        let entries = node
            .children
            .iter()
            .map(|(name, child)| {
                Ok(RawEntry {
                    address: base.child(name, child.is_directory)?,
                    stat: child.stat(),
                })
            })
            .collect::<ShareResult<Vec<_>>>()?;
        debug!(path = %handle.path(), count = entries.len(), "Listed memory directory");
        Ok(entries)
    }

    fn create_file(&self, handle: &RemoteHandle) -> ShareResult<()> {
        self.insert_new(handle, Node::file(Vec::new()))
    }

    fn create_dir(&self, handle: &RemoteHandle) -> ShareResult<()> {
        self.insert_new(handle, Node::dir(RemoteKind::Filesystem))
    }

    fn delete(&self, handle: &RemoteHandle) -> ShareResult<()> {
        let mut state = lock(&self.state);
        let keys = Self::entry_keys(&state, handle)?;
        Self::writable(&state, handle, &keys)?;
        let parent = Self::parent_dir(&mut state.root, &keys, handle.path())?;
        parent
            .children
            .remove(&keys[keys.len() - 1])
            .map(drop)
            .ok_or_else(|| ShareError::NotFound(handle.path().to_string()))
    }

    fn rename(&self, from: &RemoteHandle, to: &RemoteHandle) -> ShareResult<()> {
        let mut state = lock(&self.state);
        let from_keys = Self::entry_keys(&state, from)?;
        let to_keys = Self::entry_keys(&state, to)?;
        Self::writable(&state, from, &from_keys)?;
        Self::writable(&state, to, &to_keys)?;
        if from_keys[..2] != to_keys[..2] {
            return Err(ShareError::Protocol(format!(
                "{} -> {}: rename across shares",
                from.path(),
                to.path()
            )));
        }
        if state.root.get(&from_keys).is_none() {
            return Err(ShareError::NotFound(from.path().to_string()));
        }
        if state.root.get(&to_keys).is_some() {
            return Err(ShareError::Protocol(format!("{}: already exists", to.path())));
        }
        if to_keys.starts_with(&from_keys) {
            return Err(ShareError::Protocol(format!(
                "{} -> {}: cannot move a directory into itself",
                from.path(),
                to.path()
            )));
        }
        Self::parent_dir(&mut state.root, &to_keys, to.path())?;
        let node = Self::parent_dir(&mut state.root, &from_keys, from.path())?
            .children
            .remove(&from_keys[from_keys.len() - 1])
            .ok_or_else(|| ShareError::NotFound(from.path().to_string()))?;
        Self::parent_dir(&mut state.root, &to_keys, to.path())?
            .children
            .insert(to_keys[to_keys.len() - 1].clone(), node);
        Ok(())
    }

    fn copy(&self, from: &RemoteHandle, to: &RemoteHandle) -> ShareResult<()> {
        let mut state = lock(&self.state);
        let from_keys = Self::entry_keys(&state, from)?;
        let to_keys = Self::entry_keys(&state, to)?;
        Self::writable(&state, to, &to_keys)?;
        let node = state
            .root
            .get(&from_keys)
            .cloned()
            .ok_or_else(|| ShareError::NotFound(from.path().to_string()))?;
        if node.is_directory && to_keys.starts_with(&from_keys) {
            return Err(ShareError::Protocol(format!(
                "{} -> {}: cannot copy a directory into itself",
                from.path(),
                to.path()
            )));
        }
        let parent = Self::parent_dir(&mut state.root, &to_keys, to.path())?;
        parent.children.insert(to_keys[to_keys.len() - 1].clone(), node);
        Ok(())
    }

    fn open_read(&self, handle: &RemoteHandle) -> ShareResult<RemoteReader> {
        let state = lock(&self.state);
        let keys = Self::entry_keys(&state, handle)?;
        let node = state
            .root
            .get(&keys)
            .ok_or_else(|| ShareError::NotFound(handle.path().to_string()))?;
        if node.is_directory {
            return Err(ShareError::Protocol(format!("{}: is a directory", handle.path())));
        }
        self.reads_opened.fetch_add(1, Ordering::Relaxed);
        let reader = Cursor::new(node.data.clone());
        match state.read_faults.get(&keys) {
            Some(&after) => Ok(Box::new(FaultyReader {
                inner: reader,
                remaining: after,
            })),
            None => Ok(Box::new(reader)),
        }
    }

    fn open_write(&self, handle: &RemoteHandle) -> ShareResult<RemoteWriter> {
        let mut state = lock(&self.state);
        let keys = Self::entry_keys(&state, handle)?;
        Self::writable(&state, handle, &keys)?;
        let parent = Self::parent_dir(&mut state.root, &keys, handle.path())?;
        let name = keys[keys.len() - 1].clone();
        if parent.children.get(&name).is_some_and(|n| n.is_directory) {
            return Err(ShareError::Protocol(format!("{}: is a directory", handle.path())));
        }
        parent.children.insert(name, Node::file(Vec::new()));
        drop(state);
        Ok(Box::new(MemoryWriter {
            state: Arc::clone(&self.state),
            keys,
        }))
    }
}

/// Appends into the live tree on every write.
struct MemoryWriter {
    state: Arc<Mutex<State>>,
    keys: Vec<String>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        let node = state
            .root
            .get_mut(&self.keys)
            .filter(|n| !n.is_directory)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file removed while writing"))?;
        node.data.extend_from_slice(buf);
        node.modified = SystemTime::now();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FaultyReader {
    inner: Cursor<Vec<u8>>,
    remaining: u64,
}

impl Read for FaultyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 && !buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let cap = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..cap])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}
