//! Remote filesystem capability.
//!
//! The core never speaks the wire protocol itself. Everything it does goes
//! through [`RemoteFs`], a blocking, thread-safe client capability. Two
//! implementations ship with the crate:
//!
//! - [`MountedShares`]: shares exported from locally mounted directories
//! - [`MemoryShares`]: a fully in-process tree supporting every subtype

use std::io::{Read, Write};
use std::time::SystemTime;

use crate::error::{ShareError, ShareResult};
use crate::session::{RemoteAddress, RemoteHandle};

pub mod memory;
pub mod mounted;

pub use memory::MemoryShares;
pub use mounted::{Export, MountedShares};

/// Protocol-level subtype of a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteKind {
    /// A file or directory inside a share.
    Filesystem,
    /// A workgroup or domain.
    Workgroup,
    /// A server.
    Server,
    /// A disk share.
    Share,
    /// A printer queue.
    Printer,
    /// A named pipe.
    NamedPipe,
    /// A communications device.
    Comm,
}

/// Metadata for a remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStat {
    /// Protocol subtype.
    pub kind: RemoteKind,
    /// Whether the object can be listed.
    pub is_directory: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

impl RemoteStat {
    /// Milliseconds since the Unix epoch; 0 for times before it.
    pub fn modified_millis(&self) -> i64 {
        millis_since_epoch(self.modified)
    }
}

/// One child returned by [`RemoteFs::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Address of the child, with a trailing separator for directories.
    pub address: RemoteAddress,
    /// Child metadata.
    pub stat: RemoteStat,
}

/// Sequential byte stream opened from the start of a remote file.
pub type RemoteReader = Box<dyn Read + Send>;

/// Sequential byte sink writing a remote file from the start.
pub type RemoteWriter = Box<dyn Write + Send>;

/// Blocking remote filesystem client.
///
/// Implementations must be safe to call from many worker threads at once.
/// No method retries or times out.
pub trait RemoteFs: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Metadata for the target, or `None` when it does not exist.
    fn stat(&self, handle: &RemoteHandle) -> ShareResult<Option<RemoteStat>>;

    /// Children of a directory-like target, unordered and unfiltered.
    fn list(&self, handle: &RemoteHandle) -> ShareResult<Vec<RawEntry>>;

    /// Create an empty file; fails if the target already exists.
    fn create_file(&self, handle: &RemoteHandle) -> ShareResult<()>;

    /// Create an empty directory; fails if the target already exists.
    fn create_dir(&self, handle: &RemoteHandle) -> ShareResult<()>;

    /// Delete a file, or a directory and everything below it.
    fn delete(&self, handle: &RemoteHandle) -> ShareResult<()>;

    /// Rename `from` to `to`; fails if `to` already exists.
    fn rename(&self, from: &RemoteHandle, to: &RemoteHandle) -> ShareResult<()>;

    /// Copy `from` to `to`, recursively for directories. Existing files at
    /// the destination are overwritten.
    fn copy(&self, from: &RemoteHandle, to: &RemoteHandle) -> ShareResult<()>;

    /// Open the target for reading from offset 0.
    fn open_read(&self, handle: &RemoteHandle) -> ShareResult<RemoteReader>;

    /// Open the target for writing, creating or truncating it.
    fn open_write(&self, handle: &RemoteHandle) -> ShareResult<RemoteWriter>;

    /// Whether the target exists.
    fn exists(&self, handle: &RemoteHandle) -> ShareResult<bool> {
        Ok(self.stat(handle)?.is_some())
    }

    /// Reported length of the target in bytes.
    fn length(&self, handle: &RemoteHandle) -> ShareResult<u64> {
        self.stat(handle)?
            .map(|s| s.size)
            .ok_or_else(|| ShareError::NotFound(handle.path().to_string()))
    }
}

/// Milliseconds since the Unix epoch; 0 for times before it.
pub fn millis_since_epoch(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
