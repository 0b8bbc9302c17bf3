//! Shares exported from locally mounted directories.
//!
//! Each [`Export`] maps `smb://host/name/` onto a local directory, typically
//! the mount point of a CIFS share. Addresses below the share map onto paths
//! below the export root.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{RawEntry, RemoteFs, RemoteKind, RemoteReader, RemoteStat, RemoteWriter};
use crate::error::{ShareError, ShareResult};
use crate::session::{AddressLevel, RemoteAddress, RemoteHandle};

/// A share backed by a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    /// Server name the share is published under.
    pub host: String,
    /// Share name.
    pub name: String,
    /// Local directory holding the share contents.
    pub root: PathBuf,
    /// Account required to access the share, if any.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for `username`.
    #[serde(default)]
    pub password: Option<String>,
}

impl Export {
    /// Create an export open to anonymous sessions.
    pub fn new(host: impl Into<String>, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
            root: root.into(),
            username: None,
            password: None,
        }
    }

    /// Require a credential for this export.
    pub fn with_credential(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    fn matches(&self, host: &str, share: &str) -> bool {
        self.host.eq_ignore_ascii_case(host) && self.name.eq_ignore_ascii_case(share)
    }

    fn authorize(&self, handle: &RemoteHandle) -> ShareResult<()> {
        let Some(required) = &self.username else {
            return Ok(());
        };
        let password = self.password.as_deref().unwrap_or_default();
        match handle.credential() {
            Some(c) if c.matches(required, password) => Ok(()),
            Some(c) => {
                warn!(host = %self.host, share = %self.name, username = %c.username(), "Logon rejected");
                Err(ShareError::AuthenticationFailure(format!(
                    "{}: logon failure for {}",
                    handle.path(),
                    c.username()
                )))
            }
            None => Err(ShareError::AuthenticationFailure(format!(
                "{}: share requires a credential",
                handle.path()
            ))),
        }
    }
}

/// [`RemoteFs`] over locally mounted exports.
#[derive(Debug, Clone, Default)]
pub struct MountedShares {
    exports: Vec<Export>,
}

/// Where an address lands after export lookup.
enum Target<'a> {
    Network,
    Server(&'a str),
    Local { export: &'a Export, path: PathBuf },
}

impl MountedShares {
    /// Create a backend serving the given exports.
    pub fn new(exports: Vec<Export>) -> Self {
        Self { exports }
    }

    /// Exports served by this backend.
    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = Vec::new();
        for export in &self.exports {
            if !hosts.iter().any(|h| h.eq_ignore_ascii_case(&export.host)) {
                hosts.push(&export.host);
            }
        }
        hosts
    }

    fn target<'a>(&'a self, handle: &RemoteHandle) -> ShareResult<Target<'a>> {
        let address = handle.address();
        match (address.level(), address.host(), address.share()) {
            (AddressLevel::Network, _, _) => Ok(Target::Network),
            (AddressLevel::Server, Some(host), _) => self
                .exports
                .iter()
                .find(|e| e.host.eq_ignore_ascii_case(host))
                .map(|e| Target::Server(e.host.as_str()))
                .ok_or_else(|| ShareError::NotFound(handle.path().to_string())),
            (_, Some(host), Some(share)) => {
                let export = self
                    .exports
                    .iter()
                    .find(|e| e.matches(host, share))
                    .ok_or_else(|| ShareError::NotFound(handle.path().to_string()))?;
                export.authorize(handle)?;
                let path = address
                    .entry_segments()
                    .iter()
                    .fold(export.root.clone(), |acc, seg| acc.join(seg));
                Ok(Target::Local { export, path })
            }
            _ => Err(ShareError::MalformedAddress(handle.path().to_string())),
        }
    }

    fn local<'a>(&'a self, handle: &RemoteHandle) -> ShareResult<(&'a Export, PathBuf)> {
        match self.target(handle)? {
            Target::Local { export, path } if handle.address().level() == AddressLevel::Entry => {
                Ok((export, path))
            }
            _ => Err(ShareError::PermissionDenied(format!(
                "{}: servers and shares cannot be modified",
                handle.path()
            ))),
        }
    }

    fn stat_local(path: &Path, kind: RemoteKind, target: &str) -> ShareResult<Option<RemoteStat>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(RemoteStat {
                kind,
                is_directory: meta.is_dir(),
                size: if meta.is_file() { meta.len() } else { 0 },
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ShareError::from_io(e, target)),
        }
    }

    fn virtual_stat(kind: RemoteKind) -> RemoteStat {
        RemoteStat {
            kind,
            is_directory: true,
            size: 0,
            modified: SystemTime::UNIX_EPOCH,
        }
    }
}

impl RemoteFs for MountedShares {
    fn name(&self) -> &'static str {
        "mounted"
    }

    fn stat(&self, handle: &RemoteHandle) -> ShareResult<Option<RemoteStat>> {
        let target = match self.target(handle) {
            Ok(t) => t,
            Err(ShareError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        match target {
            Target::Network => Ok(Some(Self::virtual_stat(RemoteKind::Workgroup))),
            Target::Server(_) => Ok(Some(Self::virtual_stat(RemoteKind::Server))),
            Target::Local { path, .. } => {
                let kind = if handle.address().level() == AddressLevel::Share {
                    RemoteKind::Share
                } else {
                    RemoteKind::Filesystem
                };
                Self::stat_local(&path, kind, handle.path())
            }
        }
    }

    fn list(&self, handle: &RemoteHandle) -> ShareResult<Vec<RawEntry>> {
        let address = handle.address().with_directory(true);
        match self.target(handle)? {
            Target::Network => self
                .hosts()
                .into_iter()
                .map(|host| {
                    Ok(RawEntry {
                        address: address.child(host, true)?,
                        stat: Self::virtual_stat(RemoteKind::Server),
                    })
                })
                .collect(),
            Target::Server(host) => self
                .exports
                .iter()
                .filter(|e| e.host.eq_ignore_ascii_case(host))
                .map(|e| {
                    Ok(RawEntry {
                        address: address.child(&e.name, true)?,
                        stat: Self::virtual_stat(RemoteKind::Share),
                    })
                })
                .collect(),
            Target::Local { path, .. } => {
                let read_dir =
                    fs::read_dir(&path).map_err(|e| ShareError::from_io(e, handle.path()))?;
                let mut results = Vec::new();
                for entry_result in read_dir {
                    let entry = match entry_result {
                        Ok(e) => e,
                        Err(_) => continue, // Skip entries we can't read
                    };
                    let name = entry.file_name().to_string_lossy().to_string();
                    let stat =
                        match Self::stat_local(&entry.path(), RemoteKind::Filesystem, &name) {
                            Ok(Some(s)) => s,
                            // dangling symlinks and unreadable entries
                            _ => continue,
                        };
                    results.push(RawEntry {
                        address: address.child(&name, stat.is_directory)?,
                        stat,
                    });
                }
                debug!(path = %handle.path(), count = results.len(), "Listed mounted directory");
                Ok(results)
            }
        }
    }

    fn create_file(&self, handle: &RemoteHandle) -> ShareResult<()> {
        let (_, path) = self.local(handle)?;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map(drop)
            .map_err(|e| ShareError::from_io(e, handle.path()))
    }

    fn create_dir(&self, handle: &RemoteHandle) -> ShareResult<()> {
        let (_, path) = self.local(handle)?;
        fs::create_dir(&path).map_err(|e| ShareError::from_io(e, handle.path()))
    }

    fn delete(&self, handle: &RemoteHandle) -> ShareResult<()> {
        let (_, path) = self.local(handle)?;
        let meta = fs::symlink_metadata(&path).map_err(|e| ShareError::from_io(e, handle.path()))?;
        let result = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| ShareError::from_io(e, handle.path()))
    }

    fn rename(&self, from: &RemoteHandle, to: &RemoteHandle) -> ShareResult<()> {
        let (from_export, from_path) = self.local(from)?;
        let (to_export, to_path) = self.local(to)?;
        if from_export != to_export {
            return Err(ShareError::Protocol(format!(
                "{} -> {}: rename across shares",
                from.path(),
                to.path()
            )));
        }
        if !from_path.exists() {
            return Err(ShareError::NotFound(from.path().to_string()));
        }
        if to_path.exists() {
            return Err(ShareError::Protocol(format!("{}: already exists", to.path())));
        }
        fs::rename(&from_path, &to_path).map_err(|e| ShareError::from_io(e, from.path()))
    }

    fn copy(&self, from: &RemoteHandle, to: &RemoteHandle) -> ShareResult<()> {
        let (_, from_path) = self.local(from)?;
        let (_, to_path) = self.local(to)?;
        let meta = fs::metadata(&from_path).map_err(|e| ShareError::from_io(e, from.path()))?;
        if meta.is_dir() {
            if from.address().with_directory(true).contains(to.address()) {
                return Err(ShareError::Protocol(format!(
                    "{} -> {}: cannot copy a directory into itself",
                    from.path(),
                    to.path()
                )));
            }
            copy_tree(&from_path, &to_path).map_err(|e| ShareError::from_io(e, to.path()))
        } else {
            fs::copy(&from_path, &to_path)
                .map(drop)
                .map_err(|e| ShareError::from_io(e, to.path()))
        }
    }

    fn open_read(&self, handle: &RemoteHandle) -> ShareResult<RemoteReader> {
        let (_, path) = self.local(handle)?;
        if path.is_dir() {
            return Err(ShareError::Protocol(format!("{}: is a directory", handle.path())));
        }
        let file = File::open(&path).map_err(|e| ShareError::from_io(e, handle.path()))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, handle: &RemoteHandle) -> ShareResult<RemoteWriter> {
        let (_, path) = self.local(handle)?;
        let file = File::create(&path).map_err(|e| ShareError::from_io(e, handle.path()))?;
        Ok(Box::new(file))
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Build an address for an export root; used by callers that enumerate exports.
pub fn export_address(export: &Export) -> ShareResult<RemoteAddress> {
    RemoteAddress::parse(&format!("smb://{}/{}/", export.host, export.name))
}
