//! Create, delete, rename, copy and move.

use std::sync::Arc;
use std::time::SystemTime;

use protocol::messages::EntryType;
use tracing::{debug, info, warn};

use super::catalog::DirectoryEntry;
use crate::backend::{millis_since_epoch, RemoteFs};
use crate::error::{ShareError, ShareResult};
use crate::session::RemoteHandle;

/// Result of a move.
///
/// A move is a copy followed by a delete of the source. When the delete
/// fails the copy is not rolled back and both locations hold the data.
#[derive(Debug)]
pub enum MoveOutcome {
    /// The copy and the delete both succeeded.
    Moved,
    /// The copy succeeded but deleting the source failed.
    CopiedSourceRemains {
        /// Why the source could not be deleted.
        cause: ShareError,
    },
}

impl MoveOutcome {
    /// Whether the source is gone.
    pub fn is_complete(&self) -> bool {
        matches!(self, MoveOutcome::Moved)
    }
}

/// Mutating operations on remote entries.
#[derive(Clone)]
pub struct FileOps {
    fs: Arc<dyn RemoteFs>,
}

impl FileOps {
    /// Create file operations over a remote filesystem.
    pub fn new(fs: Arc<dyn RemoteFs>) -> Self {
        Self { fs }
    }

    fn created(handle: &RemoteHandle, entry_type: EntryType) -> DirectoryEntry {
        let address = handle
            .address()
            .with_directory(entry_type == EntryType::Directory);
        DirectoryEntry {
            name: address.name().to_string(),
            entry_type,
            path: address.as_str().to_string(),
            size: 0,
            last_modified: millis_since_epoch(SystemTime::now()),
        }
    }

    /// Create an empty file. Fails with a protocol error if it exists.
    pub fn create_file(&self, handle: &RemoteHandle) -> ShareResult<DirectoryEntry> {
        self.fs.create_file(handle)?;
        info!(path = %handle.path(), "Created file");
        Ok(Self::created(handle, EntryType::File))
    }

    /// Create an empty directory. Fails with a protocol error if it exists.
    pub fn create_directory(&self, handle: &RemoteHandle) -> ShareResult<DirectoryEntry> {
        self.fs.create_dir(handle)?;
        info!(path = %handle.path(), "Created directory");
        Ok(Self::created(handle, EntryType::Directory))
    }

    /// Delete a file, or a directory recursively.
    pub fn delete(&self, handle: &RemoteHandle) -> ShareResult<()> {
        if !self.fs.exists(handle)? {
            return Err(ShareError::NotFound(handle.path().to_string()));
        }
        self.fs.delete(handle)?;
        info!(path = %handle.path(), "Deleted");
        Ok(())
    }

    /// Rename `from` to `to`.
    pub fn rename(&self, from: &RemoteHandle, to: &RemoteHandle) -> ShareResult<()> {
        self.fs.rename(from, to)?;
        info!(from = %from.path(), to = %to.path(), "Renamed");
        Ok(())
    }

    /// Copy `from` to `to`, recursively for directories.
    pub fn copy(&self, from: &RemoteHandle, to: &RemoteHandle) -> ShareResult<()> {
        debug!(from = %from.path(), to = %to.path(), "Copying");
        self.fs.copy(from, to)?;
        info!(from = %from.path(), to = %to.path(), "Copied");
        Ok(())
    }

    /// Copy `from` to `to`, then delete `from`.
    ///
    /// A failed copy is an error. A failed delete after a good copy is
    /// reported as [`MoveOutcome::CopiedSourceRemains`].
    pub fn move_entry(&self, from: &RemoteHandle, to: &RemoteHandle) -> ShareResult<MoveOutcome> {
        self.fs.copy(from, to)?;
        match self.fs.delete(from) {
            Ok(()) => {
                info!(from = %from.path(), to = %to.path(), "Moved");
                Ok(MoveOutcome::Moved)
            }
            Err(cause) => {
                warn!(
                    from = %from.path(),
                    to = %to.path(),
                    error = %cause,
                    "Move copied but could not delete source"
                );
                Ok(MoveOutcome::CopiedSourceRemains { cause })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Export, MemoryShares, MountedShares};
    use crate::session::SessionContext;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (MemoryShares, FileOps, SessionContext) {
        let fs = MemoryShares::new();
        fs.add_share("nas", "public");
        let ops = FileOps::new(Arc::new(fs.clone()));
        (fs, ops, SessionContext::new())
    }

    #[test]
    fn test_create_file_snapshot() {
        let (_fs, ops, ctx) = setup();
        let before = millis_since_epoch(SystemTime::now());
        let entry = ops
            .create_file(&ctx.resolve("smb://nas/public/new.txt").unwrap())
            .unwrap();
        assert_eq!(entry.name, "new.txt");
        assert_eq!(entry.entry_type, EntryType::File);
        assert_eq!(entry.size, 0);
        assert!(entry.last_modified >= before);
    }

    #[test]
    fn test_create_existing_fails_protocol() {
        let (fs, ops, ctx) = setup();
        fs.put_file("smb://nas/public/a.txt", "x").unwrap();
        let result = ops.create_file(&ctx.resolve("smb://nas/public/a.txt").unwrap());
        assert!(matches!(result, Err(ShareError::Protocol(_))));
    }

    #[test]
    fn test_create_directory_snapshot() {
        let (_fs, ops, ctx) = setup();
        let entry = ops
            .create_directory(&ctx.resolve("smb://nas/public/photos").unwrap())
            .unwrap();
        assert_eq!(entry.entry_type, EntryType::Directory);
        assert_eq!(entry.path, "smb://nas/public/photos/");
        assert_eq!(entry.name, "photos");
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (_fs, ops, ctx) = setup();
        let result = ops.delete(&ctx.resolve("smb://nas/public/ghost").unwrap());
        assert!(matches!(result, Err(ShareError::NotFound(_))));
    }

    #[test]
    fn test_delete_directory_recursive() {
        let (fs, ops, ctx) = setup();
        fs.put_file("smb://nas/public/d/e/f.txt", "x").unwrap();
        ops.delete(&ctx.resolve("smb://nas/public/d/").unwrap()).unwrap();
        assert!(fs.file_contents("smb://nas/public/d/e/f.txt").is_none());
    }

    #[test]
    fn test_move_complete() {
        let (fs, ops, ctx) = setup();
        fs.put_file("smb://nas/public/a.txt", "data").unwrap();
        let outcome = ops
            .move_entry(
                &ctx.resolve("smb://nas/public/a.txt").unwrap(),
                &ctx.resolve("smb://nas/public/b.txt").unwrap(),
            )
            .unwrap();
        assert!(outcome.is_complete());
        assert!(fs.file_contents("smb://nas/public/a.txt").is_none());
        assert_eq!(fs.file_contents("smb://nas/public/b.txt").unwrap(), b"data");
    }

    #[test]
    fn test_move_partial_when_delete_fails() {
        let (fs, ops, ctx) = setup();
        fs.put_file("smb://nas/public/locked/a.txt", "data").unwrap();
        fs.mkdir("smb://nas/public/dest/").unwrap();
        fs.set_read_only("smb://nas/public/locked/", true).unwrap();

        let outcome = ops
            .move_entry(
                &ctx.resolve("smb://nas/public/locked/a.txt").unwrap(),
                &ctx.resolve("smb://nas/public/dest/a.txt").unwrap(),
            )
            .unwrap();
        match outcome {
            MoveOutcome::CopiedSourceRemains { cause } => {
                assert!(matches!(cause, ShareError::PermissionDenied(_)));
            }
            MoveOutcome::Moved => panic!("expected partial move"),
        }
        assert_eq!(fs.file_contents("smb://nas/public/locked/a.txt").unwrap(), b"data");
        assert_eq!(fs.file_contents("smb://nas/public/dest/a.txt").unwrap(), b"data");
    }

    #[test]
    fn test_move_failed_copy_is_error() {
        let (_fs, ops, ctx) = setup();
        let result = ops.move_entry(
            &ctx.resolve("smb://nas/public/missing").unwrap(),
            &ctx.resolve("smb://nas/public/dest").unwrap(),
        );
        assert!(matches!(result, Err(ShareError::NotFound(_))));
    }

    #[test]
    fn test_mounted_copy_directory_recursive() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("src/inner")).unwrap();
        fs::write(temp_dir.path().join("src/inner/x.bin"), [1u8, 2, 3]).unwrap();
        let ops = FileOps::new(Arc::new(MountedShares::new(vec![Export::new(
            "nas",
            "public",
            temp_dir.path(),
        )])));
        let ctx = SessionContext::new();

        ops.copy(
            &ctx.resolve("smb://nas/public/src/").unwrap(),
            &ctx.resolve("smb://nas/public/dst/").unwrap(),
        )
        .unwrap();
        assert_eq!(
            fs::read(temp_dir.path().join("dst/inner/x.bin")).unwrap(),
            vec![1u8, 2, 3]
        );

        ops.rename(
            &ctx.resolve("smb://nas/public/dst/").unwrap(),
            &ctx.resolve("smb://nas/public/renamed/").unwrap(),
        )
        .unwrap();
        assert!(temp_dir.path().join("renamed/inner/x.bin").exists());
        assert!(!temp_dir.path().join("dst").exists());
    }
}
