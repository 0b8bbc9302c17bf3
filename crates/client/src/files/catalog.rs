//! Directory listing with classification and stable ordering.

use std::sync::Arc;

use protocol::messages::{EntryType, FileEntry};
use tracing::{debug, warn};

use super::collation::CollationKey;
use crate::backend::{RawEntry, RemoteFs, RemoteKind, RemoteStat};
use crate::error::{ShareError, ShareResult};
use crate::session::{RemoteAddress, RemoteHandle};

/// An immutable snapshot of one remote entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Entry name without trailing separator.
    pub name: String,
    /// Classified entry type.
    pub entry_type: EntryType,
    /// Canonical address, with trailing separator for directory-like entries.
    pub path: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modified time in milliseconds since the Unix epoch.
    pub last_modified: i64,
}

impl DirectoryEntry {
    /// Classify a remote object, or `None` for subtypes that are never listed.
    pub fn classify(address: &RemoteAddress, stat: &RemoteStat) -> Option<Self> {
        let entry_type = match (stat.kind, stat.is_directory) {
            (RemoteKind::Filesystem, false) => EntryType::File,
            (RemoteKind::Filesystem, true) => EntryType::Directory,
            (RemoteKind::Server, _) => EntryType::Server,
            (RemoteKind::Share, _) => EntryType::Share,
            _ => return None,
        };
        Some(Self {
            name: address.name().to_string(),
            entry_type,
            path: address.as_str().to_string(),
            size: if entry_type == EntryType::File { stat.size } else { 0 },
            last_modified: stat.modified_millis(),
        })
    }

    /// Whether the entry sorts with directories.
    pub fn is_directory_like(&self) -> bool {
        self.entry_type.is_directory_like()
    }

    /// Convert to protocol FileEntry.
    pub fn to_protocol(&self) -> FileEntry {
        FileEntry {
            name: self.name.clone(),
            entry_type: self.entry_type,
            path: self.path.clone(),
            size: self.size,
            last_modified: self.last_modified,
        }
    }
}

/// Sort entries: directory-like first, then by collated name, then by path.
pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by_cached_key(|e| {
        (
            !e.is_directory_like(),
            CollationKey::new(&e.name),
            e.path.clone(),
        )
    });
}

/// Lists and inspects remote entries.
#[derive(Clone)]
pub struct EntryCatalog {
    fs: Arc<dyn RemoteFs>,
}

impl EntryCatalog {
    /// Create a catalog over a remote filesystem.
    pub fn new(fs: Arc<dyn RemoteFs>) -> Self {
        Self { fs }
    }

    /// List the children of a directory-like target.
    ///
    /// Returns `Ok(None)` when the target does not exist.
    pub fn list(&self, handle: &RemoteHandle) -> ShareResult<Option<Vec<DirectoryEntry>>> {
        debug!(path = %handle.path(), backend = self.fs.name(), "Listing directory");
        if !self.fs.exists(handle)? {
            debug!(path = %handle.path(), "List target does not exist");
            return Ok(None);
        }

        let raw = self.fs.list(handle)?;
        let total = raw.len();
        let mut entries: Vec<DirectoryEntry> = raw
            .iter()
            .filter_map(|RawEntry { address, stat }| DirectoryEntry::classify(address, stat))
            .collect();
        if entries.len() != total {
            debug!(
                path = %handle.path(),
                skipped = total - entries.len(),
                "Dropped unsupported entry types"
            );
        }
        sort_entries(&mut entries);
        Ok(Some(entries))
    }

    /// Snapshot of a single entry.
    pub fn stat(&self, handle: &RemoteHandle) -> ShareResult<DirectoryEntry> {
        let stat = self
            .fs
            .stat(handle)?
            .ok_or_else(|| ShareError::NotFound(handle.path().to_string()))?;
        let address = handle.address().with_directory(stat.is_directory);
        DirectoryEntry::classify(&address, &stat).ok_or_else(|| {
            warn!(path = %handle.path(), kind = ?stat.kind, "Unsupported entry type");
            ShareError::Protocol(format!("{}: unsupported entry type", handle.path()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryShares;
    use crate::session::SessionContext;
    use std::time::SystemTime;

    fn setup() -> (MemoryShares, EntryCatalog, SessionContext) {
        let fs = MemoryShares::new();
        let catalog = EntryCatalog::new(Arc::new(fs.clone()));
        (fs, catalog, SessionContext::new())
    }

    fn names(entries: &[DirectoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_directories_first() {
        let (fs, catalog, ctx) = setup();
        fs.put_file("smb://nas/public/b.txt", "x").unwrap();
        fs.mkdir("smb://nas/public/a/").unwrap();

        let entries = catalog
            .list(&ctx.resolve("smb://nas/public/").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(names(&entries), vec!["a", "b.txt"]);
        assert_eq!(entries[0].entry_type, EntryType::Directory);
        assert_eq!(entries[0].path, "smb://nas/public/a/");
        assert_eq!(entries[1].entry_type, EntryType::File);
        assert_eq!(entries[1].size, 1);
    }

    #[test]
    fn test_missing_target_lists_none() {
        let (_fs, catalog, ctx) = setup();
        let result = catalog
            .list(&ctx.resolve("smb://nas/public/nothing/").unwrap())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_special_types_dropped() {
        let (fs, catalog, ctx) = setup();
        fs.add_share("nas", "public");
        fs.add_special("smb://nas/", "lp0", RemoteKind::Printer).unwrap();
        fs.add_special("smb://nas/", "IPC$", RemoteKind::NamedPipe).unwrap();
        fs.add_special("smb://nas/", "COM1", RemoteKind::Comm).unwrap();

        let entries = catalog
            .list(&ctx.resolve("smb://nas/").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(names(&entries), vec!["public"]);
        assert_eq!(entries[0].entry_type, EntryType::Share);
    }

    #[test]
    fn test_network_lists_servers() {
        let (fs, catalog, ctx) = setup();
        fs.add_server("zeta").add_server("alpha");
        fs.add_special("smb://", "WORKGROUP", RemoteKind::Workgroup).unwrap();

        let entries = catalog.list(&ctx.resolve("smb://").unwrap()).unwrap().unwrap();
        assert_eq!(names(&entries), vec!["alpha", "zeta"]);
        assert!(entries.iter().all(|e| e.entry_type == EntryType::Server));
    }

    #[test]
    fn test_collated_order_within_type() {
        let (fs, catalog, ctx) = setup();
        for name in ["Zebra.txt", "apple.txt", "Éclair.txt", "banana.txt"] {
            fs.put_file(&format!("smb://nas/public/{name}"), "").unwrap();
        }
        fs.mkdir("smb://nas/public/Zdir/").unwrap();

        let entries = catalog
            .list(&ctx.resolve("smb://nas/public/").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(
            names(&entries),
            vec!["Zdir", "apple.txt", "banana.txt", "Éclair.txt", "Zebra.txt"]
        );
    }

    #[test]
    fn test_listing_is_repeatable() {
        let (fs, catalog, ctx) = setup();
        for name in ["b", "B", "a", "á", "A"] {
            fs.put_file(&format!("smb://nas/public/{name}"), "").unwrap();
        }
        let handle = ctx.resolve("smb://nas/public/").unwrap();
        let first = catalog.list(&handle).unwrap().unwrap();
        for _ in 0..5 {
            assert_eq!(catalog.list(&handle).unwrap().unwrap(), first);
        }
        assert_eq!(names(&first), vec!["a", "A", "á", "b", "B"]);
    }

    #[test]
    fn test_stat_entry() {
        let (fs, catalog, ctx) = setup();
        fs.put_file("smb://nas/public/docs/report.pdf", vec![0u8; 42]).unwrap();

        let entry = catalog
            .stat(&ctx.resolve("smb://nas/public/docs/report.pdf").unwrap())
            .unwrap();
        assert_eq!(entry.name, "report.pdf");
        assert_eq!(entry.size, 42);
        assert!(entry.last_modified > 0);

        let dir = catalog.stat(&ctx.resolve("smb://nas/public/docs").unwrap()).unwrap();
        assert_eq!(dir.entry_type, EntryType::Directory);
        assert_eq!(dir.path, "smb://nas/public/docs/");

        let missing = catalog.stat(&ctx.resolve("smb://nas/public/nope").unwrap());
        assert!(matches!(missing, Err(ShareError::NotFound(_))));
    }

    #[test]
    fn test_to_protocol() {
        let address = RemoteAddress::parse("smb://nas/public/a.txt").unwrap();
        let stat = RemoteStat {
            kind: RemoteKind::Filesystem,
            is_directory: false,
            size: 7,
            modified: SystemTime::UNIX_EPOCH,
        };
        let entry = DirectoryEntry::classify(&address, &stat).unwrap();
        let wire = entry.to_protocol();
        assert_eq!(wire.name, "a.txt");
        assert_eq!(wire.entry_type, EntryType::File);
        assert_eq!(wire.path, "smb://nas/public/a.txt");
        assert_eq!(wire.size, 7);
        assert_eq!(wire.last_modified, 0);
    }
}
