//! Async façade over the blocking share components.
//!
//! [`ShareClient`] owns the backend, the session and the configuration. Every
//! remote operation acquires a permit from a semaphore sized by
//! `client.workers` and then runs on the blocking pool, so no remote I/O
//! happens on the caller's task.

use std::path::PathBuf;
use std::sync::Arc;

use protocol::TextEncoding;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error};

use crate::backend::{MountedShares, RemoteFs};
use crate::config::Config;
use crate::error::{ShareError, ShareResult};
use crate::files::{
    DirectoryEntry, EntryCatalog, FileOps, MoveOutcome, TransferEngine, TransferReport,
};
use crate::gallery::{Gallery, GalleryEvent, GalleryLoader, ImageCache, RemoteImageSequence};
use crate::session::{RemoteHandle, SessionContext};
use crate::stream::{MediaCursor, RemoteSource};

/// Shared entry point to a set of remote shares.
#[derive(Clone)]
pub struct ShareClient {
    fs: Arc<dyn RemoteFs>,
    session: Arc<SessionContext>,
    catalog: EntryCatalog,
    ops: FileOps,
    transfer: TransferEngine,
    cache: Arc<ImageCache>,
    workers: Arc<Semaphore>,
    reopen_threshold: u64,
}

impl ShareClient {
    /// Create a client over `fs`, applying the configured credential.
    pub fn new(fs: Arc<dyn RemoteFs>, config: &Config) -> Self {
        let session = Arc::new(SessionContext::new());
        if !config.auth.username.is_empty() || !config.auth.password.is_empty() {
            session.set_credential(&config.auth.username, &config.auth.password);
        }
        let cache = Arc::new(ImageCache::new(config.cache.capacity()));
        debug!(
            backend = fs.name(),
            workers = config.client.workers,
            cache_capacity = cache.capacity(),
            "Share client created"
        );

        Self {
            catalog: EntryCatalog::new(Arc::clone(&fs)),
            ops: FileOps::new(Arc::clone(&fs)),
            transfer: TransferEngine::new(Arc::clone(&fs))
                .with_buffer_size(config.transfer.buffer_size),
            fs,
            session,
            cache,
            workers: Arc::new(Semaphore::new(config.client.workers.max(1))),
            reopen_threshold: config.stream.reopen_threshold,
        }
    }

    /// Create a client serving the shares listed in the configuration.
    pub fn from_config(config: &Config) -> Self {
        let fs: Arc<dyn RemoteFs> = Arc::new(MountedShares::new(config.shares.clone()));
        Self::new(fs, config)
    }

    /// Replace the image cache, e.g. to share one between clients.
    pub fn with_cache(mut self, cache: Arc<ImageCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Session holding the active credential.
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Image cache shared by galleries created from this client.
    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Permits currently available to new operations.
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    /// Replace the session credential. Blank values select anonymous access.
    pub fn set_credential(&self, username: &str, password: &str) {
        self.session.set_credential(username, password);
    }

    /// Run `task` on the blocking pool once a worker permit is available.
    async fn run<T, F>(&self, operation: &'static str, task: F) -> ShareResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> ShareResult<T> + Send + 'static,
    {
        let _permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| ShareError::Protocol(format!("{operation}: worker pool closed")))?;

        match tokio::task::spawn_blocking(task).await {
            Ok(result) => result,
            Err(e) => {
                error!(operation, error = %e, "Worker task failed");
                Err(ShareError::Protocol(format!("{operation}: worker task failed: {e}")))
            }
        }
    }

    /// List a directory. `None` when it does not exist.
    pub async fn list(&self, path: &str) -> ShareResult<Option<Vec<DirectoryEntry>>> {
        let handle = self.session.resolve(path)?;
        let catalog = self.catalog.clone();
        self.run("list", move || catalog.list(&handle)).await
    }

    /// Describe a single entry.
    pub async fn stat(&self, path: &str) -> ShareResult<DirectoryEntry> {
        let handle = self.session.resolve(path)?;
        let catalog = self.catalog.clone();
        self.run("stat", move || catalog.stat(&handle)).await
    }

    /// Create an empty file.
    pub async fn create_file(&self, path: &str) -> ShareResult<DirectoryEntry> {
        let handle = self.session.resolve(path)?;
        let ops = self.ops.clone();
        self.run("create_file", move || ops.create_file(&handle)).await
    }

    /// Create an empty directory.
    pub async fn create_directory(&self, path: &str) -> ShareResult<DirectoryEntry> {
        let handle = self.session.resolve(path)?;
        let ops = self.ops.clone();
        self.run("create_directory", move || ops.create_directory(&handle))
            .await
    }

    /// Delete a file or directory tree.
    pub async fn delete(&self, path: &str) -> ShareResult<()> {
        let handle = self.session.resolve(path)?;
        let ops = self.ops.clone();
        self.run("delete", move || ops.delete(&handle)).await
    }

    /// Rename an entry within its share.
    pub async fn rename(&self, from: &str, to: &str) -> ShareResult<()> {
        let (from, to) = self.resolve_pair(from, to)?;
        let ops = self.ops.clone();
        self.run("rename", move || ops.rename(&from, &to)).await
    }

    /// Copy an entry, recursively for directories.
    pub async fn copy(&self, from: &str, to: &str) -> ShareResult<()> {
        let (from, to) = self.resolve_pair(from, to)?;
        let ops = self.ops.clone();
        self.run("copy", move || ops.copy(&from, &to)).await
    }

    /// Copy an entry, then delete the source.
    pub async fn move_entry(&self, from: &str, to: &str) -> ShareResult<MoveOutcome> {
        let (from, to) = self.resolve_pair(from, to)?;
        let ops = self.ops.clone();
        self.run("move", move || ops.move_entry(&from, &to)).await
    }

    /// Read a whole file into memory.
    pub async fn read_all(&self, path: &str) -> ShareResult<Vec<u8>> {
        let handle = self.session.resolve(path)?;
        let transfer = self.transfer.clone();
        self.run("read_all", move || transfer.read_all(&handle)).await
    }

    /// Read a file and decode it as text.
    pub async fn read_text(&self, path: &str, encoding: TextEncoding) -> ShareResult<String> {
        let handle = self.session.resolve(path)?;
        let transfer = self.transfer.clone();
        self.run("read_text", move || transfer.read_text(&handle, encoding))
            .await
    }

    /// Upload a local file. `on_progress` runs on the worker thread.
    pub async fn upload<F>(
        &self,
        local_path: impl Into<PathBuf>,
        remote_path: &str,
        on_progress: F,
    ) -> ShareResult<TransferReport>
    where
        F: FnMut(f64) + Send + 'static,
    {
        let local_path = local_path.into();
        let handle = self.session.resolve(remote_path)?;
        let transfer = self.transfer.clone();
        self.run("upload", move || {
            transfer.upload(&local_path, &handle, on_progress)
        })
        .await
    }

    /// Download a remote file. `on_progress` runs on the worker thread.
    pub async fn download<F>(
        &self,
        remote_path: &str,
        local_path: impl Into<PathBuf>,
        on_progress: F,
    ) -> ShareResult<TransferReport>
    where
        F: FnMut(f64) + Send + 'static,
    {
        let local_path = local_path.into();
        let handle = self.session.resolve(remote_path)?;
        let transfer = self.transfer.clone();
        self.run("download", move || {
            transfer.download(&handle, &local_path, on_progress)
        })
        .await
    }

    /// Open a seekable cursor over a remote file.
    ///
    /// The cursor itself does blocking reads; drive it from a blocking
    /// context.
    pub async fn open_source(&self, path: &str) -> ShareResult<MediaCursor<RemoteSource>> {
        let handle = self.session.resolve(path)?;
        let fs = Arc::clone(&self.fs);
        let threshold = self.reopen_threshold;
        self.run("open_source", move || {
            RemoteSource::open(fs, handle).map(|source| source.into_cursor(threshold))
        })
        .await
    }

    /// Build a gallery over the images of a directory.
    ///
    /// Fetches share this client's worker permits and image cache. Returns
    /// `None` when the directory does not exist.
    pub async fn gallery(
        &self,
        directory: &str,
    ) -> ShareResult<Option<(Gallery, mpsc::UnboundedReceiver<GalleryEvent>)>> {
        let Some(entries) = self.list(directory).await? else {
            return Ok(None);
        };
        let sequence =
            RemoteImageSequence::from_entries(self.transfer.clone(), &self.session, &entries)?;
        let (events, receiver) = mpsc::unbounded_channel();
        let loader = GalleryLoader::new(
            Arc::new(sequence),
            Arc::clone(&self.cache),
            Arc::clone(&self.workers),
            events,
        );
        debug!(path = %directory, images = loader.count(), "Gallery opened");
        Ok(Some((Gallery::new(loader), receiver)))
    }

    fn resolve_pair(&self, from: &str, to: &str) -> ShareResult<(RemoteHandle, RemoteHandle)> {
        Ok((self.session.resolve(from)?, self.session.resolve(to)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryShares;
    use protocol::EntryType;
    use std::io::{Read, Seek, SeekFrom};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn client() -> (ShareClient, MemoryShares) {
        let fs = MemoryShares::new();
        fs.add_share("nas", "public");
        let client = ShareClient::new(Arc::new(fs.clone()), &Config::default());
        (client, fs)
    }

    #[tokio::test]
    async fn test_list_missing_is_none() {
        let (client, _fs) = client();
        assert!(client
            .list("smb://nas/public/nowhere/")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (client, _fs) = client();
        let entry = client
            .create_directory("smb://nas/public/docs/")
            .await
            .unwrap();
        assert_eq!(entry.entry_type, EntryType::Directory);
        assert_eq!(entry.size, 0);
        client
            .create_file("smb://nas/public/b.txt")
            .await
            .unwrap();

        let names: Vec<String> = client
            .list("smb://nas/public/")
            .await
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["docs", "b.txt"]);
    }

    #[tokio::test]
    async fn test_create_existing_file_fails() {
        let (client, fs) = client();
        fs.put_file("smb://nas/public/a.txt", "x").unwrap();
        let err = client.create_file("smb://nas/public/a.txt").await.unwrap_err();
        assert!(matches!(err, ShareError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_fails() {
        let (client, _fs) = client();
        let err = client.delete("smb://nas/public/ghost").await.unwrap_err();
        assert!(matches!(err, ShareError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_malformed_address() {
        let (client, _fs) = client();
        let err = client.list("ftp://nas/public/").await.unwrap_err();
        assert!(matches!(err, ShareError::MalformedAddress(_)));
    }

    #[tokio::test]
    async fn test_upload_download_round_trip() {
        let (client, _fs) = client();
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in.bin");
        let target = dir.path().join("out.bin");
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &data).unwrap();

        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&progress);
        let up = client
            .upload(&source, "smb://nas/public/in.bin", move |f| {
                sink.lock().unwrap().push(f)
            })
            .await
            .unwrap();
        assert_eq!(up.bytes, data.len() as u64);
        assert_eq!(progress.lock().unwrap().last().copied(), Some(1.0));

        let down = client
            .download("smb://nas/public/in.bin", &target, |_| {})
            .await
            .unwrap();
        assert_eq!(down.sha256, up.sha256);
        assert_eq!(std::fs::read(&target).unwrap(), data);
    }

    #[tokio::test]
    async fn test_read_text_utf16() {
        let (client, fs) = client();
        fs.put_file("smb://nas/public/w.txt", vec![0xFF, 0xFE, b'h', 0, b'i', 0])
            .unwrap();
        let text = client
            .read_text("smb://nas/public/w.txt", TextEncoding::Utf16Le)
            .await
            .unwrap();
        assert_eq!(text, "hi");
    }

    #[tokio::test]
    async fn test_move_reports_partial() {
        let (client, fs) = client();
        fs.mkdir("smb://nas/public/locked/").unwrap();
        fs.put_file("smb://nas/public/locked/a.txt", "payload").unwrap();
        fs.set_read_only("smb://nas/public/locked/a.txt", true).unwrap();

        let outcome = client
            .move_entry("smb://nas/public/locked/a.txt", "smb://nas/public/a.txt")
            .await
            .unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(
            fs.file_contents("smb://nas/public/a.txt").as_deref(),
            Some(&b"payload"[..])
        );
    }

    #[tokio::test]
    async fn test_credential_applied_from_config() {
        let fs = MemoryShares::new();
        fs.add_share("nas", "private");
        fs.require_credential("nas", "private", "alice", "pw");
        fs.put_file("smb://nas/private/a.txt", "secret").unwrap();

        let anonymous = ShareClient::new(Arc::new(fs.clone()), &Config::default());
        assert!(matches!(
            anonymous.read_all("smb://nas/private/a.txt").await,
            Err(ShareError::AuthenticationFailure(_))
        ));

        let mut config = Config::default();
        config.auth.username = "alice".to_string();
        config.auth.password = "pw".to_string();
        let client = ShareClient::new(Arc::new(fs), &config);
        assert_eq!(
            client.read_all("smb://nas/private/a.txt").await.unwrap(),
            b"secret"
        );

        client.set_credential("", "");
        assert!(client.session().is_anonymous());
    }

    #[tokio::test]
    async fn test_open_source_seeks() {
        let (client, fs) = client();
        fs.put_file("smb://nas/public/clip.bin", (0..=255u8).collect::<Vec<_>>())
            .unwrap();
        let mut cursor = client.open_source("smb://nas/public/clip.bin").await.unwrap();
        assert_eq!(cursor.length(), 256);

        let tail = tokio::task::spawn_blocking(move || {
            cursor.seek(SeekFrom::Start(250)).unwrap();
            let mut buf = Vec::new();
            cursor.read_to_end(&mut buf).unwrap();
            buf
        })
        .await
        .unwrap();
        assert_eq!(tail, vec![250, 251, 252, 253, 254, 255]);
    }

    #[tokio::test]
    async fn test_permits_released() {
        let (client, _fs) = client();
        let before = client.available_workers();
        let _ = client.list("smb://nas/public/").await.unwrap();
        assert_eq!(client.available_workers(), before);
    }

    #[tokio::test]
    async fn test_gallery_missing_directory() {
        let (client, _fs) = client();
        assert!(client
            .gallery("smb://nas/public/pics/")
            .await
            .unwrap()
            .is_none());
    }
}
