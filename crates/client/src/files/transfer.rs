//! Whole-object reads, text decoding, and buffered upload/download.
//!
//! Uploads and downloads run a fixed-size copy loop. Each buffer is filled
//! completely before it is written, so an N-byte transfer reports progress
//! exactly `ceil(N / buffer_size)` times. A failed transfer leaves whatever
//! was written at the destination.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use protocol::messages::TextEncoding;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::backend::RemoteFs;
use crate::error::{ShareError, ShareResult};
use crate::session::RemoteHandle;

/// Default copy buffer size (8 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Maximum copy buffer size (16 MiB).
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Summary of a completed upload or download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Bytes copied.
    pub bytes: u64,
    /// Hex-encoded SHA-256 of the copied bytes.
    pub sha256: String,
}

/// Moves bytes between the remote share and memory or local files.
#[derive(Clone)]
pub struct TransferEngine {
    fs: Arc<dyn RemoteFs>,
    buffer_size: usize,
}

impl TransferEngine {
    /// Create an engine with the default buffer size.
    pub fn new(fs: Arc<dyn RemoteFs>) -> Self {
        Self {
            fs,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the copy buffer size, clamped to `1..=MAX_BUFFER_SIZE`.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.clamp(1, MAX_BUFFER_SIZE);
        self
    }

    /// Copy buffer size in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Read the whole remote object into memory.
    ///
    /// The buffer is sized from the reported length. A length that does not
    /// fit in memory addressing is rejected rather than truncated.
    pub fn read_all(&self, handle: &RemoteHandle) -> ShareResult<Vec<u8>> {
        let length = self.fs.length(handle)?;
        let capacity = usize::try_from(length).map_err(|_| {
            ShareError::Protocol(format!(
                "{}: length {length} exceeds addressable memory",
                handle.path()
            ))
        })?;
        debug!(path = %handle.path(), length, "Reading remote object");

        let reader = self.fs.open_read(handle)?;
        let mut data = Vec::with_capacity(capacity);
        reader
            .take(length)
            .read_to_end(&mut data)
            .map_err(|e| ShareError::from_io(e, handle.path()))?;
        Ok(data)
    }

    /// Read the remote object and decode it as text.
    pub fn read_text(&self, handle: &RemoteHandle, encoding: TextEncoding) -> ShareResult<String> {
        let data = self.read_all(handle)?;
        decode_text(&data, encoding)
            .map_err(|why| ShareError::Encoding(format!("{}: {why}", handle.path())))
    }

    /// Upload a local file to the remote target, creating or truncating it.
    pub fn upload<F>(
        &self,
        local_path: &Path,
        handle: &RemoteHandle,
        on_progress: F,
    ) -> ShareResult<TransferReport>
    where
        F: FnMut(f64),
    {
        let local = local_path.display().to_string();
        let source = File::open(local_path).map_err(|e| ShareError::from_io(e, &local))?;
        let total = source
            .metadata()
            .map_err(|e| ShareError::from_io(e, &local))?
            .len();
        let sink = self.fs.open_write(handle)?;
        debug!(from = %local, to = %handle.path(), total, "Starting upload");

        let report = self.copy_loop(
            source,
            sink,
            total,
            Endpoints {
                source: &local,
                sink: handle.path(),
            },
            on_progress,
        )?;
        info!(from = %local, to = %handle.path(), bytes = report.bytes, "Upload complete");
        Ok(report)
    }

    /// Download the remote target to a local file, creating or truncating it.
    pub fn download<F>(
        &self,
        handle: &RemoteHandle,
        local_path: &Path,
        on_progress: F,
    ) -> ShareResult<TransferReport>
    where
        F: FnMut(f64),
    {
        let local = local_path.display().to_string();
        let total = self.fs.length(handle)?;
        let source = self.fs.open_read(handle)?;
        let sink = File::create(local_path).map_err(|e| ShareError::from_io(e, &local))?;
        debug!(from = %handle.path(), to = %local, total, "Starting download");

        let report = self.copy_loop(
            source,
            sink,
            total,
            Endpoints {
                source: handle.path(),
                sink: &local,
            },
            on_progress,
        )?;
        info!(from = %handle.path(), to = %local, bytes = report.bytes, "Download complete");
        Ok(report)
    }

    fn copy_loop<R, W, F>(
        &self,
        mut source: R,
        mut sink: W,
        total: u64,
        endpoints: Endpoints<'_>,
        mut on_progress: F,
    ) -> ShareResult<TransferReport>
    where
        R: Read,
        W: Write,
        F: FnMut(f64),
    {
        let mut buffer = vec![0u8; self.buffer_size];
        let mut hasher = Sha256::new();
        let mut transferred: u64 = 0;
        let mut last = None;

        loop {
            let filled = fill_buffer(&mut source, &mut buffer)
                .map_err(|e| endpoints.fail_source(e, transferred))?;
            if filled == 0 {
                break;
            }
            let chunk = &buffer[..filled];
            sink.write_all(chunk)
                .map_err(|e| endpoints.fail_sink(e, transferred))?;
            hasher.update(chunk);
            transferred += filled as u64;

            let fraction = progress_fraction(transferred, total);
            on_progress(fraction);
            last = Some(fraction);
        }
        sink.flush()
            .map_err(|e| endpoints.fail_sink(e, transferred))?;

        if last != Some(1.0) {
            on_progress(1.0);
        }

        Ok(TransferReport {
            bytes: transferred,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

struct Endpoints<'a> {
    source: &'a str,
    sink: &'a str,
}

impl Endpoints<'_> {
    fn fail_source(&self, err: io::Error, transferred: u64) -> ShareError {
        warn!(source = %self.source, transferred, error = %err, "Transfer read failed");
        ShareError::from_io(err, self.source)
    }

    fn fail_sink(&self, err: io::Error, transferred: u64) -> ShareError {
        warn!(sink = %self.sink, transferred, error = %err, "Transfer write failed");
        ShareError::from_io(err, self.sink)
    }
}

/// Read until `buf` is full or the source is exhausted.
fn fill_buffer<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn progress_fraction(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (transferred as f64 / total as f64).min(1.0)
}

/// Decode bytes in the given encoding.
pub fn decode_text(data: &[u8], encoding: TextEncoding) -> Result<String, String> {
    match encoding {
        TextEncoding::Utf8 => {
            let body = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
            String::from_utf8(body.to_vec()).map_err(|e| e.to_string())
        }
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            if data.len() % 2 != 0 {
                return Err("odd number of bytes for UTF-16".to_string());
            }
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|pair| match encoding {
                    TextEncoding::Utf16Le => u16::from_le_bytes([pair[0], pair[1]]),
                    _ => u16::from_be_bytes([pair[0], pair[1]]),
                })
                .collect();
            let body = units.strip_prefix(&[0xFEFF]).unwrap_or(&units);
            String::from_utf16(body).map_err(|e| e.to_string())
        }
        TextEncoding::Latin1 => Ok(data.iter().map(|&b| char::from(b)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryShares;
    use crate::session::SessionContext;
    use rand::RngCore;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (MemoryShares, TransferEngine, SessionContext) {
        let fs = MemoryShares::new();
        fs.add_share("nas", "public");
        let engine = TransferEngine::new(Arc::new(fs.clone()));
        (fs, engine, SessionContext::new())
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    #[test]
    fn test_read_all() {
        let (fs, engine, ctx) = setup();
        fs.put_file("smb://nas/public/a.bin", vec![7u8; 1000]).unwrap();
        let data = engine
            .read_all(&ctx.resolve("smb://nas/public/a.bin").unwrap())
            .unwrap();
        assert_eq!(data, vec![7u8; 1000]);
    }

    #[test]
    fn test_read_all_missing() {
        let (_fs, engine, ctx) = setup();
        let result = engine.read_all(&ctx.resolve("smb://nas/public/none").unwrap());
        assert!(matches!(result, Err(ShareError::NotFound(_))));
    }

    #[test]
    fn test_read_text_encodings() {
        let (fs, engine, ctx) = setup();
        fs.put_file("smb://nas/public/bom.txt", b"\xEF\xBB\xBFhello".to_vec())
            .unwrap();
        fs.put_file("smb://nas/public/le.txt", vec![0xFF, 0xFE, b'h', 0, b'i', 0])
            .unwrap();
        fs.put_file("smb://nas/public/be.txt", vec![0, b'h', 0, b'i']).unwrap();
        fs.put_file("smb://nas/public/latin.txt", vec![b'c', b'a', b'f', 0xE9])
            .unwrap();

        let read = |path: &str, enc| engine.read_text(&ctx.resolve(path).unwrap(), enc);
        assert_eq!(read("smb://nas/public/bom.txt", TextEncoding::Utf8).unwrap(), "hello");
        assert_eq!(read("smb://nas/public/le.txt", TextEncoding::Utf16Le).unwrap(), "hi");
        assert_eq!(read("smb://nas/public/be.txt", TextEncoding::Utf16Be).unwrap(), "hi");
        assert_eq!(read("smb://nas/public/latin.txt", TextEncoding::Latin1).unwrap(), "café");
    }

    #[test]
    fn test_read_text_invalid_utf8() {
        let (fs, engine, ctx) = setup();
        fs.put_file("smb://nas/public/bad.txt", vec![0xC3, 0x28]).unwrap();
        let result = engine.read_text(
            &ctx.resolve("smb://nas/public/bad.txt").unwrap(),
            TextEncoding::Utf8,
        );
        assert!(matches!(result, Err(ShareError::Encoding(_))));
    }

    #[test]
    fn test_upload_ten_mib_progress() {
        let (fs, engine, ctx) = setup();
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("big.bin");
        let data = random_bytes(10 * 1024 * 1024);
        fs::write(&local, &data).unwrap();

        let mut calls = Vec::new();
        let report = engine
            .upload(
                &local,
                &ctx.resolve("smb://nas/public/big.bin").unwrap(),
                |f| calls.push(f),
            )
            .unwrap();

        assert_eq!(calls.len(), 1280);
        assert_eq!(*calls.last().unwrap(), 1.0);
        assert!(calls.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(report.bytes, data.len() as u64);
        assert_eq!(report.sha256, hex::encode(Sha256::digest(&data)));
        assert_eq!(fs.file_contents("smb://nas/public/big.bin").unwrap(), data);
    }

    #[test]
    fn test_round_trip() {
        let (_fs, engine, ctx) = setup();
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.bin");
        let dst = temp_dir.path().join("dst.bin");
        let data = random_bytes(50_000);
        fs::write(&src, &data).unwrap();

        let handle = ctx.resolve("smb://nas/public/rt.bin").unwrap();
        let up = engine.upload(&src, &handle, |_| {}).unwrap();
        let down = engine.download(&handle, &dst, |_| {}).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), data);
        assert_eq!(up, down);
    }

    #[test]
    fn test_zero_byte_transfer_single_completion() {
        let (fs, engine, ctx) = setup();
        fs.put_file("smb://nas/public/empty", Vec::new()).unwrap();
        let temp_dir = TempDir::new().unwrap();

        let mut calls = Vec::new();
        let report = engine
            .download(
                &ctx.resolve("smb://nas/public/empty").unwrap(),
                &temp_dir.path().join("empty"),
                |f| calls.push(f),
            )
            .unwrap();
        assert_eq!(calls, vec![1.0]);
        assert_eq!(report.bytes, 0);
    }

    #[test]
    fn test_exact_multiple_and_remainder_counts() {
        let (fs, engine, ctx) = setup();
        let engine = engine.with_buffer_size(100);
        let temp_dir = TempDir::new().unwrap();

        fs.put_file("smb://nas/public/300", vec![1u8; 300]).unwrap();
        fs.put_file("smb://nas/public/301", vec![1u8; 301]).unwrap();

        let mut calls = 0;
        engine
            .download(
                &ctx.resolve("smb://nas/public/300").unwrap(),
                &temp_dir.path().join("300"),
                |_| calls += 1,
            )
            .unwrap();
        assert_eq!(calls, 3);

        let mut calls = 0;
        engine
            .download(
                &ctx.resolve("smb://nas/public/301").unwrap(),
                &temp_dir.path().join("301"),
                |_| calls += 1,
            )
            .unwrap();
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_short_reads_are_coalesced() {
        struct Trickle(Vec<u8>, usize);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.1 >= self.0.len() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[self.1];
                self.1 += 1;
                Ok(1)
            }
        }

        let mut source = Trickle(vec![9u8; 25], 0);
        let mut buf = [0u8; 10];
        assert_eq!(fill_buffer(&mut source, &mut buf).unwrap(), 10);
        assert_eq!(fill_buffer(&mut source, &mut buf).unwrap(), 10);
        assert_eq!(fill_buffer(&mut source, &mut buf).unwrap(), 5);
        assert_eq!(fill_buffer(&mut source, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_interrupted_download_leaves_partial_file() {
        let (fs, engine, ctx) = setup();
        let engine = engine.with_buffer_size(10);
        fs.put_file("smb://nas/public/flaky.bin", vec![3u8; 100]).unwrap();
        fs.interrupt_reads_after("smb://nas/public/flaky.bin", 35).unwrap();
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("flaky.bin");

        let mut calls = Vec::new();
        let result = engine.download(
            &ctx.resolve("smb://nas/public/flaky.bin").unwrap(),
            &local,
            |f| calls.push(f),
        );
        assert!(matches!(result, Err(ShareError::Network(_))));
        assert_eq!(fs::read(&local).unwrap().len(), 30);
        assert_eq!(calls, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_upload_missing_local_file() {
        let (_fs, engine, ctx) = setup();
        let temp_dir = TempDir::new().unwrap();
        let result = engine.upload(
            &temp_dir.path().join("absent"),
            &ctx.resolve("smb://nas/public/x").unwrap(),
            |_| {},
        );
        assert!(matches!(result, Err(ShareError::NotFound(_))));
    }

    #[test]
    fn test_buffer_size_clamped() {
        let (_fs, engine, _ctx) = setup();
        assert_eq!(engine.clone().with_buffer_size(0).buffer_size(), 1);
        assert_eq!(
            engine.with_buffer_size(usize::MAX).buffer_size(),
            MAX_BUFFER_SIZE
        );
    }
}
