//! Seekable reads over forward-only remote streams.
//!
//! Remote streams can only be read front to back. [`MediaCursor`] keeps one
//! stream open and serves seeks by either discarding bytes ahead of the
//! stream (short forward jumps) or opening a fresh stream at the target.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::backend::{RemoteFs, RemoteReader};
use crate::error::{ShareError, ShareResult};
use crate::session::RemoteHandle;

/// Default forward distance served by discarding instead of reopening (1 MiB).
pub const DEFAULT_REOPEN_THRESHOLD: u64 = 1024 * 1024;

/// Random-access contract consumed by media decoders.
pub trait RandomAccessSource: Send {
    /// Total length in bytes.
    fn length(&self) -> u64;

    /// Open a sequential stream positioned at `offset`.
    fn open_stream_at(&self, offset: u64) -> ShareResult<RemoteReader>;

    /// Name used in logs and decoder diagnostics.
    fn diagnostic_name(&self) -> String;
}

/// A remote file exposed through [`RandomAccessSource`].
pub struct RemoteSource {
    fs: Arc<dyn RemoteFs>,
    handle: RemoteHandle,
    length: u64,
}

impl RemoteSource {
    /// Bind to a remote file, reading its length once.
    pub fn open(fs: Arc<dyn RemoteFs>, handle: RemoteHandle) -> ShareResult<Self> {
        let length = fs.length(&handle)?;
        debug!(path = %handle.path(), length, "Opened random access source");
        Ok(Self { fs, handle, length })
    }

    /// Wrap in a cursor with the given reopen threshold.
    pub fn into_cursor(self, reopen_threshold: u64) -> MediaCursor<Self> {
        MediaCursor::new(self, reopen_threshold)
    }
}

impl RandomAccessSource for RemoteSource {
    fn length(&self) -> u64 {
        self.length
    }

    fn open_stream_at(&self, offset: u64) -> ShareResult<RemoteReader> {
        let mut stream = self.fs.open_read(&self.handle)?;
        skip(&mut stream, offset).map_err(|e| ShareError::from_io(e, self.handle.path()))?;
        Ok(stream)
    }

    fn diagnostic_name(&self) -> String {
        self.handle.path().to_string()
    }
}

/// Discard exactly `count` bytes.
fn skip<R: Read + ?Sized>(stream: &mut R, count: u64) -> io::Result<()> {
    let skipped = io::copy(&mut stream.take(count), &mut io::sink())?;
    if skipped < count {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stream ended after {skipped} of {count} bytes"),
        ));
    }
    Ok(())
}

enum CursorState {
    Closed,
    OpenAt { offset: u64, stream: RemoteReader },
}

/// Sequential reader with seek over a [`RandomAccessSource`].
///
/// Not synchronized; one reader at a time.
pub struct MediaCursor<S: RandomAccessSource> {
    source: S,
    state: CursorState,
    position: u64,
    reopen_threshold: u64,
    opens: usize,
}

impl<S: RandomAccessSource> MediaCursor<S> {
    /// Create a closed cursor at position 0.
    pub fn new(source: S, reopen_threshold: u64) -> Self {
        Self {
            source,
            state: CursorState::Closed,
            position: 0,
            reopen_threshold,
            opens: 0,
        }
    }

    /// Total length of the source.
    pub fn length(&self) -> u64 {
        self.source.length()
    }

    /// Logical read position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Offset of the open stream, or `None` when closed.
    pub fn stream_offset(&self) -> Option<u64> {
        match &self.state {
            CursorState::Closed => None,
            CursorState::OpenAt { offset, .. } => Some(*offset),
        }
    }

    /// Streams opened over the cursor's lifetime.
    pub fn opens(&self) -> usize {
        self.opens
    }

    /// Diagnostic name of the source.
    pub fn diagnostic_name(&self) -> String {
        self.source.diagnostic_name()
    }

    /// Release the open stream. The position is kept.
    pub fn close(&mut self) {
        self.state = CursorState::Closed;
    }

    /// Read up to `buf.len()` bytes starting at `position`.
    ///
    /// Fills as much of `buf` as the source allows; returns 0 at or past the
    /// end.
    pub fn read_at(&mut self, position: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(position))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }

    fn open_at(&mut self, offset: u64) -> io::Result<()> {
        self.state = CursorState::Closed;
        let stream = self.source.open_stream_at(offset).map_err(into_io)?;
        self.opens += 1;
        trace!(source = %self.source.diagnostic_name(), offset, "Opened stream");
        self.state = CursorState::OpenAt { offset, stream };
        Ok(())
    }

    /// Bring the stream to `self.position`, discarding or reopening.
    fn reposition(&mut self) -> io::Result<()> {
        let target = self.position;
        if target >= self.length() {
            self.state = CursorState::Closed;
            return Ok(());
        }
        match &mut self.state {
            CursorState::OpenAt { offset, .. } if *offset == target => Ok(()),
            CursorState::OpenAt { offset, stream }
                if target > *offset && target - *offset <= self.reopen_threshold =>
            {
                let ahead = target - *offset;
                match skip(stream, ahead) {
                    Ok(()) => {
                        *offset = target;
                        Ok(())
                    }
                    Err(e) => {
                        self.state = CursorState::Closed;
                        Err(e)
                    }
                }
            }
            _ => {
                debug!(source = %self.source.diagnostic_name(), offset = target, "Reopening stream");
                self.open_at(target)
            }
        }
    }
}

fn into_io(err: ShareError) -> io::Error {
    let kind = match &err {
        ShareError::NotFound(_) => io::ErrorKind::NotFound,
        ShareError::PermissionDenied(_) | ShareError::AuthenticationFailure(_) => {
            io::ErrorKind::PermissionDenied
        }
        ShareError::Network(_) => io::ErrorKind::ConnectionReset,
        ShareError::MalformedAddress(_) => io::ErrorKind::InvalidInput,
        ShareError::Encoding(_) => io::ErrorKind::InvalidData,
        ShareError::Protocol(_) => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

impl<S: RandomAccessSource> Read for MediaCursor<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.length() {
            return Ok(0);
        }
        self.reposition()?;
        let CursorState::OpenAt { offset, stream } = &mut self.state else {
            return Ok(0);
        };
        let n = stream.read(buf)?;
        *offset += n as u64;
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: RandomAccessSource> Seek for MediaCursor<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(o) => Some(o),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
            SeekFrom::End(d) => self.length().checked_add_signed(d),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
        self.position = target;
        if self.stream_offset().is_some() {
            self.reposition()?;
        }
        Ok(target)
    }
}
