//! Cancellable background fetch and decode for gallery images.
//!
//! Each requested index gets one task. The task checks its cancellation token
//! before decoding, then checks cancellation and relevance again before it
//! touches the cache or notifies. A cancelled or stale task leaves no trace.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::cache::ImageCache;
use crate::error::{ShareError, ShareResult};
use crate::files::{DirectoryEntry, TransferEngine};
use crate::session::{RemoteHandle, SessionContext};
use protocol::messages::EntryType;

/// File extensions treated as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

/// Whether a file name looks like an image.
pub fn is_image_name(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Ordered, indexable image source.
pub trait ImageSequence: Send + Sync {
    /// Number of images.
    fn count(&self) -> usize;

    /// Cache key for an index, or `None` when out of range.
    fn path_at(&self, index: usize) -> Option<String>;

    /// Encoded bytes for an index. Blocking.
    fn data_at(&self, index: usize) -> ShareResult<Bytes>;
}

/// Images stored on a remote share.
pub struct RemoteImageSequence {
    transfer: TransferEngine,
    handles: Vec<RemoteHandle>,
}

impl RemoteImageSequence {
    /// Sequence over explicit handles, in order.
    pub fn new(transfer: TransferEngine, handles: Vec<RemoteHandle>) -> Self {
        Self { transfer, handles }
    }

    /// Sequence over the image files of a directory listing, keeping its order.
    pub fn from_entries(
        transfer: TransferEngine,
        session: &SessionContext,
        entries: &[DirectoryEntry],
    ) -> ShareResult<Self> {
        let handles = entries
            .iter()
            .filter(|e| e.entry_type == EntryType::File && is_image_name(&e.name))
            .map(|e| session.resolve(&e.path))
            .collect::<ShareResult<Vec<_>>>()?;
        Ok(Self::new(transfer, handles))
    }
}

impl ImageSequence for RemoteImageSequence {
    fn count(&self) -> usize {
        self.handles.len()
    }

    fn path_at(&self, index: usize) -> Option<String> {
        self.handles.get(index).map(|h| h.path().to_string())
    }

    fn data_at(&self, index: usize) -> ShareResult<Bytes> {
        let handle = self
            .handles
            .get(index)
            .ok_or_else(|| ShareError::NotFound(format!("image index {index}")))?;
        self.transfer.read_all(handle).map(Bytes::from)
    }
}

/// A decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major RGBA pixels.
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Decode any supported format, guessing it from the content.
    pub fn decode(data: &[u8]) -> ShareResult<Self> {
        let image = image::load_from_memory(data)
            .map_err(|e| ShareError::Encoding(e.to_string()))?
            .to_rgba8();
        Ok(Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }

    /// Cache weight: width x height x 4 bytes.
    pub fn weight(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }
}

/// Notification delivered to the gallery.
#[derive(Debug, Clone)]
pub enum GalleryEvent {
    /// The image for `index` is ready.
    Ready {
        index: usize,
        image: Arc<DecodedImage>,
    },
    /// Fetching or decoding `index` failed.
    Failed { index: usize, error: String },
}

impl GalleryEvent {
    /// Index the event refers to.
    pub fn index(&self) -> usize {
        match self {
            GalleryEvent::Ready { index, .. } | GalleryEvent::Failed { index, .. } => *index,
        }
    }
}

/// What [`GalleryLoader::request`] did.
#[derive(Debug)]
pub enum FetchRequest {
    /// Served from cache; `Ready` was sent immediately.
    CacheHit,
    /// A new background task was started.
    Spawned(JoinHandle<()>),
    /// A task for this index is already running.
    InFlight,
    /// The index is outside the sequence.
    OutOfRange,
}

struct InFlight {
    id: u64,
    token: CancellationToken,
}

/// Starts, tracks and cancels background image fetches.
pub struct GalleryLoader {
    sequence: Arc<dyn ImageSequence>,
    cache: Arc<ImageCache>,
    workers: Arc<Semaphore>,
    events: mpsc::UnboundedSender<GalleryEvent>,
    in_flight: Arc<DashMap<usize, InFlight>>,
    visible: Arc<DashSet<usize>>,
    next_id: AtomicU64,
}

impl GalleryLoader {
    /// Create a loader. Fetches share the `workers` permits with other
    /// remote I/O.
    pub fn new(
        sequence: Arc<dyn ImageSequence>,
        cache: Arc<ImageCache>,
        workers: Arc<Semaphore>,
        events: mpsc::UnboundedSender<GalleryEvent>,
    ) -> Self {
        Self {
            sequence,
            cache,
            workers,
            events,
            in_flight: Arc::new(DashMap::new()),
            visible: Arc::new(DashSet::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of images in the sequence.
    pub fn count(&self) -> usize {
        self.sequence.count()
    }

    /// Shared cache.
    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Mark an index as bound to a visible slot or not.
    pub fn set_visible(&self, index: usize, visible: bool) {
        if visible {
            self.visible.insert(index);
        } else {
            self.visible.remove(&index);
        }
    }

    /// Whether an index is bound to a visible slot.
    pub fn is_visible(&self, index: usize) -> bool {
        self.visible.contains(&index)
    }

    /// Number of running fetches.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Request the image for `index`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request(&self, index: usize) -> FetchRequest {
        let Some(key) = self.sequence.path_at(index) else {
            return FetchRequest::OutOfRange;
        };

        if let Some(image) = self.cache.get(&key) {
            debug!(index, key = %key, "Gallery cache hit");
            let _ = self.events.send(GalleryEvent::Ready { index, image });
            return FetchRequest::CacheHit;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        match self.in_flight.entry(index) {
            Entry::Occupied(_) => return FetchRequest::InFlight,
            Entry::Vacant(slot) => {
                slot.insert(InFlight {
                    id,
                    token: token.clone(),
                });
            }
        }

        debug!(index, key = %key, "Starting gallery fetch");
        let task = FetchTask {
            index,
            id,
            key,
            token,
            sequence: Arc::clone(&self.sequence),
            cache: Arc::clone(&self.cache),
            workers: Arc::clone(&self.workers),
            events: self.events.clone(),
            in_flight: Arc::clone(&self.in_flight),
            visible: Arc::clone(&self.visible),
        };
        FetchRequest::Spawned(tokio::spawn(task.run()))
    }

    /// Cancel the fetch for `index`, if any.
    pub fn cancel(&self, index: usize) -> bool {
        match self.in_flight.remove(&index) {
            Some((_, flight)) => {
                flight.token.cancel();
                debug!(index, "Cancelled gallery fetch");
                true
            }
            None => false,
        }
    }

    /// Cancel every running fetch.
    pub fn cancel_all(&self) {
        let indices: Vec<usize> = self.in_flight.iter().map(|e| *e.key()).collect();
        for index in indices {
            self.cancel(index);
        }
    }
}

impl Drop for GalleryLoader {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

struct FetchTask {
    index: usize,
    id: u64,
    key: String,
    token: CancellationToken,
    sequence: Arc<dyn ImageSequence>,
    cache: Arc<ImageCache>,
    workers: Arc<Semaphore>,
    events: mpsc::UnboundedSender<GalleryEvent>,
    in_flight: Arc<DashMap<usize, InFlight>>,
    visible: Arc<DashSet<usize>>,
}

impl FetchTask {
    async fn run(self) {
        let index = self.index;
        let result = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(permit) => {
                let token = self.token.clone();
                let sequence = Arc::clone(&self.sequence);
                tokio::task::spawn_blocking(move || -> ShareResult<Option<DecodedImage>> {
                    let _permit = permit;
                    if token.is_cancelled() {
                        return Ok(None);
                    }
                    let data = sequence.data_at(index)?;
                    if token.is_cancelled() {
                        return Ok(None);
                    }
                    DecodedImage::decode(&data).map(Some)
                })
                .await
            }
            Err(_) => Ok(Ok(None)),
        };

        self.in_flight.remove_if(&index, |_, f| f.id == self.id);
        self.deliver(result);
    }

    /// Whether the result may still reach the cache and the listener.
    fn is_current(&self) -> bool {
        !self.token.is_cancelled() && self.visible.contains(&self.index)
    }

    fn deliver(&self, result: Result<ShareResult<Option<DecodedImage>>, JoinError>) {
        let index = self.index;
        if !self.is_current() {
            debug!(index, key = %self.key, "Discarding stale gallery fetch");
            return;
        }

        match result {
            Ok(Ok(Some(image))) => {
                // a cancel may have landed while the result was matched
                if !self.is_current() {
                    debug!(index, key = %self.key, "Discarding stale gallery fetch");
                    return;
                }
                let image = Arc::new(image);
                self.cache.put(self.key.clone(), Arc::clone(&image), image.weight());
                let _ = self.events.send(GalleryEvent::Ready { index, image });
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                warn!(index, key = %self.key, error = %e, "Gallery fetch failed");
                let _ = self.events.send(GalleryEvent::Failed {
                    index,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                error!(index, key = %self.key, error = %e, "Gallery fetch task panicked");
            }
        }
    }
}
