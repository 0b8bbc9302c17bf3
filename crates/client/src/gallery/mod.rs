//! Paging image gallery.
//!
//! A [`Gallery`] keeps the current page and its neighbours bound to recycled
//! [`ViewSlot`]s, requests their images through a [`GalleryLoader`], and
//! cancels fetches for pages that scroll out of range. Decoded images are
//! shared through an [`ImageCache`] injected by the caller.

pub mod cache;
pub mod loader;
pub mod pool;

use tracing::debug;

pub use cache::{ImageCache, DEFAULT_BUDGET_FRACTION, DEFAULT_MEMORY_BUDGET};
pub use loader::{
    is_image_name, DecodedImage, FetchRequest, GalleryEvent, GalleryLoader, ImageSequence,
    RemoteImageSequence,
};
pub use pool::{PoolError, Transform, ViewPool, ViewSlot, POOL_CAPACITY};

/// Gallery page state.
pub struct Gallery {
    loader: GalleryLoader,
    pool: ViewPool,
    current: Option<usize>,
}

impl Gallery {
    /// Create a gallery with a three-slot pool.
    pub fn new(loader: GalleryLoader) -> Self {
        Self {
            loader,
            pool: ViewPool::new(POOL_CAPACITY),
            current: None,
        }
    }

    /// Index of the current page.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Loader backing this gallery.
    pub fn loader(&self) -> &GalleryLoader {
        &self.loader
    }

    /// Slot bound to `index`.
    pub fn slot(&self, index: usize) -> Option<&ViewSlot> {
        self.pool.slot(index)
    }

    /// Mutable slot bound to `index`, for applying transforms.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut ViewSlot> {
        self.pool.slot_mut(index)
    }

    /// Indices currently bound to slots.
    pub fn bound_indices(&self) -> Vec<usize> {
        self.pool.bound_indices()
    }

    /// Make `index` the current page.
    ///
    /// Pages leaving the window are released and their fetches cancelled
    /// before new pages are bound. Returns the requests issued for newly
    /// bound pages. Must be called from within a tokio runtime.
    pub fn page_to(&mut self, index: usize) -> Result<Vec<(usize, FetchRequest)>, PoolError> {
        let count = self.loader.count();
        if index >= count {
            return Ok(Vec::new());
        }
        let first = index.saturating_sub(1);
        let last = (index + 1).min(count - 1);
        let window = first..=last;

        for bound in self.pool.bound_indices() {
            if !window.contains(&bound) {
                self.loader.set_visible(bound, false);
                self.loader.cancel(bound);
                self.pool.release(bound);
            }
        }

        let mut requests = Vec::new();
        for page in window {
            if self.pool.slot(page).is_some() {
                continue;
            }
            self.pool.bind(page)?;
            self.loader.set_visible(page, true);
            requests.push((page, self.loader.request(page)));
        }
        debug!(index, bound = ?self.pool.bound_indices(), "Paged gallery");
        self.current = Some(index);
        Ok(requests)
    }

    /// Apply a loader event to its slot.
    ///
    /// Returns `true` when the event's index is still bound and showed an
    /// image.
    pub fn apply(&mut self, event: GalleryEvent) -> bool {
        match event {
            GalleryEvent::Ready { index, image } => match self.pool.slot_mut(index) {
                Some(slot) => {
                    slot.show(image);
                    true
                }
                None => false,
            },
            GalleryEvent::Failed { .. } => false,
        }
    }

    /// Drop all cached images, e.g. on a low-memory signal.
    pub fn on_low_memory(&self) {
        self.loader.cache().clear();
    }
}
