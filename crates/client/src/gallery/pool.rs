//! Recycled presentation slots for the paging gallery.

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use super::loader::DecodedImage;

/// Live slots: the current page and its two neighbours.
pub const POOL_CAPACITY: usize = 3;

/// Errors from [`ViewPool`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is bound to an index.
    #[error("all {capacity} view slots are in use")]
    Exhausted { capacity: usize },
}

/// Zoom and pan applied to a slot's image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Zoom factor; 1.0 is fit-to-view.
    pub scale: f32,
    /// Horizontal pan in view pixels.
    pub offset_x: f32,
    /// Vertical pan in view pixels.
    pub offset_y: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

/// A recyclable presentation surface.
#[derive(Debug)]
pub struct ViewSlot {
    id: usize,
    index: Option<usize>,
    image: Option<Arc<DecodedImage>>,
    transform: Transform,
}

impl ViewSlot {
    fn new(id: usize) -> Self {
        Self {
            id,
            index: None,
            image: None,
            transform: Transform::default(),
        }
    }

    /// Stable slot identity, for checking reuse.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Index currently bound to this slot.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Image shown by this slot.
    pub fn image(&self) -> Option<&Arc<DecodedImage>> {
        self.image.as_ref()
    }

    /// Current transform.
    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Display an image.
    pub fn show(&mut self, image: Arc<DecodedImage>) {
        self.image = Some(image);
    }

    /// Apply a zoom/pan transform.
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Clear the image and transform.
    pub fn reset(&mut self) {
        self.index = None;
        self.image = None;
        self.transform = Transform::default();
    }
}

/// Bounded pool of [`ViewSlot`]s.
#[derive(Debug)]
pub struct ViewPool {
    bound: Vec<ViewSlot>,
    free: VecDeque<ViewSlot>,
    created: usize,
    capacity: usize,
}

impl Default for ViewPool {
    fn default() -> Self {
        Self::new(POOL_CAPACITY)
    }
}

impl ViewPool {
    /// Create an empty pool creating at most `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            bound: Vec::with_capacity(capacity),
            free: VecDeque::with_capacity(capacity),
            created: 0,
            capacity,
        }
    }

    /// Bind a slot to `index`, reusing a released slot when one exists.
    ///
    /// Binding an index that is already bound returns the same slot.
    pub fn bind(&mut self, index: usize) -> Result<&mut ViewSlot, PoolError> {
        if let Some(pos) = self.bound.iter().position(|s| s.index == Some(index)) {
            return Ok(&mut self.bound[pos]);
        }
        let mut slot = match self.free.pop_front() {
            Some(slot) => slot,
            None if self.created < self.capacity => {
                self.created += 1;
                ViewSlot::new(self.created - 1)
            }
            None => {
                return Err(PoolError::Exhausted {
                    capacity: self.capacity,
                })
            }
        };
        trace!(slot = slot.id, index, "Bound view slot");
        slot.index = Some(index);
        self.bound.push(slot);
        let last = self.bound.len() - 1;
        Ok(&mut self.bound[last])
    }

    /// Reset the slot bound to `index` and return it to the pool.
    pub fn release(&mut self, index: usize) -> bool {
        let Some(pos) = self.bound.iter().position(|s| s.index == Some(index)) else {
            return false;
        };
        let mut slot = self.bound.swap_remove(pos);
        trace!(slot = slot.id, index, "Released view slot");
        slot.reset();
        self.free.push_back(slot);
        true
    }

    /// Slot bound to `index`.
    pub fn slot(&self, index: usize) -> Option<&ViewSlot> {
        self.bound.iter().find(|s| s.index == Some(index))
    }

    /// Mutable slot bound to `index`.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut ViewSlot> {
        self.bound.iter_mut().find(|s| s.index == Some(index))
    }

    /// Indices currently bound, ascending.
    pub fn bound_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.bound.iter().filter_map(|s| s.index).collect();
        indices.sort_unstable();
        indices
    }

    /// Slots created so far.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Maximum number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
