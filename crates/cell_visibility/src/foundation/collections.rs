//! Index storage
//!
//! Generational handle maps for renderables and shadows come from `slotmap`;
//! relation entries live in a [`FreeList`], addressed by plain indices.

pub use slotmap::{new_key_type, Key, KeyData, SecondaryMap, SlotMap};

/// Index-addressed slot pool
///
/// Slots are reused in LIFO order, so indices stay small and dense under
/// churn. Indices are stable until the slot is removed.
#[derive(Debug, Clone)]
pub struct FreeList<T> {
    items: Vec<Option<T>>,
    free_indices: Vec<usize>,
}

impl<T> FreeList<T> {
    /// Empty pool
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    /// Create a free list with room for `capacity` items before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            free_indices: Vec::new(),
        }
    }

    /// Reserve room for at least `additional` more items
    pub fn reserve(&mut self, additional: usize) {
        let spare = self.free_indices.len() + (self.items.capacity() - self.items.len());
        if additional > spare {
            self.items.reserve(additional - spare);
        }
    }

    /// Store `item` in a free slot and return the slot index
    pub fn insert(&mut self, item: T) -> usize {
        if let Some(index) = self.free_indices.pop() {
            self.items[index] = Some(item);
            index
        } else {
            let index = self.items.len();
            self.items.push(Some(item));
            index
        }
    }

    /// Take the item out of slot `index`, freeing the slot
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.items.get_mut(index)?.take()?;
        self.free_indices.push(index);
        Some(item)
    }

    /// Item in slot `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)?.as_ref()
    }

    /// Item in slot `index`, mutably
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)?.as_mut()
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.items.len() - self.free_indices.len()
    }

    /// Whether no items are live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every item and release the storage
    pub fn clear(&mut self) {
        self.items.clear();
        self.free_indices.clear();
    }
}

impl<T> Default for FreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}
