//! Growable list backed by a heap slab
//!
//! The list owns exactly one slab at a time. When it runs out of slots it
//! requests `round_up(len + 1)` items, copies across, and drops its handle on
//! the old slab, which the collector reclaims on its next run.

use std::fmt;
use std::ptr::NonNull;

use tracing::debug;

use crate::gc::{AllocError, Heap, ObjHeader};
use crate::slab::{GlobalSlab, Slab, SlabItem, SlabPtr, SlabRef, checked_round_up, zeroed};

/// Growable list of `T`
pub struct List<'h, T: SlabItem> {
    heap: &'h Heap,
    /// Backing storage; `None` until the first item arrives
    slab: Option<SlabPtr<'h, T>>,
    /// Logical length (at most the slab's capacity)
    len: usize,
}

impl<'h, T: SlabItem> List<'h, T> {
    /// Create a new empty list; no slab is allocated yet
    pub fn new(heap: &'h Heap) -> Self {
        List {
            heap,
            slab: None,
            len: 0,
        }
    }

    /// Create a list with room for at least `capacity` items
    pub fn with_capacity(heap: &'h Heap, capacity: usize) -> Result<Self, AllocError> {
        let mut list = List::new(heap);
        list.reserve(capacity)?;
        Ok(list)
    }

    /// Copy the items of a global slab into a new heap list
    pub fn from_global<const N: usize>(
        heap: &'h Heap,
        global: &GlobalSlab<T, N>,
    ) -> Result<Self, AllocError> {
        let mut list = List::with_capacity(heap, N)?;
        list.extend_from_slice(global.as_slab().items())?;
        Ok(list)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the current slab
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slab.as_ref().map_or(0, |slab| slab.capacity())
    }

    /// Make room for at least `min_capacity` items
    pub fn reserve(&mut self, min_capacity: usize) -> Result<(), AllocError> {
        if min_capacity <= self.capacity() {
            return Ok(());
        }

        let new_capacity = checked_round_up(min_capacity).ok_or(AllocError::TooLarge {
            item_size: size_of::<T>(),
            num_items: min_capacity,
        })?;
        let mut slab = Slab::<T>::allocate(self.heap, new_capacity)?;
        slab.as_mut_slice()[..self.len].copy_from_slice(self.as_slice());

        debug!(from = self.capacity(), to = new_capacity, len = self.len, "list grown");
        // The old slab is abandoned here and left to the collector
        self.slab = Some(slab);
        Ok(())
    }

    /// Get an element at the specified index
    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        self.as_slice().get(index).copied()
    }

    /// Replace the element at `index`; returns false if out of range
    pub fn set(&mut self, index: usize, value: T) -> bool {
        if index >= self.len {
            return false;
        }
        self.as_mut_slice()[index] = value;
        true
    }

    /// Push a value onto the end of the list
    pub fn push(&mut self, value: T) -> Result<(), AllocError> {
        if self.len == self.capacity() {
            self.reserve(self.len + 1)?;
        }
        if let Some(slab) = self.slab.as_mut() {
            slab.set(self.len, value);
        }
        self.len += 1;
        Ok(())
    }

    /// Pop a value from the end of the list
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }

        self.len -= 1;
        let slab = self.slab.as_mut()?;
        let value = slab.get(self.len);
        // Clear the slot so a scanned slab stops keeping the value alive
        slab.set(self.len, zeroed());
        value
    }

    /// Append every item of `items`, growing at most once
    pub fn extend_from_slice(&mut self, items: &[T]) -> Result<(), AllocError> {
        if items.is_empty() {
            return Ok(());
        }
        let min_capacity = self.len.checked_add(items.len()).ok_or(AllocError::TooLarge {
            item_size: size_of::<T>(),
            num_items: usize::MAX,
        })?;
        self.reserve(min_capacity)?;
        if let Some(slab) = self.slab.as_mut() {
            slab.as_mut_slice()[self.len..self.len + items.len()].copy_from_slice(items);
        }
        self.len += items.len();
        Ok(())
    }

    /// Remove every item, keeping the slab
    pub fn clear(&mut self) {
        let zero = zeroed();
        self.as_mut_slice().fill(zero);
        self.len = 0;
    }

    /// The filled part of the slab
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match &self.slab {
            Some(slab) => &slab.as_slice()[..self.len],
            None => &[],
        }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len;
        match &mut self.slab {
            Some(slab) => &mut slab.as_mut_slice()[..len],
            None => &mut [],
        }
    }

    /// Get an iterator over the elements
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.as_slice().iter().copied()
    }

    /// Copy element by element into a freshly allocated slab
    pub fn try_clone(&self) -> Result<Self, AllocError> {
        let mut copy = List::with_capacity(self.heap, self.len)?;
        copy.extend_from_slice(self.as_slice())?;
        Ok(copy)
    }

    /// View of the whole backing slab, if any
    pub fn slab(&self) -> Option<SlabRef<'_, T>> {
        self.slab.as_ref().map(|slab| slab.as_slab_ref())
    }

    /// Header of the backing slab, for the collector's root set
    #[inline]
    pub fn root(&self) -> Option<NonNull<ObjHeader>> {
        self.slab.as_ref().map(|slab| slab.as_root())
    }

    #[inline]
    pub fn heap(&self) -> &'h Heap {
        self.heap
    }
}

impl<T: SlabItem + PartialEq> List<'_, T> {
    /// Get index of a value, searching from `from_index`
    pub fn index_of(&self, value: T, from_index: usize) -> Option<usize> {
        self.as_slice()
            .iter()
            .skip(from_index)
            .position(|&item| item == value)
            .map(|i| i + from_index)
    }

    pub fn contains(&self, value: T) -> bool {
        self.index_of(value, 0).is_some()
    }
}

impl<T: SlabItem + fmt::Debug> fmt::Debug for List<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
