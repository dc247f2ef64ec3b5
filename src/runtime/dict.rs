//! Insertion-ordered dictionary over two parallel slabs
//!
//! Keys and values live in separate slabs of equal capacity, so each slab
//! keeps a single scan tag: a dictionary from ints to pointers has an opaque
//! key slab and a scanned value slab. Lookup is a linear scan over the keys.

use std::fmt;
use std::ptr::NonNull;

use tracing::debug;

use crate::gc::{AllocError, Heap, ObjHeader};
use crate::slab::{Slab, SlabItem, SlabPtr, checked_round_up_block, zeroed};

/// Insertion-ordered map from `K` to `V`
pub struct Dict<'h, K: SlabItem, V: SlabItem> {
    heap: &'h Heap,
    /// Key storage; `None` until the first entry arrives
    keys: Option<SlabPtr<'h, K>>,
    /// Value storage, same capacity as `keys`
    values: Option<SlabPtr<'h, V>>,
    /// Number of entries
    len: usize,
}

impl<'h, K: SlabItem + PartialEq, V: SlabItem> Dict<'h, K, V> {
    /// Create an empty dictionary; no slabs are allocated yet
    pub fn new(heap: &'h Heap) -> Self {
        Dict {
            heap,
            keys: None,
            values: None,
            len: 0,
        }
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of entry slots in the current slabs
    #[inline]
    pub fn capacity(&self) -> usize {
        self.keys.as_ref().map_or(0, |keys| keys.capacity())
    }

    /// Grow both slabs to hold at least `min_capacity` entries.
    ///
    /// The key slab is sized so its whole block is a power of two bytes; the
    /// value slab gets the same item count.
    pub fn reserve(&mut self, min_capacity: usize) -> Result<(), AllocError> {
        if min_capacity <= self.capacity() {
            return Ok(());
        }

        let new_capacity =
            checked_round_up_block::<K>(min_capacity).ok_or(AllocError::TooLarge {
                item_size: size_of::<K>(),
                num_items: min_capacity,
            })?;
        let mut keys = Slab::<K>::allocate(self.heap, new_capacity)?;
        let mut values = Slab::<V>::allocate(self.heap, new_capacity)?;
        keys.as_mut_slice()[..self.len].copy_from_slice(self.keys());
        values.as_mut_slice()[..self.len].copy_from_slice(self.values());

        debug!(from = self.capacity(), to = new_capacity, len = self.len, "dict grown");
        self.keys = Some(keys);
        self.values = Some(values);
        Ok(())
    }

    /// Index of `key` in insertion order
    fn position(&self, key: &K) -> Option<usize> {
        self.keys().iter().position(|k| k == key)
    }

    /// Insert or replace; returns the previous value for `key`
    pub fn set(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        if let (Some(index), Some(values)) = (self.position(&key), self.values.as_mut()) {
            let old = values.get(index);
            values.set(index, value);
            return Ok(old);
        }

        if self.len == self.capacity() {
            self.reserve(self.len + 1)?;
        }
        if let (Some(keys), Some(values)) = (self.keys.as_mut(), self.values.as_mut()) {
            keys.set(self.len, key);
            values.set(self.len, value);
        }
        self.len += 1;
        Ok(None)
    }

    /// Look up the value stored for `key`
    pub fn get(&self, key: &K) -> Option<V> {
        let index = self.position(key)?;
        self.values().get(index).copied()
    }

    /// Whether an entry for `key` exists
    pub fn contains_key(&self, key: &K) -> bool {
        self.position(key).is_some()
    }

    /// Remove `key`, keeping the remaining entries in insertion order
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.position(key)?;
        let len = self.len;
        let (keys, values) = (self.keys.as_mut()?, self.values.as_mut()?);

        let removed = values.get(index);
        keys.as_mut_slice().copy_within(index + 1..len, index);
        values.as_mut_slice().copy_within(index + 1..len, index);
        keys.set(len - 1, zeroed());
        values.set(len - 1, zeroed());

        self.len -= 1;
        removed
    }

    /// Keys in insertion order
    pub fn keys(&self) -> &[K] {
        match &self.keys {
            Some(keys) => &keys.as_slice()[..self.len],
            None => &[],
        }
    }

    /// Values in insertion order
    pub fn values(&self) -> &[V] {
        match &self.values {
            Some(values) => &values.as_slice()[..self.len],
            None => &[],
        }
    }

    /// Get an iterator over `(key, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.keys().iter().copied().zip(self.values().iter().copied())
    }

    /// Headers of both backing slabs, for the collector's root set
    pub fn roots(&self) -> impl Iterator<Item = NonNull<ObjHeader>> + '_ {
        let keys = self.keys.as_ref().map(|slab| slab.as_root());
        let values = self.values.as_ref().map(|slab| slab.as_root());
        keys.into_iter().chain(values)
    }
}

impl<K, V> fmt::Debug for Dict<'_, K, V>
where
    K: SlabItem + PartialEq + fmt::Debug,
    V: SlabItem + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::{HeapConfig, HeapTag};
    use crate::runtime::List;

    fn heap() -> Heap {
        Heap::new(HeapConfig::with_size(16 * 1024)).unwrap()
    }

    #[test]
    fn test_set_get() {
        let heap = heap();
        let mut dict = Dict::new(&heap);

        assert_eq!(dict.set(1i32, 100i64).unwrap(), None);
        assert_eq!(dict.set(2, 200).unwrap(), None);
        assert_eq!(dict.set(1, 150).unwrap(), Some(100));

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get(&1), Some(150));
        assert_eq!(dict.get(&2), Some(200));
        assert_eq!(dict.get(&3), None);
        assert!(dict.contains_key(&2));
    }

    #[test]
    fn test_insertion_order() {
        let heap = heap();
        let mut dict = Dict::new(&heap);
        for k in [5u32, 3, 9, 1] {
            dict.set(k, k * 10).unwrap();
        }

        assert_eq!(dict.keys(), &[5, 3, 9, 1]);
        assert_eq!(dict.values(), &[50, 30, 90, 10]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let heap = heap();
        let mut dict = Dict::new(&heap);
        for k in 0..5u8 {
            dict.set(k, k as i32).unwrap();
        }

        assert_eq!(dict.remove(&1), Some(1));
        assert_eq!(dict.remove(&1), None);
        assert_eq!(dict.keys(), &[0, 2, 3, 4]);
        assert_eq!(dict.iter().collect::<Vec<_>>(), vec![(0, 0), (2, 2), (3, 3), (4, 4)]);
    }

    #[test]
    fn test_growth_uses_block_rounding() {
        let heap = heap();
        let mut dict = Dict::new(&heap);
        dict.set(0i32, 0i32).unwrap();

        // 8 byte header + 4 * 4 bytes = 24 -> 32 byte block -> 6 keys
        assert_eq!(dict.capacity(), 6);
        for k in 1..7 {
            dict.set(k, k).unwrap();
        }
        assert!(dict.capacity() >= 7);
        assert_eq!(dict.len(), 7);
        assert_eq!(dict.get(&6), Some(6));
    }

    #[test]
    fn test_roots_keep_both_slabs() {
        let heap = heap();
        let mut dict = Dict::new(&heap);
        for k in 0..10i64 {
            dict.set(k, k as f64).unwrap();
        }

        let roots: Vec<_> = dict.roots().collect();
        assert_eq!(roots.len(), 2);
        let stats = unsafe { heap.collect(&roots) };
        assert_eq!(stats.objects_after, 2);
        assert_eq!(dict.get(&9), Some(9.0));
    }

    #[test]
    fn test_pointer_values_are_scanned() {
        let heap = heap();

        let mut list = List::new(&heap);
        list.extend_from_slice(&[1u16, 2, 3]).unwrap();

        let mut dict: Dict<'_, u32, *const ObjHeader> = Dict::new(&heap);
        dict.set(7, list.root().unwrap().as_ptr()).unwrap();
        assert_eq!(dict.values.as_ref().unwrap().tag(), HeapTag::Scanned);
        assert_eq!(dict.keys.as_ref().unwrap().tag(), HeapTag::Opaque);

        let roots: Vec<_> = dict.roots().collect();
        let stats = unsafe { heap.collect(&roots) };
        assert_eq!(stats.objects_after, 3);
        assert_eq!(list.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_oversized_reserve_is_an_error() {
        let heap = heap();
        let mut dict = Dict::<u8, u8>::new(&heap);
        dict.set(1, 2).unwrap();

        let err = dict.reserve(usize::MAX).unwrap_err();
        assert!(matches!(err, AllocError::TooLarge { .. }));
        assert_eq!(dict.get(&1), Some(2));
        assert_eq!(dict.len(), 1);
    }
}
