//! Typed handles over slab memory
//!
//! [`SlabPtr`] is the exclusive, mutable handle a container holds on its
//! current heap slab. [`SlabRef`] is a read-only view shared by heap slabs
//! and global slabs; both locate items at [`SLAB_HEADER_SIZE`] from the
//! header.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::slice;

use super::{SLAB_HEADER_SIZE, Slab, SlabItem};
use crate::gc::{Heap, HeapTag, ObjHeader};

/// Exclusive handle on a heap slab
///
/// Not `Clone` or `Copy`; a slab has exactly one owner. Copies of the
/// contents go through a container's `try_clone`. Dropping the handle
/// abandons the slab to the collector.
pub struct SlabPtr<'h, T: SlabItem> {
    ptr: NonNull<Slab<T>>,
    _marker: PhantomData<(&'h Heap, T)>,
}

impl<'h, T: SlabItem> SlabPtr<'h, T> {
    /// # Safety
    /// `header` must start a live heap block allocated with `T`'s tag and
    /// item size.
    #[inline]
    pub(crate) unsafe fn from_header(header: NonNull<ObjHeader>) -> Self {
        SlabPtr {
            ptr: header.cast(),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn header(&self) -> &ObjHeader {
        // SAFETY: the header is the first field of a live slab
        unsafe { &(*self.ptr.as_ptr()).header }
    }

    #[inline]
    pub fn tag(&self) -> HeapTag {
        self.header().tag()
    }

    /// Number of item slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.header().num_items()
    }

    #[inline]
    fn items_ptr(&self) -> *mut T {
        // SAFETY: items sit at SLAB_HEADER_SIZE inside the same block
        unsafe { ptr::addr_of_mut!((*self.ptr.as_ptr()).items) as *mut T }
    }

    /// All slots, including ones a container has not filled yet
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the block holds capacity() initialized (zeroed) items
        unsafe { slice::from_raw_parts(self.items_ptr(), self.capacity()) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, and &mut self gives exclusive access
        unsafe { slice::from_raw_parts_mut(self.items_ptr(), self.capacity()) }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        self.as_slice().get(index).copied()
    }

    /// Store `value` at `index`.
    ///
    /// # Panics
    /// Panics if `index >= capacity()`.
    #[inline]
    pub fn set(&mut self, index: usize, value: T) {
        self.as_mut_slice()[index] = value;
    }

    /// Read-only view with the same accessors as a global slab
    #[inline]
    pub fn as_slab_ref(&self) -> SlabRef<'_, T> {
        // SAFETY: the header starts a live slab of T
        unsafe { SlabRef::from_header(self.ptr.cast()) }
    }

    /// Header address, for the collector's root set
    #[inline]
    pub fn as_root(&self) -> NonNull<ObjHeader> {
        self.ptr.cast()
    }
}

impl<T: SlabItem + fmt::Debug> fmt::Debug for SlabPtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabPtr")
            .field("tag", &self.tag())
            .field("items", &self.as_slice())
            .finish()
    }
}

/// Read-only view of a heap slab or a global slab
pub struct SlabRef<'a, T: SlabItem> {
    header: NonNull<ObjHeader>,
    _marker: PhantomData<&'a [T]>,
}

impl<T: SlabItem> Clone for SlabRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: SlabItem> Copy for SlabRef<'_, T> {}

impl<'a, T: SlabItem> SlabRef<'a, T> {
    /// # Safety
    /// `header` must start a slab of `T` (heap or global) valid for `'a`,
    /// and the pointer's provenance must cover the whole slab.
    #[inline]
    pub(crate) unsafe fn from_header(header: NonNull<ObjHeader>) -> Self {
        SlabRef {
            header,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn header(&self) -> &'a ObjHeader {
        // SAFETY: valid for 'a per from_header
        unsafe { &*self.header.as_ptr() }
    }

    #[inline]
    pub fn tag(&self) -> HeapTag {
        self.header().tag()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.header().num_items()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of the value; item `i` sits at `SLAB_HEADER_SIZE + i * size_of::<T>()`
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.header.as_ptr() as *const u8
    }

    #[inline]
    pub fn items(&self) -> &'a [T] {
        // SAFETY: len() items of T follow the header in the same allocation
        unsafe {
            let first = self.as_ptr().add(SLAB_HEADER_SIZE) as *const T;
            slice::from_raw_parts(first, self.len())
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        self.items().get(index).copied()
    }

    pub fn iter(&self) -> std::iter::Copied<slice::Iter<'a, T>> {
        self.items().iter().copied()
    }
}

impl<T: SlabItem + fmt::Debug> fmt::Debug for SlabRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabRef")
            .field("tag", &self.tag())
            .field("items", &self.items())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::HeapConfig;

    fn heap() -> Heap {
        Heap::new(HeapConfig::with_size(4096)).unwrap()
    }

    #[test]
    fn test_fresh_slab_is_zeroed() {
        let heap = heap();
        let slab = Slab::<i64>::allocate(&heap, 6).unwrap();
        assert_eq!(slab.as_slice(), &[0; 6]);

        let ptrs = Slab::<*const ObjHeader>::allocate(&heap, 2).unwrap();
        assert!(ptrs.as_slice().iter().all(|p| p.is_null()));
    }

    #[test]
    fn test_get_set() {
        let heap = heap();
        let mut slab = Slab::<u32>::allocate(&heap, 4).unwrap();

        slab.set(0, 7);
        slab.set(3, 9);
        assert_eq!(slab.get(0), Some(7));
        assert_eq!(slab.get(3), Some(9));
        assert_eq!(slab.get(4), None);
        assert_eq!(slab.as_slice(), &[7, 0, 0, 9]);
    }

    #[test]
    #[should_panic]
    fn test_set_out_of_range_panics() {
        let heap = heap();
        let mut slab = Slab::<u32>::allocate(&heap, 4).unwrap();
        slab.set(4, 1);
    }

    #[test]
    fn test_slab_ref_matches_ptr() {
        let heap = heap();
        let mut slab = Slab::<i16>::allocate(&heap, 3).unwrap();
        slab.as_mut_slice().copy_from_slice(&[-1, 0, 1]);

        let view = slab.as_slab_ref();
        assert_eq!(view.len(), 3);
        assert_eq!(view.tag(), HeapTag::Opaque);
        assert_eq!(view.items(), slab.as_slice());
        assert_eq!(view.iter().collect::<Vec<_>>(), vec![-1, 0, 1]);
        assert_eq!(view.as_ptr(), slab.as_root().as_ptr() as *const u8);
    }

    #[test]
    fn test_empty_slab() {
        let heap = heap();
        let slab = Slab::<u8>::allocate(&heap, 0).unwrap();
        assert_eq!(slab.capacity(), 0);
        assert!(slab.as_slab_ref().is_empty());
        assert!(slab.as_slice().is_empty());
    }
}
