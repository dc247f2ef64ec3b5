//! Statically initialized slabs
//!
//! A [`GlobalSlab`] is laid out exactly like a heap slab of `N` items, so
//! constant container contents can be baked into the binary and read through
//! the same [`SlabRef`] accessors without a runtime allocation.
//!
//! ```
//! use gcheap::slab::GlobalSlab;
//! use gcheap::gc::HeapTag;
//!
//! static PRIMES: GlobalSlab<i32, 4> = GlobalSlab::new([2, 3, 5, 7]);
//!
//! let view = PRIMES.as_slab();
//! assert_eq!(view.tag(), HeapTag::Opaque);
//! assert_eq!(view.items(), &[2, 3, 5, 7]);
//! ```

use std::mem;
use std::ptr::NonNull;

use super::{SLAB_HEADER_SIZE, Slab, SlabItem, SlabRef};
use crate::gc::ObjHeader;

/// A header followed by exactly `N` items, built at compile time
///
/// There is no mutable access: a global slab is constant data. The heap
/// never allocates, marks or frees one.
#[repr(C)]
pub struct GlobalSlab<T: SlabItem, const N: usize> {
    header: ObjHeader,
    items: [T; N],
}

// SAFETY: a global slab is never written after construction, including by
// the collector, so sharing it only shares plain data.
unsafe impl<T: SlabItem, const N: usize> Sync for GlobalSlab<T, N> {}

impl<T: SlabItem, const N: usize> GlobalSlab<T, N> {
    const LAYOUT_OK: () = assert!(
        mem::offset_of!(Self, header) == mem::offset_of!(Slab<T>, header)
            && mem::offset_of!(Self, items) == SLAB_HEADER_SIZE
            && mem::offset_of!(Self, items) == mem::offset_of!(Slab<T>, items),
        "GlobalSlab layout diverges from Slab"
    );

    pub const fn new(items: [T; N]) -> Self {
        let () = Slab::<T>::LAYOUT_OK;
        let () = Self::LAYOUT_OK;
        GlobalSlab {
            header: ObjHeader::new(T::TAG, mem::size_of::<T>(), N),
            items,
        }
    }

    #[inline]
    pub const fn header(&self) -> &ObjHeader {
        &self.header
    }

    #[inline]
    pub const fn len(&self) -> usize {
        N
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    #[inline]
    pub const fn items(&self) -> &[T; N] {
        &self.items
    }

    /// The same view a heap slab of these items would give
    #[inline]
    pub fn as_slab(&self) -> SlabRef<'_, T> {
        // SAFETY: the pointer covers the whole struct, whose layout matches
        // a slab of N items
        unsafe { SlabRef::from_header(self.as_root()) }
    }

    /// Header address, for roots that reach heap values through a global
    #[inline]
    pub fn as_root(&self) -> NonNull<ObjHeader> {
        NonNull::from(self).cast()
    }
}

// A representative instantiation, checked when the crate builds
const _: () = {
    assert!(mem::offset_of!(GlobalSlab<i32, 3>, header) == 0);
    assert!(mem::offset_of!(GlobalSlab<i32, 3>, items) == SLAB_HEADER_SIZE);
    assert!(mem::offset_of!(GlobalSlab<*const ObjHeader, 1>, items) == SLAB_HEADER_SIZE);
    assert!(mem::size_of::<GlobalSlab<u64, 2>>() == SLAB_HEADER_SIZE + 16);
};
