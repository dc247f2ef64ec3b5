//! Slabs: header-prefixed runs of homogeneous items
//!
//! ```text
//!   Slab<T> in the heap             GlobalSlab<T, N> in static memory
//!   +-----------+                   +-----------+
//!   | ObjHeader |                   | ObjHeader |
//!   +-----------+ <- SLAB_HEADER_SIZE +-----------+
//!   | items[0]  |                   | items[0]  |
//!   | ...       |                   | ...       |
//!   | items[n-1]|                   | items[N-1]|
//!   +-----------+                   +-----------+
//! ```
//!
//! Both shapes share one layout, checked at compile time below, so the
//! collector and [`SlabRef`] read them with the same offset arithmetic.

mod capacity;
mod global;
mod handle;
mod item;

use std::mem;

use crate::gc::{AllocError, HEAP_ALIGN, Heap, HeapTag, ObjHeader};

pub use capacity::{
    MIN_CAPACITY, checked_round_up, checked_round_up_block, round_up, round_up_block,
};
pub use global::GlobalSlab;
pub use handle::{SlabPtr, SlabRef};
pub use item::SlabItem;
pub(crate) use item::zeroed;

/// A header followed by a variable number of `T`
///
/// Never held by value: it only exists behind a [`SlabPtr`] into the heap.
#[repr(C)]
pub struct Slab<T> {
    header: ObjHeader,
    items: [T; 0],
}

/// Byte offset from the start of any slab-shaped value to its first item
pub const SLAB_HEADER_SIZE: usize = mem::offset_of!(Slab<i32>, items);

const _: () = {
    assert!(SLAB_HEADER_SIZE == mem::size_of::<ObjHeader>());
    assert!(mem::offset_of!(Slab<u8>, header) == 0);
    assert!(mem::offset_of!(Slab<u8>, items) == SLAB_HEADER_SIZE);
    assert!(mem::offset_of!(Slab<u64>, items) == SLAB_HEADER_SIZE);
    assert!(mem::offset_of!(Slab<*const ObjHeader>, items) == SLAB_HEADER_SIZE);
};

impl<T: SlabItem> Slab<T> {
    /// Scan tag every `Slab<T>` carries
    pub const TAG: HeapTag = T::TAG;

    pub(crate) const LAYOUT_OK: () = assert!(
        mem::offset_of!(Slab<T>, items) == SLAB_HEADER_SIZE && mem::align_of::<T>() <= HEAP_ALIGN,
        "slab item alignment exceeds the header alignment"
    );

    /// Allocate a slab of `num_items` zeroed items.
    ///
    /// `num_items` is used as given; apply [`round_up`] first for amortized
    /// growth.
    pub fn allocate(heap: &Heap, num_items: usize) -> Result<SlabPtr<'_, T>, AllocError> {
        let () = Self::LAYOUT_OK;
        let header = heap.alloc(T::TAG, mem::size_of::<T>(), num_items)?;
        // SAFETY: the block was just allocated with T's tag and item size
        Ok(unsafe { SlabPtr::from_header(header) })
    }
}
