//! Process heap and garbage collector
//!
//! Every heap value starts with an [`ObjHeader`] whose [`HeapTag`] tells the
//! collector whether the payload holds pointers. That is the only thing the
//! collector needs to know about a value, so it never dispatches on types.

mod allocator;
mod collector;
mod header;

use std::ptr::NonNull;

pub use allocator::{
    AllocError, BlockIterator, DEFAULT_HEAP_SIZE, HEAP_SIZE_ENV, Heap, HeapConfig, HeapError,
    HeapStats, MAX_HEAP_SIZE, MIN_HEAP_SIZE, POISON_BYTE,
};
pub use collector::GcStats;
pub use header::{HEAP_ALIGN, HeapTag, MAX_ITEM_SIZE, MAX_SLAB_ITEMS, ObjHeader, align_up};

impl Heap {
    /// Run garbage collection
    ///
    /// # Safety
    /// Every value still in use must be reachable from `roots`, and no
    /// slice or header reference borrowed from a slab may be held across the
    /// call. Containers expose their roots through `List::root` and
    /// `Dict::roots`.
    pub unsafe fn collect(&self, roots: &[NonNull<ObjHeader>]) -> GcStats {
        unsafe { collector::collect(self, roots) }
    }
}
