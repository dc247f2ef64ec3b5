//! Mark-sweep garbage collector
//!
//! The GC works in two phases:
//! 1. Mark: walk every value reachable from the roots. The header tag alone
//!    decides what to follow: `Scanned` payloads are pointer slots, `Opaque`
//!    payloads are skipped.
//! 2. Sweep: walk the arena in address order. Unmarked blocks become free,
//!    adjacent free blocks coalesce, and a free run at the end of the arena
//!    is handed back to the bump pointer.
//!
//! Global slabs live outside the arena. They are traced like any slab but
//! never marked or swept. Arena addresses that do not start a live block are
//! not values and are skipped.

use std::collections::HashSet;
use std::ptr::{self, NonNull};

use tracing::debug;

use super::allocator::{Heap, POISON_BYTE};
use super::header::{HeapTag, ObjHeader};
use crate::slab::SLAB_HEADER_SIZE;

/// Statistics about a GC run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Live blocks before collection
    pub objects_before: usize,
    /// Live blocks after collection
    pub objects_after: usize,
    /// Bytes of blocks reclaimed by this run
    pub bytes_freed: usize,
    /// Bytes handed back to the bump pointer
    pub bytes_returned: usize,
    /// Global slabs visited while marking
    pub globals_traced: usize,
}

impl GcStats {
    #[inline]
    pub fn objects_freed(&self) -> usize {
        self.objects_before - self.objects_after
    }
}

/// Run garbage collection on the heap
///
/// # Safety
/// Every value still in use must be reachable from `roots`, every root must
/// point at the header of a heap block or a global slab, and no reference
/// into the heap may be alive across the call.
pub unsafe fn collect(heap: &Heap, roots: &[NonNull<ObjHeader>]) -> GcStats {
    let mut stats = GcStats::default();

    // SAFETY: forwarded from the caller
    unsafe { mark(heap, roots, &mut stats) };
    sweep(heap, &mut stats);

    debug!(
        before = stats.objects_before,
        after = stats.objects_after,
        bytes_freed = stats.bytes_freed,
        bytes_returned = stats.bytes_returned,
        "collection finished"
    );
    stats
}

/// Mark everything reachable from `roots`
unsafe fn mark(heap: &Heap, roots: &[NonNull<ObjHeader>], stats: &mut GcStats) {
    let blocks: HashSet<*mut ObjHeader> = heap
        .iter_blocks()
        .filter(|(_, header)| header.tag() != HeapTag::Free)
        .map(|(ptr, _)| ptr.as_ptr())
        .collect();
    let mut worklist: Vec<NonNull<ObjHeader>> = roots.to_vec();
    let mut globals: HashSet<NonNull<ObjHeader>> = HashSet::new();

    while let Some(obj) = worklist.pop() {
        let header = obj.as_ptr();

        unsafe {
            if heap.owns(header) {
                if !blocks.contains(&header) || (*header).is_marked() {
                    continue;
                }
                (*header).set_marked(true);
            } else {
                if !globals.insert(obj) {
                    continue;
                }
                stats.globals_traced += 1;
            }

            if (*header).tag() == HeapTag::Scanned {
                push_children(obj, &mut worklist);
            }
        }
    }
}

/// Push every non-null pointer slot of a scanned slab's payload
unsafe fn push_children(obj: NonNull<ObjHeader>, worklist: &mut Vec<NonNull<ObjHeader>>) {
    unsafe {
        let header = &*obj.as_ptr();
        let num_slots = header.payload_bytes() / size_of::<*mut ObjHeader>();

        let slots = (obj.as_ptr() as *const u8).add(SLAB_HEADER_SIZE) as *const *mut ObjHeader;
        for i in 0..num_slots {
            if let Some(child) = NonNull::new(*slots.add(i)) {
                worklist.push(child);
            }
        }
    }
}

/// Free unmarked blocks and rebuild the free list
fn sweep(heap: &Heap, stats: &mut GcStats) {
    let end = heap.heap_used();
    let mut free_list = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut offset = 0;

    while offset < end {
        let header = heap.header_at(offset);
        let size = header.block_bytes();

        if header.is_marked() {
            // SAFETY: offset is the start of a live block
            unsafe { (*heap.header_ptr(offset)).set_marked(false) };
            stats.objects_before += 1;
            stats.objects_after += 1;

            if let Some(start) = run_start.take() {
                close_free_run(heap, start, offset);
                free_list.push(start);
            }
        } else {
            if header.tag() != HeapTag::Free {
                stats.objects_before += 1;
                stats.bytes_freed += size;
            }
            run_start.get_or_insert(offset);
        }

        offset += size;
    }

    let heap_ptr = match run_start {
        Some(start) => {
            stats.bytes_returned = end - start;
            if heap.config().poison_freed {
                poison(heap, start, end);
            }
            start
        }
        None => end,
    };

    heap.reset_after_sweep(heap_ptr, free_list);
}

/// Turn `[start, end)` into one free block
fn close_free_run(heap: &Heap, start: usize, end: usize) {
    heap.write_header(start, ObjHeader::free(end - start - SLAB_HEADER_SIZE));
    if heap.config().poison_freed {
        poison(heap, start + SLAB_HEADER_SIZE, end);
    }
}

fn poison(heap: &Heap, start: usize, end: usize) {
    // SAFETY: [start, end) is inside the arena and owned by no live block
    unsafe { ptr::write_bytes(heap.base().add(start), POISON_BYTE, end - start) };
}
