//! gcheap - slab allocator and object model for a garbage-collected runtime
//!
//! Every dynamically sized value the runtime creates (growable arrays,
//! dictionaries, constant aggregates) is a *slab*: an [`ObjHeader`] followed
//! by a contiguous run of items.
//!
//! # Features
//! - One header layout for every heap value; the collector reads only the tag
//! - Scan tag derived from the element type at compile time
//! - Power-of-two capacity policy for resizable containers
//! - Global slabs: statically initialized, layout-identical to heap slabs
//! - A small arena heap with mark-sweep collection and free-block reuse
//!
//! # Example
//! ```
//! use gcheap::{Heap, HeapConfig, List};
//!
//! let heap = Heap::new(HeapConfig::with_size(64 * 1024)).unwrap();
//! let mut list = List::new(&heap);
//! for i in 0..5 {
//!     list.push(i).unwrap();
//! }
//! assert_eq!(list.capacity(), 8);
//!
//! let roots: Vec<_> = list.root().into_iter().collect();
//! let stats = unsafe { heap.collect(&roots) };
//! assert_eq!(stats.objects_freed(), 1); // the abandoned 4-item slab
//! ```

// Process heap and garbage collector
pub mod gc;

// Slab layout, handles and capacity policy
pub mod slab;

// Resizable containers
pub mod runtime;

// Re-export main types
pub use gc::{AllocError, GcStats, Heap, HeapConfig, HeapError, HeapTag, ObjHeader};
pub use runtime::{Dict, List};
pub use slab::{GlobalSlab, SLAB_HEADER_SIZE, Slab, SlabItem, SlabPtr, SlabRef, round_up};
