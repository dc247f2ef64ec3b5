//! Arena allocator backing every slab
//!
//! Memory layout:
//! ```text
//! +------------------+  <- base
//! | [hdr | items]    |
//! | [hdr | free   ]  |  reclaimed by the collector, reused first-fit
//! | [hdr | items]    |
//! +------------------+  <- heap_ptr (bump pointer)
//! |   Free space     |
//! +------------------+  <- base + capacity
//! ```
//!
//! All blocks are [`HEAP_ALIGN`]-aligned and start with an [`ObjHeader`].
//! The heap is a single-mutator service: it uses `Cell`/`RefCell` for its
//! bookkeeping and is neither `Send` nor `Sync`.

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::env::VarError;
use std::ptr::{self, NonNull};

use thiserror::Error;
use tracing::{debug, trace, warn};

use super::header::{
    HEAP_ALIGN, HeapTag, MAX_ITEM_SIZE, MAX_SLAB_ITEMS, ObjHeader, checked_align_up,
};
use crate::slab::SLAB_HEADER_SIZE;

/// Smallest arena a heap accepts
pub const MIN_HEAP_SIZE: usize = 4096;

/// Largest arena a heap accepts (free block sizes must fit in a header)
pub const MAX_HEAP_SIZE: usize = MAX_SLAB_ITEMS;

/// Default arena size (1 MiB)
pub const DEFAULT_HEAP_SIZE: usize = 1024 * 1024;

/// Environment variable read by [`HeapConfig::from_env`]
pub const HEAP_SIZE_ENV: &str = "GCHEAP_SIZE";

/// Byte pattern written over reclaimed payloads when poisoning is enabled
pub const POISON_BYTE: u8 = 0xDB;

/// Allocation failure. The runtime has no degraded mode; callers treat it as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("allocation of {num_items} items of {item_size} bytes is too large")]
    TooLarge { item_size: usize, num_items: usize },
}

/// Heap construction failure
#[derive(Debug, Error)]
pub enum HeapError {
    #[error("heap size {size} is outside [{min}, {max}]")]
    InvalidSize { size: usize, min: usize, max: usize },

    #[error("could not reserve a {0} byte arena")]
    ArenaUnavailable(usize),

    #[error("invalid GCHEAP_SIZE value {0:?}")]
    InvalidEnv(String),
}

/// Heap construction parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// Arena size in bytes
    pub size: usize,
    /// Overwrite reclaimed payloads with [`POISON_BYTE`]
    pub poison_freed: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            size: DEFAULT_HEAP_SIZE,
            poison_freed: cfg!(feature = "debug-gc"),
        }
    }
}

impl HeapConfig {
    /// Config with the given arena size and default options
    pub fn with_size(size: usize) -> Self {
        HeapConfig {
            size,
            ..HeapConfig::default()
        }
    }

    /// Read the arena size from `GCHEAP_SIZE`, falling back to the default
    /// when it is unset.
    ///
    /// Accepts a plain byte count or a `k`/`m` suffixed one (`64k`, `4m`).
    pub fn from_env() -> Result<Self, HeapError> {
        HeapConfig::from_var(std::env::var(HEAP_SIZE_ENV))
    }

    fn from_var(var: Result<String, VarError>) -> Result<Self, HeapError> {
        match var {
            Ok(raw) => parse_size(&raw)
                .map(HeapConfig::with_size)
                .ok_or(HeapError::InvalidEnv(raw)),
            Err(VarError::NotPresent) => Ok(HeapConfig::default()),
            Err(VarError::NotUnicode(raw)) => {
                Err(HeapError::InvalidEnv(raw.to_string_lossy().into_owned()))
            }
        }
    }

    fn validate(&self) -> Result<(), HeapError> {
        if self.size < MIN_HEAP_SIZE || self.size > MAX_HEAP_SIZE {
            return Err(HeapError::InvalidSize {
                size: self.size,
                min: MIN_HEAP_SIZE,
                max: MAX_HEAP_SIZE,
            });
        }
        Ok(())
    }
}

fn parse_size(raw: &str) -> Option<usize> {
    let raw = raw.trim().to_ascii_lowercase();
    let (digits, scale) = match raw.as_bytes().last()? {
        b'k' => (&raw[..raw.len() - 1], 1024),
        b'm' => (&raw[..raw.len() - 1], 1024 * 1024),
        _ => (raw.as_str(), 1),
    };
    digits.parse::<usize>().ok()?.checked_mul(scale)
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    allocations: usize,
    collections: usize,
}

/// The process heap
///
/// Owns one zeroed arena. Allocation bumps a pointer or reuses a block the
/// collector freed; the arena is released when the heap is dropped.
pub struct Heap {
    base: NonNull<u8>,
    layout: Layout,
    /// End of the allocated region (offset from base)
    heap_ptr: Cell<usize>,
    /// Offsets of free blocks, in address order
    free_list: RefCell<Vec<usize>>,
    counters: Cell<Counters>,
    config: HeapConfig,
}

impl Heap {
    /// Reserve the arena described by `config`
    pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;

        let size = checked_align_up(config.size).ok_or(HeapError::ArenaUnavailable(config.size))?;
        let layout = Layout::from_size_align(size, HEAP_ALIGN)
            .map_err(|_| HeapError::ArenaUnavailable(size))?;
        // SAFETY: layout has a non-zero size (validated above)
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw).ok_or(HeapError::ArenaUnavailable(size))?;

        debug!(size, "heap arena reserved");

        Ok(Heap {
            base,
            layout,
            heap_ptr: Cell::new(0),
            free_list: RefCell::new(Vec::new()),
            counters: Cell::new(Counters::default()),
            config,
        })
    }

    /// Base address of the arena
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Arena size in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Bytes between the arena base and the bump pointer
    #[inline]
    pub fn heap_used(&self) -> usize {
        self.heap_ptr.get()
    }

    /// Bytes still available to the bump pointer
    #[inline]
    pub fn bump_space(&self) -> usize {
        self.capacity() - self.heap_used()
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Whether `ptr` lies inside this heap's arena.
    ///
    /// Global slabs live outside the arena, so this is how lifetime
    /// management tells them apart from heap blocks.
    #[inline]
    pub fn owns<T>(&self, ptr: *const T) -> bool {
        let base = self.base() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + self.capacity()
    }

    /// Allocate one block holding a header and `num_items` zeroed items.
    ///
    /// Freed blocks are reused first-fit before the bump pointer moves.
    ///
    /// # Panics
    /// Panics if `tag` is [`HeapTag::Free`].
    pub fn alloc(
        &self,
        tag: HeapTag,
        item_size: usize,
        num_items: usize,
    ) -> Result<NonNull<ObjHeader>, AllocError> {
        assert!(tag != HeapTag::Free, "cannot allocate a free block");

        let too_large = AllocError::TooLarge {
            item_size,
            num_items,
        };
        if item_size > MAX_ITEM_SIZE || num_items > MAX_SLAB_ITEMS {
            return Err(too_large);
        }
        let block_size = item_size
            .checked_mul(num_items)
            .and_then(|payload| payload.checked_add(SLAB_HEADER_SIZE))
            .and_then(checked_align_up)
            .ok_or(too_large)?;

        let offset = match self.take_free_block(block_size) {
            Some(offset) => offset,
            None => self.bump(block_size)?,
        };

        // SAFETY: [offset, offset + block_size) is inside the arena and owned
        // by no other block.
        let header = unsafe {
            let ptr = self.base().add(offset);
            ptr::write_bytes(ptr, 0, block_size);
            let header = ptr as *mut ObjHeader;
            header.write(ObjHeader::new(tag, item_size, num_items));
            NonNull::new_unchecked(header)
        };

        let mut counters = self.counters.get();
        counters.allocations += 1;
        self.counters.set(counters);

        trace!(offset, block_size, %tag, num_items, "alloc");
        Ok(header)
    }

    fn bump(&self, block_size: usize) -> Result<usize, AllocError> {
        let offset = self.heap_ptr.get();
        if block_size > self.capacity() - offset {
            warn!(
                requested = block_size,
                available = self.capacity() - offset,
                "heap exhausted"
            );
            return Err(AllocError::OutOfMemory {
                requested: block_size,
                available: self.capacity() - offset,
            });
        }
        self.heap_ptr.set(offset + block_size);
        Ok(offset)
    }

    /// First-fit search of the free list, splitting off any remainder
    fn take_free_block(&self, block_size: usize) -> Option<usize> {
        let mut free_list = self.free_list.borrow_mut();
        let index = free_list
            .iter()
            .position(|&offset| self.header_at(offset).block_bytes() >= block_size)?;

        let offset = free_list[index];
        let available = self.header_at(offset).block_bytes();
        let remainder = available - block_size;
        if remainder == 0 {
            free_list.remove(index);
        } else {
            // Block sizes are multiples of HEAP_ALIGN, so a non-zero
            // remainder always has room for a header.
            let rest = offset + block_size;
            self.write_header(rest, ObjHeader::free(remainder - SLAB_HEADER_SIZE));
            free_list[index] = rest;
        }
        Some(offset)
    }

    #[inline]
    pub(super) fn header_at(&self, offset: usize) -> ObjHeader {
        // SAFETY: callers only pass offsets of block starts inside the arena
        unsafe { *(self.base().add(offset) as *const ObjHeader) }
    }

    #[inline]
    pub(super) fn header_ptr(&self, offset: usize) -> *mut ObjHeader {
        // SAFETY: offset is within the arena
        unsafe { self.base().add(offset) as *mut ObjHeader }
    }

    #[inline]
    pub(super) fn write_header(&self, offset: usize, header: ObjHeader) {
        // SAFETY: offset is a block start inside the arena
        unsafe { self.header_ptr(offset).write(header) }
    }

    pub(super) fn reset_after_sweep(&self, heap_ptr: usize, free_list: Vec<usize>) {
        self.heap_ptr.set(heap_ptr);
        *self.free_list.borrow_mut() = free_list;
        let mut counters = self.counters.get();
        counters.collections += 1;
        self.counters.set(counters);
    }

    /// Memory usage statistics
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            capacity: self.capacity(),
            heap_used: self.heap_used(),
            bump_free: self.bump_space(),
            allocations: self.counters.get().allocations,
            collections: self.counters.get().collections,
            ..HeapStats::default()
        };
        for (_, header) in self.iter_blocks() {
            if header.tag() == HeapTag::Free {
                stats.free_blocks += 1;
                stats.free_list_bytes += header.block_bytes();
            } else {
                stats.live_blocks += 1;
                stats.live_bytes += header.block_bytes();
            }
        }
        stats
    }

    /// Iterator over every block below the bump pointer, in address order
    pub fn iter_blocks(&self) -> BlockIterator<'_> {
        BlockIterator {
            heap: self,
            offset: 0,
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        // SAFETY: base was returned by alloc_zeroed with this exact layout
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
        debug!(size = self.layout.size(), "heap arena released");
    }
}

/// Memory usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Arena size
    pub capacity: usize,
    /// Bytes below the bump pointer
    pub heap_used: usize,
    /// Bytes above the bump pointer
    pub bump_free: usize,
    /// Blocks currently holding values
    pub live_blocks: usize,
    pub live_bytes: usize,
    /// Reclaimed blocks awaiting reuse
    pub free_blocks: usize,
    pub free_list_bytes: usize,
    /// Allocations since the heap was created
    pub allocations: usize,
    /// Collections since the heap was created
    pub collections: usize,
}

/// Iterator over allocated blocks in the heap
pub struct BlockIterator<'a> {
    heap: &'a Heap,
    offset: usize,
}

impl Iterator for BlockIterator<'_> {
    type Item = (NonNull<ObjHeader>, ObjHeader);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.heap.heap_used() {
            return None;
        }

        let header = self.heap.header_at(self.offset);
        // SAFETY: header_ptr is derived from the non-null arena base
        let ptr = unsafe { NonNull::new_unchecked(self.heap.header_ptr(self.offset)) };
        self.offset += header.block_bytes();

        Some((ptr, header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn small_heap() -> Heap {
        Heap::new(HeapConfig::with_size(4096)).unwrap()
    }

    #[test]
    fn test_heap_creation() {
        let heap = small_heap();
        assert_eq!(heap.capacity(), 4096);
        assert_eq!(heap.heap_used(), 0);
        assert_eq!(heap.bump_space(), 4096);
    }

    #[test]
    fn test_invalid_size() {
        let err = Heap::new(HeapConfig::with_size(16)).err().unwrap();
        assert!(matches!(err, HeapError::InvalidSize { size: 16, .. }));
    }

    #[test]
    fn test_alloc() {
        let heap = small_heap();

        let header = heap.alloc(HeapTag::Opaque, 4, 10).unwrap();
        assert!(heap.owns(header.as_ptr()));
        assert_eq!(heap.heap_used(), SLAB_HEADER_SIZE + 40);

        let header = unsafe { header.as_ref() };
        assert_eq!(header.tag(), HeapTag::Opaque);
        assert_eq!(header.num_items(), 10);
        assert!(!header.is_marked());
    }

    #[test]
    fn test_alloc_zeroed() {
        let heap = small_heap();
        let header = heap.alloc(HeapTag::Opaque, 1, 32).unwrap();

        unsafe {
            let data = (header.as_ptr() as *const u8).add(SLAB_HEADER_SIZE);
            for i in 0..32 {
                assert_eq!(*data.add(i), 0);
            }
        }
    }

    #[test]
    fn test_alloc_is_aligned() {
        let heap = small_heap();
        for n in 1..8 {
            let header = heap.alloc(HeapTag::Opaque, 1, n).unwrap();
            assert_eq!(header.as_ptr() as usize % HEAP_ALIGN, 0);
        }
    }

    #[test]
    fn test_out_of_memory() {
        let heap = small_heap();
        let err = heap.alloc(HeapTag::Opaque, 1, 8192).unwrap_err();
        assert_eq!(
            err,
            AllocError::OutOfMemory {
                requested: SLAB_HEADER_SIZE + 8192,
                available: 4096,
            }
        );
    }

    #[test]
    fn test_too_large() {
        let heap = small_heap();
        let err = heap.alloc(HeapTag::Opaque, 8, MAX_SLAB_ITEMS + 1).unwrap_err();
        assert!(matches!(err, AllocError::TooLarge { .. }));
    }

    #[test]
    fn test_block_iterator() {
        let heap = small_heap();

        heap.alloc(HeapTag::Opaque, 4, 8).unwrap();
        heap.alloc(HeapTag::Scanned, 8, 4).unwrap();
        heap.alloc(HeapTag::Opaque, 1, 3).unwrap();

        let tags: Vec<_> = heap.iter_blocks().map(|(_, h)| h.tag()).collect();
        assert_eq!(tags, vec![HeapTag::Opaque, HeapTag::Scanned, HeapTag::Opaque]);
    }

    #[test]
    fn test_owns_rejects_foreign_pointers() {
        let heap = small_heap();
        let local = 7u64;
        assert!(!heap.owns(&local as *const u64));
        assert!(!heap.owns(unsafe { heap.base().add(heap.capacity()) }));
    }

    #[test]
    fn test_stats() {
        let heap = small_heap();
        heap.alloc(HeapTag::Opaque, 8, 4).unwrap();
        heap.alloc(HeapTag::Opaque, 8, 4).unwrap();

        let stats = heap.stats();
        assert_eq!(stats.live_blocks, 2);
        assert_eq!(stats.live_bytes, 2 * (SLAB_HEADER_SIZE + 32));
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.free_blocks, 0);
        assert_eq!(stats.heap_used + stats.bump_free, stats.capacity);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("64k"), Some(64 * 1024));
        assert_eq!(parse_size(" 2M "), Some(2 * 1024 * 1024));
        assert_eq!(parse_size("lots"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn test_config_from_var() {
        let unset = HeapConfig::from_var(Err(VarError::NotPresent)).unwrap();
        assert_eq!(unset, HeapConfig::default());
        assert_eq!(HeapConfig::from_var(Ok("64k".into())).unwrap().size, 64 * 1024);
        assert!(matches!(
            HeapConfig::from_var(Ok("lots".into())),
            Err(HeapError::InvalidEnv(raw)) if raw == "lots"
        ));

        let not_unicode = VarError::NotUnicode(OsString::from("4m"));
        let err = HeapConfig::from_var(Err(not_unicode)).unwrap_err();
        assert!(matches!(err, HeapError::InvalidEnv(_)));
    }

    #[test]
    #[should_panic(expected = "cannot allocate a free block")]
    fn test_alloc_free_tag_panics() {
        let heap = small_heap();
        let _ = heap.alloc(HeapTag::Free, 8, 1);
    }
}
