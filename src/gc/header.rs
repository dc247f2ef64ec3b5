//! Object header shared by every heap value
//!
//! Layout (two 32-bit words, 8-byte aligned):
//! ```text
//! +--------------------------------------+-------------+
//! |                bits                  |  num_items  |
//! | bit 0: mark | bits 1-3: tag | 8-31:  |             |
//! |                         item size    |             |
//! +--------------------------------------+-------------+
//! ```
//!
//! The header is always the first thing in a block, so the collector can
//! read it without knowing the concrete type of the value behind it.

use crate::slab::SLAB_HEADER_SIZE;

/// Alignment of every block in the heap (and of every header)
pub const HEAP_ALIGN: usize = std::mem::align_of::<ObjHeader>();

/// Largest item count a single header can describe (2^31)
pub const MAX_SLAB_ITEMS: usize = 1 << 31;

/// Largest item size in bytes a header can describe
pub const MAX_ITEM_SIZE: usize = (1 << 24) - 1;

const MARK_BIT: u32 = 1;
const TAG_SHIFT: u32 = 1;
const TAG_MASK: u32 = 0x7;
const ITEM_SIZE_SHIFT: u32 = 8;

/// Scan classification stored in every header
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapTag {
    /// Reclaimed block owned by the heap's free list
    Free = 0,
    /// Payload is inert data (ints, bools, bytes); never traced
    Opaque = 1,
    /// Payload is a run of pointers to other heap values
    Scanned = 2,
}

impl HeapTag {
    pub const COUNT: usize = 3;

    #[inline]
    const fn from_bits(bits: u32) -> Self {
        match bits {
            1 => HeapTag::Opaque,
            2 => HeapTag::Scanned,
            _ => HeapTag::Free,
        }
    }

    /// Whether the collector has to follow the payload
    #[inline]
    pub const fn is_scanned(self) -> bool {
        matches!(self, HeapTag::Scanned)
    }
}

impl std::fmt::Display for HeapTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HeapTag::Free => "free",
            HeapTag::Opaque => "opaque",
            HeapTag::Scanned => "scanned",
        };
        f.write_str(name)
    }
}

/// Header prefixed to every heap value
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjHeader {
    bits: u32,
    num_items: u32,
}

impl ObjHeader {
    /// Build a header for a block of `num_items` items of `item_size` bytes.
    ///
    /// Only the heap and `GlobalSlab::new` construct headers.
    #[inline]
    pub(crate) const fn new(tag: HeapTag, item_size: usize, num_items: usize) -> Self {
        assert!(item_size <= MAX_ITEM_SIZE, "slab item size too large");
        assert!(num_items <= MAX_SLAB_ITEMS, "slab item count too large");
        ObjHeader {
            bits: ((tag as u32) << TAG_SHIFT) | ((item_size as u32) << ITEM_SIZE_SHIFT),
            num_items: num_items as u32,
        }
    }

    /// Header of a reclaimed block with `payload_bytes` bytes after it
    #[inline]
    pub(crate) const fn free(payload_bytes: usize) -> Self {
        ObjHeader::new(HeapTag::Free, 1, payload_bytes)
    }

    #[inline]
    pub const fn tag(&self) -> HeapTag {
        HeapTag::from_bits((self.bits >> TAG_SHIFT) & TAG_MASK)
    }

    #[inline]
    pub const fn is_marked(&self) -> bool {
        (self.bits & MARK_BIT) != 0
    }

    #[inline]
    pub(crate) fn set_marked(&mut self, marked: bool) {
        if marked {
            self.bits |= MARK_BIT;
        } else {
            self.bits &= !MARK_BIT;
        }
    }

    /// Number of item slots following the header
    #[inline]
    pub const fn num_items(&self) -> usize {
        self.num_items as usize
    }

    /// Size of one item in bytes
    #[inline]
    pub const fn item_size(&self) -> usize {
        (self.bits >> ITEM_SIZE_SHIFT) as usize
    }

    /// Bytes of item storage following the header
    #[inline]
    pub const fn payload_bytes(&self) -> usize {
        self.item_size() * self.num_items()
    }

    /// Total block size in bytes, header included, rounded to [`HEAP_ALIGN`]
    #[inline]
    pub const fn block_bytes(&self) -> usize {
        align_up(SLAB_HEADER_SIZE + self.payload_bytes())
    }
}

/// Round `size` up to the heap alignment
#[inline]
pub const fn align_up(size: usize) -> usize {
    (size + HEAP_ALIGN - 1) & !(HEAP_ALIGN - 1)
}

/// Overflow-checked [`align_up`]
#[inline]
pub(crate) const fn checked_align_up(size: usize) -> Option<usize> {
    match size.checked_add(HEAP_ALIGN - 1) {
        Some(n) => Some(n & !(HEAP_ALIGN - 1)),
        None => None,
    }
}
