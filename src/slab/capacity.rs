//! Capacity policy for resizable containers
//!
//! [`round_up`] is the baseline every container respects. Containers may
//! round further on top of it; [`round_up_block`] is one such refinement.

use super::{SLAB_HEADER_SIZE, SlabItem};
use crate::gc::MAX_SLAB_ITEMS;

/// Smallest capacity a container ever requests
pub const MIN_CAPACITY: usize = 4;

/// Capacity to request for at least `n` items: 4 below the floor, otherwise
/// the next power of two, or `None` past [`MAX_SLAB_ITEMS`].
#[inline]
pub const fn checked_round_up(n: usize) -> Option<usize> {
    if n < MIN_CAPACITY {
        return Some(MIN_CAPACITY);
    }
    if n > MAX_SLAB_ITEMS {
        return None;
    }

    // n - 1 fits in 31 bits here
    let mut v = (n - 1) as u32;
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    Some(v as usize + 1)
}

/// [`checked_round_up`] for callers that already bound `n`.
///
/// # Panics
/// Panics if `n` exceeds [`MAX_SLAB_ITEMS`]; no slab that large can exist.
#[inline]
pub const fn round_up(n: usize) -> usize {
    match checked_round_up(n) {
        Some(capacity) => capacity,
        None => panic!("capacity request exceeds the maximum slab length"),
    }
}

/// Item count for at least `n` items such that the whole block, header
/// included, is a power of two bytes. `None` past [`MAX_SLAB_ITEMS`].
pub fn checked_round_up_block<T: SlabItem>(n: usize) -> Option<usize> {
    let item_size = size_of::<T>().max(1);
    let items = checked_round_up(n)?;
    let block = items
        .checked_mul(item_size)
        .and_then(|bytes| bytes.checked_add(SLAB_HEADER_SIZE))
        .and_then(usize::checked_next_power_of_two);
    match block {
        Some(block) => Some(((block - SLAB_HEADER_SIZE) / item_size).min(MAX_SLAB_ITEMS)),
        None => Some(items),
    }
}

/// [`checked_round_up_block`] for callers that already bound `n`.
///
/// # Panics
/// Panics if `n` exceeds [`MAX_SLAB_ITEMS`].
pub fn round_up_block<T: SlabItem>(n: usize) -> usize {
    match checked_round_up_block::<T>(n) {
        Some(capacity) => capacity,
        None => panic!("capacity request exceeds the maximum slab length"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor() {
        for n in 0..4 {
            assert_eq!(round_up(n), 4);
        }
    }

    #[test]
    fn test_powers_of_two() {
        assert_eq!(round_up(4), 4);
        assert_eq!(round_up(5), 8);
        assert_eq!(round_up(8), 8);
        assert_eq!(round_up(9), 16);
        assert_eq!(round_up(1000), 1024);
        assert_eq!(round_up(1 << 20), 1 << 20);
        assert_eq!(round_up((1 << 20) + 1), 1 << 21);
    }

    #[test]
    fn test_upper_boundary() {
        assert_eq!(checked_round_up(MAX_SLAB_ITEMS), Some(MAX_SLAB_ITEMS));
        assert_eq!(checked_round_up((1 << 30) + 1), Some(MAX_SLAB_ITEMS));
        assert_eq!(checked_round_up(MAX_SLAB_ITEMS + 1), None);
        assert_eq!(checked_round_up(usize::MAX), None);
    }

    #[test]
    #[should_panic(expected = "maximum slab length")]
    fn test_round_up_overflow_panics() {
        round_up(MAX_SLAB_ITEMS + 1);
    }

    #[test]
    fn test_round_up_is_const() {
        const CAP: usize = round_up(17);
        assert_eq!(CAP, 32);
    }

    #[test]
    fn test_round_up_block() {
        // 8 byte header + 8 * 4 bytes = 40 -> 64 byte block -> 14 items
        assert_eq!(round_up_block::<i32>(5), 14);
        // 8 + 4 * 8 = 40 -> 64 -> 7 pointers
        assert_eq!(round_up_block::<*const crate::gc::ObjHeader>(4), 7);

        for n in 0..100 {
            let items = round_up_block::<u16>(n);
            assert!(items >= round_up(n));
            assert!((SLAB_HEADER_SIZE + items * 2).is_power_of_two());
        }
    }

    #[test]
    fn test_checked_round_up_block_bound() {
        assert_eq!(checked_round_up_block::<u8>(MAX_SLAB_ITEMS), Some(MAX_SLAB_ITEMS));
        assert_eq!(checked_round_up_block::<u8>(MAX_SLAB_ITEMS + 1), None);
        assert_eq!(checked_round_up_block::<u64>(usize::MAX), None);
    }
}
