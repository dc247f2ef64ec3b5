//! Element types a slab can hold, and the scan tag each one implies

use std::ptr::NonNull;

use crate::gc::{HeapTag, ObjHeader};

/// Element type of a [`Slab`](super::Slab)
///
/// The tag is an associated constant, so every `Slab<T>` instantiation knows
/// at compile time whether the collector must trace it.
///
/// # Safety
/// - The all-zero bit pattern must be a valid `Self`; fresh slabs are
///   zero-filled.
/// - `align_of::<Self>()` must not exceed [`HEAP_ALIGN`](crate::gc::HEAP_ALIGN).
/// - If `TAG` is [`HeapTag::Scanned`], `Self` must be a thin pointer to an
///   [`ObjHeader`]. Non-null slots should hold the header of a heap block or
///   a global slab; arena addresses that do not start a block are ignored.
pub unsafe trait SlabItem: Copy + 'static {
    const TAG: HeapTag;
}

macro_rules! opaque_items {
    ($($ty:ty),* $(,)?) => {
        $(
            unsafe impl SlabItem for $ty {
                const TAG: HeapTag = HeapTag::Opaque;
            }
        )*
    };
}

opaque_items!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize, f32, f64, bool, char);

unsafe impl SlabItem for *const ObjHeader {
    const TAG: HeapTag = HeapTag::Scanned;
}

unsafe impl SlabItem for *mut ObjHeader {
    const TAG: HeapTag = HeapTag::Scanned;
}

unsafe impl SlabItem for Option<NonNull<ObjHeader>> {
    const TAG: HeapTag = HeapTag::Scanned;
}

/// The zero value every fresh slot holds
#[inline]
pub(crate) fn zeroed<T: SlabItem>() -> T {
    // SAFETY: SlabItem guarantees all-zero is a valid value
    unsafe { std::mem::zeroed() }
}
