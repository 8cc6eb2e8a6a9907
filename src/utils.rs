//! Page-granularity math shared by the range space and the manager.

/// Page shift used throughout the crate (4 KiB pages).
pub const PAGE_SHIFT: u32 = 12;

/// Page size in bytes.
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

#[must_use]
pub const fn pages_to_bytes(pages: u64) -> u64 {
    pages << PAGE_SHIFT
}

/// Convert a byte count to pages, rounding up.
#[must_use]
pub const fn bytes_to_pages(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}

/// Round `val` up to the next multiple of `align`. `align == 0` is treated as 1.
#[must_use]
pub const fn align_up(val: u64, align: u64) -> u64 {
    if align <= 1 {
        return val;
    }
    let rem = val % align;
    if rem == 0 { val } else { val + (align - rem) }
}

/// Round `val` down to a multiple of `align`. `align == 0` is treated as 1.
#[must_use]
pub const fn align_down(val: u64, align: u64) -> u64 {
    if align <= 1 {
        return val;
    }
    val - (val % align)
}

/// Largest power of two less than or equal to `n`. `n` must be non-zero.
#[must_use]
pub const fn prev_power_of_two(n: u64) -> u64 {
    debug_assert!(n != 0);
    1u64 << (63 - n.leading_zeros())
}
