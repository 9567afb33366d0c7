/*!
 * Bit Helpers
 * Power-of-two rounding and alignment
 */

use super::types::Size;

/// Round up to the next power of two (`0` rounds to `1`)
#[inline]
pub const fn round_up_pow2(value: Size) -> Size {
    if value <= 1 {
        return 1;
    }
    let mut v = value - 1;
    let mut shift = 1;
    while shift < Size::BITS {
        v |= v >> shift;
        shift <<= 1;
    }
    v + 1
}

/// Floor of log2, `value` must be non-zero
#[inline]
pub const fn log2(value: Size) -> u32 {
    Size::BITS - 1 - value.leading_zeros()
}

#[inline]
pub const fn is_pow2(value: Size) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Round `value` up to a multiple of `align` (a power of two)
#[inline]
pub const fn align_up(value: Size, align: Size) -> Size {
    (value + align - 1) & !(align - 1)
}
