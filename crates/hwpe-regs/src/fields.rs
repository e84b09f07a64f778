//! Packed bitfields.
//!
//! Two registers carry more than one field:
//!
//! ```text
//! SHIFT_SIMPLEMUL   [31:16] SHIFT      [0] SIMPLEMUL
//! BYTECODE5_LOOPS0  [31:16] LOOPS0  [15:0] BYTECODE5
//! ```

/// SHIFT field of `SHIFT_SIMPLEMUL`.
pub const SHIFT_MASK: u32 = 0xffff_0000;
/// SIMPLEMUL field of `SHIFT_SIMPLEMUL`.
pub const SIMPLEMUL_MASK: u32 = 0x0000_0001;
/// BYTECODE5 field of `BYTECODE5_LOOPS0`.
pub const BYTECODE5_MASK: u32 = 0x0000_ffff;
/// LOOPS0 field of `BYTECODE5_LOOPS0`.
pub const LOOPS0_MASK: u32 = 0xffff_0000;

/// Pack SHIFT and SIMPLEMUL into the `SHIFT_SIMPLEMUL` register word.
///
/// `shift` lands in bits [31:16], `simplemul` in bit 0.
#[must_use]
pub const fn shift_simplemul_value(shift: u16, simplemul: bool) -> u32 {
    ((shift as u32) << 16) | simplemul as u32
}

/// Split a `SHIFT_SIMPLEMUL` word back into its fields.
#[must_use]
pub const fn unpack_shift_simplemul(value: u32) -> (u16, bool) {
    ((value >> 16) as u16, value & SIMPLEMUL_MASK != 0)
}

/// Pack BYTECODE5 and LOOPS0 into the register word at `BYTECODE5_LOOPS0_OFFS`.
#[must_use]
pub const fn bytecode5_loops0_value(bytecode5: u16, loops0: u16) -> u32 {
    ((loops0 as u32) << 16) | bytecode5 as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_simplemul_all_values() {
        for shift in 0..=u16::MAX {
            for simplemul in [false, true] {
                let packed = shift_simplemul_value(shift, simplemul);
                assert_eq!(packed, (u32::from(shift) << 16) | u32::from(simplemul));
                assert_eq!(unpack_shift_simplemul(packed), (shift, simplemul));
            }
        }
    }

    #[test]
    fn fields_stay_in_masks() {
        let v = shift_simplemul_value(u16::MAX, true);
        assert_eq!(v & !(SHIFT_MASK | SIMPLEMUL_MASK), 0);
        let v = bytecode5_loops0_value(u16::MAX, u16::MAX);
        assert_eq!(v, BYTECODE5_MASK | LOOPS0_MASK);
    }

    #[test]
    fn reference_loops_word() {
        // LOOPS0 = 4, BYTECODE5 = 0
        assert_eq!(bytecode5_loops0_value(0, 4), 0x0004_0000);
    }

    #[test]
    fn only_bit_zero_is_simplemul() {
        assert_eq!(unpack_shift_simplemul(0x0000_00fe), (0, false));
        assert_eq!(unpack_shift_simplemul(0x0003_0001), (3, true));
    }
}
