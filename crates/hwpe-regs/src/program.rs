//! Micro-program layout.
//!
//! The sequencer inside the accelerator runs a 176-bit bytecode plus 48 bits
//! of loop bounds, spread over seven consecutive registers starting at
//! [`BYTECODE`](crate::regs::BYTECODE). The HAL treats the contents as
//! opaque; only the packing of BYTECODE5 and LOOPS0 into one word is fixed.

use crate::fields::{BYTECODE5_MASK, LOOPS0_MASK};
use crate::regs::bytecode::{
    BYTECODE0_OFFS, BYTECODE1_OFFS, BYTECODE2_OFFS, BYTECODE3_OFFS, BYTECODE4_OFFS,
    BYTECODE5_LOOPS0_OFFS, LOOPS1_OFFS, WORDS,
};

const OFFSETS: [usize; WORDS] = [
    BYTECODE0_OFFS,
    BYTECODE1_OFFS,
    BYTECODE2_OFFS,
    BYTECODE3_OFFS,
    BYTECODE4_OFFS,
    BYTECODE5_LOOPS0_OFFS,
    LOOPS1_OFFS,
];

/// Contents of the bytecode bank, in register order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroProgram {
    words: [u32; WORDS],
}

impl MicroProgram {
    /// Scalar-product MAC program used by the reference test bench.
    pub const MAC_SCALAR: Self = Self::from_words([
        0x11a1_2c05,
        0x0000_08cd,
        0x0000_0000,
        0x0000_0000,
        0x0000_0000,
        0x0004_0000,
        0x0000_0000,
    ]);

    /// Build from the seven raw register words (BYTECODE0 first).
    #[must_use]
    pub const fn from_words(words: [u32; WORDS]) -> Self {
        Self { words }
    }

    /// Raw register words, BYTECODE0 first.
    #[must_use]
    pub const fn words(&self) -> &[u32; WORDS] {
        &self.words
    }

    /// BYTECODE5, program bits [175:160].
    #[must_use]
    pub const fn bytecode5(&self) -> u16 {
        (self.words[5] & BYTECODE5_MASK) as u16
    }

    /// LOOPS0, loop bounds [15:0].
    #[must_use]
    pub const fn loops0(&self) -> u16 {
        ((self.words[5] & LOOPS0_MASK) >> 16) as u16
    }

    /// LOOPS1, loop bounds [47:16].
    #[must_use]
    pub const fn loops1(&self) -> u32 {
        self.words[6]
    }

    /// `(offset, value)` pairs relative to the bytecode bank, LOOPS1 first.
    ///
    /// The order matches how the reference bench programs the bank; any
    /// order is valid as long as it completes before TRIGGER.
    pub fn writes(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        OFFSETS.iter().copied().zip(self.words.iter().copied()).rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_scalar_fields() {
        let p = MicroProgram::MAC_SCALAR;
        assert_eq!(p.loops0(), 4);
        assert_eq!(p.bytecode5(), 0);
        assert_eq!(p.loops1(), 0);
        assert_eq!(p.words()[0], 0x11a1_2c05);
    }

    #[test]
    fn writes_cover_bank_in_reverse() {
        let writes: Vec<_> = MicroProgram::MAC_SCALAR.writes().collect();
        assert_eq!(writes.len(), WORDS);
        assert_eq!(writes[0], (LOOPS1_OFFS, 0));
        assert_eq!(writes[1], (BYTECODE5_LOOPS0_OFFS, 0x0004_0000));
        assert_eq!(writes[WORDS - 1], (BYTECODE0_OFFS, 0x11a1_2c05));
    }
}
