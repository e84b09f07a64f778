//! Register map of the HWPE peripheral.
//!
//! The register file spans [`ADDR_SPACE`] bytes from the platform's HWPE base
//! address and is split into two banks:
//!
//! ```text
//! Control / generic configuration
//!   0x00 TRIGGER        write strobe: start the programmed job
//!   0x04 ACQUIRE        read: job id, or negative if no slot is free
//!   0x08 EVT_ENABLE     event enable mask
//!   0x0c STATUS         status bitmask
//!   0x10 RUNNING_JOB    id of the job being executed
//!   0x14 SOFT_CLEAR     write strobe: reset the engine
//!   0x20-0x30           BYTECODE0..4
//!   0x34                BYTECODE5 [15:0] / LOOPS0 [31:16]
//!   0x38                LOOPS1
//!
//! Job-dependent parameters
//!   0x40-0x4c           A/B/C/D_ADDR
//!   0x50 NB_ITER        number of iterations
//!   0x54 LEN_ITER       iteration length (minus one)
//!   0x58                SHIFT [31:16] / SIMPLEMUL [0]
//!   0x5c VECTSTRIDE     per-iteration stride of the input streams
//!   0x60 VECTSTRIDE2    per-iteration stride of the output streams
//! ```

/// Size of the register window in bytes.
pub const ADDR_SPACE: usize = 0x100;

// ── Control bank ─────────────────────────────────────────────────────────────

/// Write strobe: the engine starts consuming the register bank.
pub const TRIGGER: usize = 0x00;
/// Read: job handle, or a negative value if no job slot is available.
pub const ACQUIRE: usize = 0x04;
/// Event / interrupt enable mask (opaque).
pub const EVT_ENABLE: usize = 0x08;
/// Status bitmask (opaque).
pub const STATUS: usize = 0x0c;
/// Id of the job currently running.
pub const RUNNING_JOB: usize = 0x10;
/// Write strobe: reset the engine's internal state.
pub const SOFT_CLEAR: usize = 0x14;

/// Base of the bytecode bank. Bytecode setters take offsets relative to this.
pub const BYTECODE: usize = 0x20;

/// Offsets inside the bytecode bank, relative to [`BYTECODE`].
pub mod bytecode {
    /// BYTECODE0, program bits [31:0].
    pub const BYTECODE0_OFFS: usize = 0x00;
    /// BYTECODE1, program bits [63:32].
    pub const BYTECODE1_OFFS: usize = 0x04;
    /// BYTECODE2, program bits [95:64].
    pub const BYTECODE2_OFFS: usize = 0x08;
    /// BYTECODE3, program bits [127:96].
    pub const BYTECODE3_OFFS: usize = 0x0c;
    /// BYTECODE4, program bits [159:128].
    pub const BYTECODE4_OFFS: usize = 0x10;
    /// BYTECODE5 in [15:0], LOOPS0 in [31:16].
    pub const BYTECODE5_LOOPS0_OFFS: usize = 0x14;
    /// LOOPS1, loop bounds [47:16].
    pub const LOOPS1_OFFS: usize = 0x18;

    /// Number of 32-bit words in the bytecode bank.
    pub const WORDS: usize = 7;
}

// ── Job-parameter bank ───────────────────────────────────────────────────────

/// Base address of operand stream A.
pub const A_ADDR: usize = 0x40;
/// Base address of operand stream B.
pub const B_ADDR: usize = 0x44;
/// Base address of operand stream C.
pub const C_ADDR: usize = 0x48;
/// Base address of output stream D.
pub const D_ADDR: usize = 0x4c;
/// Number of iterations.
pub const NB_ITER: usize = 0x50;
/// Length of one iteration, minus one.
pub const LEN_ITER: usize = 0x54;
/// SHIFT in [31:16], SIMPLEMUL in [0].
pub const SHIFT_SIMPLEMUL: usize = 0x58;
/// Per-iteration byte stride of the A/B streams.
pub const VECTSTRIDE: usize = 0x5c;
/// Per-iteration byte stride of the C/D streams.
pub const VECTSTRIDE2: usize = 0x60;

/// Number of 32-bit slots in the register window.
pub const REG_SLOTS: usize = ADDR_SPACE / 4;

/// Every named register, in offset order.
pub const ALL: [(usize, &str); 22] = [
    (TRIGGER, "TRIGGER"),
    (ACQUIRE, "ACQUIRE"),
    (EVT_ENABLE, "EVT_ENABLE"),
    (STATUS, "STATUS"),
    (RUNNING_JOB, "RUNNING_JOB"),
    (SOFT_CLEAR, "SOFT_CLEAR"),
    (BYTECODE + bytecode::BYTECODE0_OFFS, "BYTECODE0"),
    (BYTECODE + bytecode::BYTECODE1_OFFS, "BYTECODE1"),
    (BYTECODE + bytecode::BYTECODE2_OFFS, "BYTECODE2"),
    (BYTECODE + bytecode::BYTECODE3_OFFS, "BYTECODE3"),
    (BYTECODE + bytecode::BYTECODE4_OFFS, "BYTECODE4"),
    (BYTECODE + bytecode::BYTECODE5_LOOPS0_OFFS, "BYTECODE5_LOOPS0"),
    (BYTECODE + bytecode::LOOPS1_OFFS, "LOOPS1"),
    (A_ADDR, "A_ADDR"),
    (B_ADDR, "B_ADDR"),
    (C_ADDR, "C_ADDR"),
    (D_ADDR, "D_ADDR"),
    (NB_ITER, "NB_ITER"),
    (LEN_ITER, "LEN_ITER"),
    (SHIFT_SIMPLEMUL, "SHIFT_SIMPLEMUL"),
    (VECTSTRIDE, "VECTSTRIDE"),
    (VECTSTRIDE2, "VECTSTRIDE2"),
];

/// Register name for an offset, if the offset names a register.
#[must_use]
pub fn name(offset: usize) -> Option<&'static str> {
    ALL.iter().find(|(o, _)| *o == offset).map(|(_, n)| *n)
}

/// True for registers software may only read.
#[must_use]
pub const fn is_read_only(offset: usize) -> bool {
    matches!(offset, ACQUIRE | STATUS | RUNNING_JOB)
}

/// Interpretation of raw ACQUIRE reads.
pub mod acquire {
    /// Reinterpret the raw register word as the signed handle the HAL returns.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_handle(raw: u32) -> i32 {
        raw as i32
    }

    /// True if the read granted a job slot (non-negative handle).
    #[must_use]
    pub const fn is_granted(raw: u32) -> bool {
        as_handle(raw) >= 0
    }

    /// Raw value the engine returns when every slot is taken.
    pub const NO_SLOT: u32 = u32::MAX;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_aligned_and_in_window() {
        for (offset, name) in ALL {
            assert_eq!(offset % 4, 0, "{name} misaligned");
            assert!(offset < ADDR_SPACE, "{name} outside window");
        }
    }

    #[test]
    fn offsets_unique() {
        for (i, (a, _)) in ALL.iter().enumerate() {
            for (b, _) in &ALL[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn documented_layout() {
        assert_eq!(BYTECODE + bytecode::BYTECODE5_LOOPS0_OFFS, 0x34);
        assert_eq!(BYTECODE + bytecode::LOOPS1_OFFS, 0x38);
        assert_eq!(SHIFT_SIMPLEMUL, 0x58);
        assert_eq!(VECTSTRIDE2, 0x60);
        assert_eq!(REG_SLOTS, 64);
    }

    #[test]
    fn names_resolve() {
        assert_eq!(name(ACQUIRE), Some("ACQUIRE"));
        assert_eq!(name(0x38), Some("LOOPS1"));
        assert_eq!(name(0x18), None);
    }

    #[test]
    fn acquire_sign() {
        assert!(acquire::is_granted(0));
        assert!(acquire::is_granted(7));
        assert!(!acquire::is_granted(acquire::NO_SLOT));
        assert!(!acquire::is_granted(0x8000_0000));
        assert_eq!(acquire::as_handle(acquire::NO_SLOT), -1);
    }

    #[test]
    fn read_only_registers() {
        assert!(is_read_only(ACQUIRE));
        assert!(is_read_only(STATUS));
        assert!(!is_read_only(TRIGGER));
        assert!(!is_read_only(A_ADDR));
    }
}
