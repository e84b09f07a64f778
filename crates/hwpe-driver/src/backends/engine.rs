//! Multiply-accumulate datapath of the virtual HWPE
//!
//! For iteration `k` of `nb_iter`, with `len = len_iter + 1` elements and
//! A/B element `j` at `base + k·vectstride + 4·j`:
//!
//! ```text
//! scalar product   D[k]     = C[k] + Σ_j (A·B >> shift)
//! simple multiply  D[k][j]  =         (A·B >> shift)
//! ```
//!
//! Operands are signed 32-bit words, products are formed in 64 bits and
//! shifted arithmetically, sums wrap at 32 bits. C/D advance by
//! `vectstride2` per iteration, or by their natural size when it is zero.

use crate::backend::SystemMemory;
use crate::error::Result;
use hwpe_regs::fields::unpack_shift_simplemul;
use hwpe_regs::regs;
use hwpe_regs::MicroProgram;

/// Register bank as latched by TRIGGER
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRegisters {
    /// Bytecode bank
    pub program: MicroProgram,
    /// Stream A base
    pub a_addr: u32,
    /// Stream B base
    pub b_addr: u32,
    /// Stream C base
    pub c_addr: u32,
    /// Stream D base
    pub d_addr: u32,
    /// Iteration count
    pub nb_iter: u32,
    /// Iteration length minus one
    pub len_iter: u32,
    /// Product shift
    pub shift: u16,
    /// Element-wise mode
    pub simplemul: bool,
    /// A/B stride
    pub vectstride: u32,
    /// C/D stride, zero for natural
    pub vectstride2: u32,
}

impl JobRegisters {
    /// Latch the job-relevant words out of a register file image
    pub fn capture(file: &[u32; regs::REG_SLOTS]) -> Self {
        let at = |offset: usize| file[offset / 4];
        let mut words = [0u32; regs::bytecode::WORDS];
        for (i, w) in words.iter_mut().enumerate() {
            *w = at(regs::BYTECODE + i * 4);
        }
        let (shift, simplemul) = unpack_shift_simplemul(at(regs::SHIFT_SIMPLEMUL));
        Self {
            program: MicroProgram::from_words(words),
            a_addr: at(regs::A_ADDR),
            b_addr: at(regs::B_ADDR),
            c_addr: at(regs::C_ADDR),
            d_addr: at(regs::D_ADDR),
            nb_iter: at(regs::NB_ITER),
            len_iter: at(regs::LEN_ITER),
            shift,
            simplemul,
            vectstride: at(regs::VECTSTRIDE),
            vectstride2: at(regs::VECTSTRIDE2),
        }
    }
}

#[inline]
#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn product(a: u32, b: u32, shift: u16) -> u32 {
    let p = i64::from(a as i32) * i64::from(b as i32);
    (p >> shift.min(63)) as i32 as u32
}

/// Run one job against `mem`; returns the number of words written to D
///
/// # Errors
///
/// Returns error if any stream touches memory outside the simulated regions.
pub fn execute(job: &JobRegisters, mem: &mut impl SystemMemory) -> Result<usize> {
    let len = job.len_iter.wrapping_add(1);
    let natural = if job.simplemul { len.wrapping_mul(4) } else { 4 };
    let out_stride = if job.vectstride2 == 0 { natural } else { job.vectstride2 };
    let mut written = 0;

    for k in 0..job.nb_iter {
        let ab = k.wrapping_mul(job.vectstride);
        let cd = k.wrapping_mul(out_stride);
        let mut acc = 0u32;

        for j in 0..len {
            let off = ab.wrapping_add(j.wrapping_mul(4));
            let a = mem.read_word(job.a_addr.wrapping_add(off))?;
            let b = mem.read_word(job.b_addr.wrapping_add(off))?;
            let p = product(a, b, job.shift);

            if job.simplemul {
                mem.write_word(job.d_addr.wrapping_add(cd).wrapping_add(j.wrapping_mul(4)), p)?;
                written += 1;
            } else {
                acc = acc.wrapping_add(p);
            }
        }

        if !job.simplemul {
            let c = mem.read_word(job.c_addr.wrapping_add(cd))?;
            mem.write_word(job.d_addr.wrapping_add(cd), c.wrapping_add(acc))?;
            written += 1;
        }
    }

    tracing::debug!(
        "MacEngine: {} iterations x {len}, {written} words out",
        job.nb_iter
    );
    Ok(written)
}
