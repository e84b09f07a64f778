//! MAC test bench
//!
//! The full acquire → program → trigger → wait → verify sequence:
//!
//! 1. Place the four stimulus buffers in data memory
//! 2. Ungate the clock and spin for a job slot
//! 3. Program the micro-program and job registers, then TRIGGER
//! 4. Block on the completion event and gate the clock again
//! 5. Read D back, compare it with the golden words, and publish the error
//!    count on the side-channel word
//!
//! A verification mismatch is counted, never retried. Everything else
//! (no slot, no completion event, a fault in data memory) is an error.

use crate::backend::Platform;
use crate::backends::engine::product;
use crate::backends::software::{L2_BASE, RESULT_ADDR};
use crate::error::{HwpeError, Result};
use crate::hal::Hwpe;
use crate::job::{CompletedJob, JobParams};
use crate::verify::{verify_words, Verification};
use crate::wait::{CancelToken, PollConfig};
use hwpe_regs::MicroProgram;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Golden output of the reference MAC job.
pub const REFERENCE_GOLDEN: [u32; 4] = [0x7f22_8fd6, 0x23a7_d5c2, 0x7f28_1848, 0x6127_d834];

/// Alignment of each buffer placed by the bench.
const BUFFER_ALIGN: u32 = 16;

// ── Shape ────────────────────────────────────────────────────────────────────

/// Iteration shape and arithmetic mode of the bench job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchShape {
    /// Number of iterations
    pub nb_iter: u32,
    /// Elements per iteration, minus one
    pub len_iter: u32,
    /// Product shift
    pub shift: u16,
    /// Element-wise multiply instead of scalar product
    pub simplemul: bool,
}

impl Default for BenchShape {
    /// Four 32-element scalar products, no shift.
    fn default() -> Self {
        Self {
            nb_iter: 4,
            len_iter: 32 - 1,
            shift: 0,
            simplemul: false,
        }
    }
}

impl BenchShape {
    /// Elements per iteration
    pub const fn len(&self) -> usize {
        self.len_iter as usize + 1
    }

    /// Words in each of the A and B streams
    pub const fn input_words(&self) -> usize {
        self.nb_iter as usize * self.len()
    }

    /// Words in the C stream
    pub const fn bias_words(&self) -> usize {
        if self.simplemul {
            0
        } else {
            self.nb_iter as usize
        }
    }

    /// Words the job writes to D
    pub const fn output_words(&self) -> usize {
        if self.simplemul {
            self.input_words()
        } else {
            self.nb_iter as usize
        }
    }

    /// A/B stride between iterations in bytes
    pub const fn vectstride(&self) -> u32 {
        (self.len_iter + 1) * 4
    }
}

// ── Stimuli ──────────────────────────────────────────────────────────────────

/// Contents of the four operand buffers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stimuli {
    /// Stream A
    pub a: Vec<u32>,
    /// Stream B
    pub b: Vec<u32>,
    /// Stream C
    pub c: Vec<u32>,
    /// Initial contents of the output buffer D
    pub d: Vec<u32>,
}

impl Stimuli {
    /// Deterministic stimuli whose scalar-product output is `golden`
    ///
    /// A and B are pseudo-random; C is solved per iteration so that
    /// `C[k] + Σ A·B >> shift` lands on `golden[k]`.
    ///
    /// # Errors
    ///
    /// Returns error for element-wise shapes or when `golden` does not have
    /// one word per iteration.
    pub fn synthesize(seed: u64, shape: &BenchShape, golden: &[u32]) -> Result<Self> {
        if shape.simplemul {
            return Err(HwpeError::invalid_config(
                "synthesized stimuli need a scalar-product shape",
            ));
        }
        if golden.len() != shape.nb_iter as usize {
            return Err(HwpeError::invalid_config(format!(
                "{} golden words for {} iterations",
                golden.len(),
                shape.nb_iter
            )));
        }

        let mut rng = Xoshiro::new(seed);
        let n = shape.input_words();
        let a: Vec<u32> = (0..n).map(|_| rng.next_u32()).collect();
        let b: Vec<u32> = (0..n).map(|_| rng.next_u32()).collect();

        let c = golden
            .iter()
            .enumerate()
            .map(|(k, &gold)| {
                let row = k * shape.len()..(k + 1) * shape.len();
                let acc = a[row.clone()]
                    .iter()
                    .zip(&b[row])
                    .fold(0u32, |acc, (&x, &y)| acc.wrapping_add(product(x, y, shape.shift)));
                gold.wrapping_sub(acc)
            })
            .collect();

        debug!("Synthesized stimuli: seed={seed:#x}, {n} words per input stream");
        Ok(Self {
            a,
            b,
            c,
            d: vec![0; shape.output_words()],
        })
    }

    /// Load `a.bin`, `b.bin`, `c.bin` and optionally `d.bin` from `dir`
    ///
    /// Files hold little-endian 32-bit words. A missing `d.bin` yields an
    /// empty output buffer, which the bench zero-fills.
    ///
    /// # Errors
    ///
    /// Returns error if a required file is missing or not a whole number of words.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let d_path = dir.join("d.bin");
        let d = if d_path.exists() {
            read_words(&d_path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            a: read_words(&dir.join("a.bin"))?,
            b: read_words(&dir.join("b.bin"))?,
            c: read_words(&dir.join("c.bin"))?,
            d,
        })
    }

    /// Check the buffers are large enough for `shape`
    ///
    /// # Errors
    ///
    /// Returns error naming the first buffer that is too short.
    pub fn check(&self, shape: &BenchShape) -> Result<()> {
        let need = [
            ("A", self.a.len(), shape.input_words()),
            ("B", self.b.len(), shape.input_words()),
            ("C", self.c.len(), shape.bias_words()),
        ];
        for (name, have, want) in need {
            if have < want {
                return Err(HwpeError::invalid_config(format!(
                    "stream {name} has {have} words, job reads {want}"
                )));
            }
        }
        Ok(())
    }
}

fn read_words(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(HwpeError::invalid_config(format!(
            "{}: {} bytes is not a whole number of words",
            path.display(),
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect())
}

/// xoshiro256++ generator for reproducible stimuli
struct Xoshiro {
    s: [u64; 4],
}

impl Xoshiro {
    fn new(seed: u64) -> Self {
        let s = [
            seed ^ 0x9e37_79b9_7f4a_7c15,
            seed.wrapping_add(0x6c62_272e_07bb_0142),
            seed.rotate_left(17),
            seed.rotate_right(5),
        ];
        let mut rng = Self { s };
        for _ in 0..20 {
            let _ = rng.next_u64();
        }
        rng
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        result
    }

    #[allow(clippy::cast_possible_truncation)]
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }
}

// ── Layout ───────────────────────────────────────────────────────────────────

/// Bus addresses of the four buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAddrs {
    /// Stream A
    pub a: u32,
    /// Stream B
    pub b: u32,
    /// Stream C
    pub c: u32,
    /// Stream D
    pub d: u32,
    /// First byte past D
    pub end: u32,
}

impl BufferAddrs {
    /// Pack the buffers back to back from `base`, each 16-byte aligned
    ///
    /// # Errors
    ///
    /// Returns error if the buffers would run past the 32-bit address space.
    pub fn pack(base: u32, stimuli: &Stimuli, shape: &BenchShape) -> Result<Self> {
        let overflow = || HwpeError::invalid_config("stimuli do not fit below 4 GiB");
        let bytes = |words: usize| u32::try_from(words * 4).map_err(|_| overflow());
        let next = |at: u32, words: usize| -> Result<u32> {
            let end = at.checked_add(bytes(words)?).ok_or_else(overflow)?;
            end.checked_add(BUFFER_ALIGN - 1)
                .map(|e| e & !(BUFFER_ALIGN - 1))
                .ok_or_else(overflow)
        };

        let a = base.checked_add(BUFFER_ALIGN - 1).ok_or_else(overflow)? & !(BUFFER_ALIGN - 1);
        let b = next(a, stimuli.a.len())?;
        let c = next(b, stimuli.b.len())?;
        let d = next(c, stimuli.c.len())?;
        let end = next(d, stimuli.d.len().max(shape.output_words()))?;
        Ok(Self { a, b, c, d, end })
    }
}

// ── Bench ────────────────────────────────────────────────────────────────────

/// Everything the bench needs besides the platform and stimuli
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Micro-program loaded into the bytecode bank
    pub program: MicroProgram,
    /// Iteration shape
    pub shape: BenchShape,
    /// Expected leading output words
    pub golden: Vec<u32>,
    /// Where buffer placement starts
    pub data_base: u32,
    /// Side-channel word receiving the error count, if any
    pub result_addr: Option<u32>,
    /// Polling for the job-slot spin
    pub acquire_poll: PollConfig,
    /// Bound on the completion wait; `None` waits forever
    pub completion_timeout: Option<Duration>,
    /// Aborts the job-slot spin
    pub cancel: CancelToken,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            program: MicroProgram::MAC_SCALAR,
            shape: BenchShape::default(),
            golden: REFERENCE_GOLDEN.to_vec(),
            data_base: L2_BASE,
            result_addr: Some(RESULT_ADDR),
            acquire_poll: PollConfig::default(),
            completion_timeout: None,
            cancel: CancelToken::new(),
        }
    }
}

/// Outcome of one bench run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchReport {
    /// Handle ACQUIRE granted
    pub job_id: i32,
    /// Where the buffers were placed
    pub addrs: BufferAddrs,
    /// Output words read back from D
    pub output: Vec<u32>,
    /// Golden comparison
    pub verification: Verification,
    /// TRIGGER to completion
    pub elapsed: Duration,
}

impl BenchReport {
    /// Mismatching output words
    pub fn error_count(&self) -> usize {
        self.verification.error_count()
    }

    /// Process exit code: the error count, saturated
    pub fn exit_code(&self) -> i32 {
        i32::try_from(self.error_count()).unwrap_or(i32::MAX)
    }
}

/// Drives one MAC job and checks its output
#[derive(Debug, Clone, Default)]
pub struct TestBench {
    config: BenchConfig,
}

impl TestBench {
    /// Create a bench from its configuration
    pub const fn new(config: BenchConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub const fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Job parameters for buffers placed at `addrs`
    pub const fn job_params(&self, addrs: &BufferAddrs) -> JobParams {
        let shape = &self.config.shape;
        JobParams {
            a_addr: addrs.a,
            b_addr: addrs.b,
            c_addr: addrs.c,
            d_addr: addrs.d,
            nb_iter: shape.nb_iter,
            len_iter: shape.len_iter,
            shift: shape.shift,
            simplemul: shape.simplemul,
            vectstride: shape.vectstride(),
            vectstride2: None,
        }
    }

    /// Run the full sequence on `hwpe`
    ///
    /// # Errors
    ///
    /// Returns error if the stimuli do not fit the shape or the memory, the
    /// slot spin or completion wait fails, or the side-channel write faults.
    /// Output mismatches are not errors; they are counted in the report.
    pub fn run<P: Platform>(&self, hwpe: &mut Hwpe<P>, stimuli: &Stimuli) -> Result<BenchReport> {
        let cfg = &self.config;
        stimuli.check(&cfg.shape)?;

        let addrs = BufferAddrs::pack(cfg.data_base, stimuli, &cfg.shape)?;
        let mem = hwpe.backend_mut();
        mem.write_words(addrs.a, &stimuli.a)?;
        mem.write_words(addrs.b, &stimuli.b)?;
        mem.write_words(addrs.c, &stimuli.c)?;
        let mut d_init = stimuli.d.clone();
        d_init.resize(d_init.len().max(cfg.shape.output_words()), 0);
        mem.write_words(addrs.d, &d_init)?;
        debug!(
            "Buffers: A={:#x} B={:#x} C={:#x} D={:#x}",
            addrs.a, addrs.b, addrs.c, addrs.d
        );

        hwpe.cg_enable();
        let job = self.execute(hwpe, &addrs);
        hwpe.cg_disable();
        let (job_id, done) = job?;

        let mut output = vec![0u32; cfg.shape.output_words().max(cfg.golden.len())];
        hwpe.backend_mut().read_words(addrs.d, &mut output)?;
        let verification = verify_words(&output, &cfg.golden);

        if let Some(addr) = cfg.result_addr {
            let count = u32::try_from(verification.error_count()).unwrap_or(u32::MAX);
            hwpe.backend_mut().write_word(addr, count)?;
        }

        if verification.passed() {
            info!("Job {job_id}: {} golden words match", verification.checked);
        } else {
            warn!(
                "Job {job_id}: {} of {} golden words mismatch",
                verification.error_count(),
                verification.checked
            );
        }

        Ok(BenchReport {
            job_id,
            addrs,
            output,
            verification,
            elapsed: done.elapsed,
        })
    }

    /// Acquire, program, trigger and wait; the clock is the caller's concern.
    fn execute<P: Platform>(
        &self,
        hwpe: &mut Hwpe<P>,
        addrs: &BufferAddrs,
    ) -> Result<(i32, CompletedJob)> {
        let cfg = &self.config;
        let slot = hwpe.acquire(&cfg.acquire_poll, &cfg.cancel)?;
        let job_id = slot.id();
        let done = slot
            .program(&cfg.program, &self.job_params(addrs))?
            .trigger()
            .wait(cfg.completion_timeout)?;
        Ok((job_id, done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shape_matches_reference() {
        let s = BenchShape::default();
        assert_eq!(s.len(), 32);
        assert_eq!(s.vectstride(), 32 * 4);
        assert_eq!(s.input_words(), 128);
        assert_eq!(s.output_words(), 4);
    }

    #[test]
    fn synthesized_bias_solves_golden() {
        let shape = BenchShape::default();
        let st = Stimuli::synthesize(7, &shape, &REFERENCE_GOLDEN).unwrap();
        for (k, &gold) in REFERENCE_GOLDEN.iter().enumerate() {
            let acc = (0..shape.len())
                .map(|j| k * shape.len() + j)
                .fold(0u32, |acc, i| acc.wrapping_add(product(st.a[i], st.b[i], 0)));
            assert_eq!(st.c[k].wrapping_add(acc), gold);
        }
    }

    #[test]
    fn synthesis_is_deterministic() {
        let shape = BenchShape::default();
        let x = Stimuli::synthesize(1, &shape, &REFERENCE_GOLDEN).unwrap();
        let y = Stimuli::synthesize(1, &shape, &REFERENCE_GOLDEN).unwrap();
        let z = Stimuli::synthesize(2, &shape, &REFERENCE_GOLDEN).unwrap();
        assert_eq!(x, y);
        assert_ne!(x.a, z.a);
    }

    #[test]
    fn synthesis_rejects_wrong_golden_length() {
        let shape = BenchShape::default();
        assert!(Stimuli::synthesize(1, &shape, &REFERENCE_GOLDEN[..3]).is_err());
        let sm = BenchShape { simplemul: true, ..shape };
        assert!(Stimuli::synthesize(1, &sm, &REFERENCE_GOLDEN).is_err());
    }

    #[test]
    fn short_stream_rejected() {
        let shape = BenchShape::default();
        let mut st = Stimuli::synthesize(3, &shape, &REFERENCE_GOLDEN).unwrap();
        st.b.truncate(10);
        assert!(matches!(st.check(&shape), Err(HwpeError::InvalidConfig { .. })));
    }

    #[test]
    fn buffers_packed_and_aligned() {
        let shape = BenchShape::default();
        let st = Stimuli::synthesize(3, &shape, &REFERENCE_GOLDEN).unwrap();
        let addrs = BufferAddrs::pack(0x1c00_0004, &st, &shape).unwrap();
        assert_eq!(addrs.a, 0x1c00_0010);
        assert_eq!(addrs.b, addrs.a + 128 * 4);
        assert_eq!(addrs.c, addrs.b + 128 * 4);
        assert_eq!(addrs.d, addrs.c + 16);
        assert_eq!(addrs.end, addrs.d + 16);
        assert!(BufferAddrs::pack(0xffff_ff00, &st, &shape).is_err());
    }

    #[test]
    fn stimuli_files_round_trip() {
        let dir = std::env::temp_dir().join(format!("hwpe-stim-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let words = |v: &[u32]| v.iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<u8>>();
        std::fs::write(dir.join("a.bin"), words(&[1, 2])).unwrap();
        std::fs::write(dir.join("b.bin"), words(&[3, 4])).unwrap();
        std::fs::write(dir.join("c.bin"), words(&[5])).unwrap();

        let st = Stimuli::from_dir(&dir).unwrap();
        assert_eq!(st.a, vec![1, 2]);
        assert_eq!(st.c, vec![5]);
        assert!(st.d.is_empty());

        std::fs::write(dir.join("c.bin"), [0u8; 3]).unwrap();
        assert!(Stimuli::from_dir(&dir).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn exit_code_is_error_count() {
        let report = BenchReport {
            job_id: 0,
            addrs: BufferAddrs { a: 0, b: 0, c: 0, d: 0, end: 0 },
            output: vec![0; 4],
            verification: verify_words(&[0; 4], &REFERENCE_GOLDEN),
            elapsed: Duration::ZERO,
        };
        assert_eq!(report.exit_code(), 4);
    }
}
