//! Register-level HAL
//!
//! One method per register accessor. Setters perform exactly one write,
//! getters exactly one read; nothing is cached or validated. Ordering rules
//! (bytecode and job parameters before TRIGGER) are the caller's concern,
//! or use the typestate API in [`crate::job`] which enforces them.

use crate::backend::HwpeBackend;
use crate::error::Result;
use hwpe_regs::regs::{self, acquire};
use hwpe_regs::MicroProgram;
use std::time::Duration;

/// Handle over the accelerator's register window
#[derive(Debug)]
pub struct Hwpe<B: HwpeBackend> {
    backend: B,
}

impl<B: HwpeBackend> Hwpe<B> {
    /// Wrap a backend
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Borrow the backend
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Borrow the backend mutably
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Release the backend
    pub fn into_inner(self) -> B {
        self.backend
    }

    #[inline]
    fn write(&mut self, offset: usize, value: u32) {
        tracing::trace!(
            "write {} = {value:#010x}",
            regs::name(offset).unwrap_or("?")
        );
        self.backend.write32(offset, value);
    }

    #[inline]
    fn read(&mut self, offset: usize) -> u32 {
        let value = self.backend.read32(offset);
        tracing::trace!("read {} = {value:#010x}", regs::name(offset).unwrap_or("?"));
        value
    }

    // ── Bytecode bank ────────────────────────────────────────────────────────

    /// Write one bytecode-bank word; `offs` is relative to `BYTECODE`.
    pub fn bytecode_set(&mut self, offs: usize, value: u32) {
        self.write(regs::BYTECODE + offs, value);
    }

    /// Write the whole bytecode bank, LOOPS1 first.
    pub fn load_program(&mut self, program: &MicroProgram) {
        for (offs, value) in program.writes() {
            self.bytecode_set(offs, value);
        }
    }

    // ── Job parameters ───────────────────────────────────────────────────────

    /// Set the base address of stream A.
    pub fn a_addr_set(&mut self, value: u32) {
        self.write(regs::A_ADDR, value);
    }

    /// Set the base address of stream B.
    pub fn b_addr_set(&mut self, value: u32) {
        self.write(regs::B_ADDR, value);
    }

    /// Set the base address of stream C.
    pub fn c_addr_set(&mut self, value: u32) {
        self.write(regs::C_ADDR, value);
    }

    /// Set the base address of stream D.
    pub fn d_addr_set(&mut self, value: u32) {
        self.write(regs::D_ADDR, value);
    }

    /// Set the iteration count.
    pub fn nb_iter_set(&mut self, value: u32) {
        self.write(regs::NB_ITER, value);
    }

    /// Set the iteration length (minus one).
    pub fn len_iter_set(&mut self, value: u32) {
        self.write(regs::LEN_ITER, value);
    }

    /// Set the packed SHIFT/SIMPLEMUL word, see [`hwpe_regs::shift_simplemul_value`].
    pub fn shift_simplemul_set(&mut self, value: u32) {
        self.write(regs::SHIFT_SIMPLEMUL, value);
    }

    /// Set the A/B stride.
    pub fn vectstride_set(&mut self, value: u32) {
        self.write(regs::VECTSTRIDE, value);
    }

    /// Set the C/D stride.
    pub fn vectstride2_set(&mut self, value: u32) {
        self.write(regs::VECTSTRIDE2, value);
    }

    // ── Control ──────────────────────────────────────────────────────────────

    /// Set the event enable mask.
    pub fn evt_enable_set(&mut self, value: u32) {
        self.write(regs::EVT_ENABLE, value);
    }

    /// Start the job; the engine consumes the register bank as it is now.
    pub fn trigger_job(&mut self) {
        self.write(regs::TRIGGER, 0);
    }

    /// Try to take a job slot: non-negative handle, or negative if none is free.
    pub fn acquire_job(&mut self) -> i32 {
        acquire::as_handle(self.read(regs::ACQUIRE))
    }

    /// Raw STATUS bitmask.
    pub fn get_status(&mut self) -> u32 {
        self.read(regs::STATUS)
    }

    /// Id of the job the engine is running.
    pub fn running_job(&mut self) -> u32 {
        self.read(regs::RUNNING_JOB)
    }

    /// Reset the engine's internal state.
    pub fn soft_clear(&mut self) {
        self.write(regs::SOFT_CLEAR, 0);
    }

    /// Ungate the peripheral clock.
    pub fn cg_enable(&mut self) {
        self.backend.set_clock_gate(true);
    }

    /// Gate the peripheral clock.
    pub fn cg_disable(&mut self) {
        self.backend.set_clock_gate(false);
    }

    /// Block until the completion event; `None` waits forever.
    ///
    /// # Errors
    ///
    /// Returns error if the backend's wait fails or times out.
    pub fn wait_event(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.backend.wait_event(timeout)
    }
}
