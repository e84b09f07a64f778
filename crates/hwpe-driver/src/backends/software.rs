//! Software (virtual HWPE) backend
//!
//! Implements [`HwpeBackend`] and [`SystemMemory`] in plain Rust so the full
//! acquire → program → trigger → wait → verify sequence runs without
//! hardware. This enables:
//!
//! 1. **CI without hardware**: the test bench and the typestate job API are
//!    exercised end to end against the same register contract.
//!
//! 2. **Ordering checks**: every register write is logged, so tests can
//!    assert that TRIGGER comes after the bank is programmed.
//!
//! 3. **Stall injection**: a configurable number of ACQUIRE reads return
//!    "no slot" before a grant, to exercise the acquire spin.
//!
//! ## Engine model
//!
//! ```text
//! Free ──ACQUIRE read──▶ Held ──TRIGGER──▶ Running ──completion wait──▶ Free
//!   ▲                                                                     │
//!   └───────────────────────────── SOFT_CLEAR ────────────────────────────┘
//! ```
//!
//! There is a single job context. The datapath ([`engine`](super::engine))
//! runs when the host waits for the completion event, which stands in for
//! the interrupt; STATUS reads non-zero from TRIGGER until then.

use super::engine::{self, JobRegisters};
use super::memory::SimMemory;
use crate::backend::{BackendType, HwpeBackend, SystemMemory};
use crate::error::{HwpeError, Result};
use hwpe_regs::regs::{self, acquire};
use std::time::Duration;
use tracing::{debug, info, warn};

/// L2 data window of the default simulated platform.
pub const L2_BASE: u32 = 0x1c00_0000;
/// Size of the default L2 window in bytes.
pub const L2_SIZE: usize = 0x1_0000;
/// Side-channel word a simulation harness reads the error count from.
pub const RESULT_ADDR: u32 = 0x8000_0000;
/// Size of the side-channel window in bytes.
pub const RESULT_SIZE: usize = 0x10;

/// STATUS value while a job is running.
pub const STATUS_BUSY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Free,
    Held,
    Running(JobRegisters),
}

/// Virtual HWPE
#[derive(Debug)]
pub struct SoftwareHwpe {
    regs: [u32; regs::REG_SLOTS],
    memory: SimMemory,
    slot: Slot,
    next_job: u8,
    job_id: u8,
    grant_latency: u32,
    denials_left: u32,
    acquire_reads: usize,
    write_log: Vec<(usize, u32)>,
    clock_enabled: bool,
    completed: u32,
}

impl SoftwareHwpe {
    /// Create a virtual HWPE with the default L2 and side-channel windows
    ///
    /// # Panics
    ///
    /// Never in practice: the default windows are aligned and disjoint.
    pub fn new() -> Self {
        let memory = SimMemory::new()
            .with_region("l2", L2_BASE, L2_SIZE)
            .and_then(|m| m.with_region("result", RESULT_ADDR, RESULT_SIZE))
            .expect("default windows are aligned and disjoint");
        Self::with_memory(memory)
    }

    /// Create a virtual HWPE over caller-provided memory
    pub fn with_memory(memory: SimMemory) -> Self {
        Self {
            regs: [0; regs::REG_SLOTS],
            memory,
            slot: Slot::Free,
            next_job: 0,
            job_id: 0,
            grant_latency: 0,
            denials_left: 0,
            acquire_reads: 0,
            write_log: Vec::new(),
            clock_enabled: false,
            completed: 0,
        }
    }

    /// Deny this many ACQUIRE reads before each grant
    #[must_use]
    pub fn with_grant_latency(mut self, reads: u32) -> Self {
        self.grant_latency = reads;
        self.denials_left = reads;
        self
    }

    /// Current register contents, without read side effects
    pub fn peek(&self, offset: usize) -> u32 {
        self.regs[slot_index(offset)]
    }

    /// Every register write so far, in order
    pub fn write_log(&self) -> &[(usize, u32)] {
        &self.write_log
    }

    /// Number of ACQUIRE reads so far
    pub fn acquire_reads(&self) -> usize {
        self.acquire_reads
    }

    /// Whether the peripheral clock is ungated
    pub fn clock_enabled(&self) -> bool {
        self.clock_enabled
    }

    /// Number of jobs run to completion
    pub fn completed_jobs(&self) -> u32 {
        self.completed
    }

    /// True between TRIGGER and the completion event
    pub fn is_running(&self) -> bool {
        matches!(self.slot, Slot::Running(_))
    }

    /// Direct access to the simulated memory
    pub fn memory_mut(&mut self) -> &mut SimMemory {
        &mut self.memory
    }

    fn acquire(&mut self) -> u32 {
        self.acquire_reads += 1;
        if self.slot != Slot::Free {
            return acquire::NO_SLOT;
        }
        if self.denials_left > 0 {
            self.denials_left -= 1;
            return acquire::NO_SLOT;
        }

        self.slot = Slot::Held;
        self.job_id = self.next_job;
        self.next_job = self.next_job.wrapping_add(1);
        self.denials_left = self.grant_latency;
        debug!("SoftwareHwpe: granted job {}", self.job_id);
        u32::from(self.job_id)
    }

    fn trigger(&mut self) {
        if self.slot != Slot::Held {
            warn!("SoftwareHwpe: TRIGGER without a held job slot, ignored");
            return;
        }
        let job = JobRegisters::capture(&self.regs);
        self.slot = Slot::Running(job);
        self.regs[slot_index(regs::STATUS)] = STATUS_BUSY;
        self.regs[slot_index(regs::RUNNING_JOB)] = u32::from(self.job_id);
        debug!(
            "SoftwareHwpe: job {} running, nb_iter={} len_iter={}",
            self.job_id, job.nb_iter, job.len_iter
        );
    }

    fn soft_clear(&mut self) {
        self.slot = Slot::Free;
        self.denials_left = self.grant_latency;
        self.regs[slot_index(regs::STATUS)] = 0;
        info!("SoftwareHwpe: soft clear");
    }
}

impl Default for SoftwareHwpe {
    fn default() -> Self {
        Self::new()
    }
}

fn slot_index(offset: usize) -> usize {
    assert!(
        offset % 4 == 0 && offset < regs::ADDR_SPACE,
        "Register offset {offset:#x} outside the HWPE window"
    );
    offset / 4
}

impl HwpeBackend for SoftwareHwpe {
    fn read32(&mut self, offset: usize) -> u32 {
        match offset {
            regs::ACQUIRE => self.acquire(),
            _ => self.regs[slot_index(offset)],
        }
    }

    fn write32(&mut self, offset: usize, value: u32) {
        let index = slot_index(offset);
        self.write_log.push((offset, value));
        match offset {
            regs::TRIGGER => self.trigger(),
            regs::SOFT_CLEAR => self.soft_clear(),
            o if regs::is_read_only(o) => {
                warn!(
                    "SoftwareHwpe: write to read-only {} ignored",
                    regs::name(o).unwrap_or("?")
                );
            }
            _ => self.regs[index] = value,
        }
    }

    fn wait_event(&mut self, timeout: Option<Duration>) -> Result<()> {
        let Slot::Running(job) = self.slot else {
            // Nothing will ever raise the event; on hardware this hangs.
            return Err(match timeout {
                Some(t) => HwpeError::timeout("completion event", t),
                None => HwpeError::invalid_state("no job running, completion event would never fire"),
            });
        };

        // A bus fault leaves the job running with STATUS busy; SOFT_CLEAR recovers.
        let words = engine::execute(&job, &mut self.memory)?;
        self.slot = Slot::Free;
        self.regs[slot_index(regs::STATUS)] = 0;
        self.completed += 1;
        debug!("SoftwareHwpe: job {} done, {words} output words", self.job_id);
        Ok(())
    }

    fn set_clock_gate(&mut self, enabled: bool) {
        self.clock_enabled = enabled;
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }
}

impl SystemMemory for SoftwareHwpe {
    fn read_word(&mut self, addr: u32) -> Result<u32> {
        self.memory.read_word(addr)
    }

    fn write_word(&mut self, addr: u32, value: u32) -> Result<()> {
        self.memory.write_word(addr, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_grants_once() {
        let mut hw = SoftwareHwpe::new();
        assert_eq!(hw.read32(regs::ACQUIRE), 0);
        assert_eq!(hw.read32(regs::ACQUIRE), acquire::NO_SLOT);
    }

    #[test]
    fn job_ids_increment() {
        let mut hw = SoftwareHwpe::new();
        assert_eq!(hw.read32(regs::ACQUIRE), 0);
        hw.write32(regs::TRIGGER, 0);
        hw.wait_event(None).unwrap();
        assert_eq!(hw.read32(regs::ACQUIRE), 1);
    }

    #[test]
    fn grant_latency_applies_per_acquire() {
        let mut hw = SoftwareHwpe::new().with_grant_latency(2);
        assert_eq!(hw.read32(regs::ACQUIRE), acquire::NO_SLOT);
        assert_eq!(hw.read32(regs::ACQUIRE), acquire::NO_SLOT);
        assert_eq!(hw.read32(regs::ACQUIRE), 0);
        hw.write32(regs::SOFT_CLEAR, 0);
        assert_eq!(hw.read32(regs::ACQUIRE), acquire::NO_SLOT);
    }

    #[test]
    fn trigger_without_slot_is_ignored() {
        let mut hw = SoftwareHwpe::new();
        hw.write32(regs::TRIGGER, 0);
        assert!(!hw.is_running());
        assert_eq!(hw.peek(regs::STATUS), 0);
    }

    #[test]
    fn status_busy_until_completion() {
        let mut hw = SoftwareHwpe::new();
        hw.read32(regs::ACQUIRE);
        hw.write32(regs::NB_ITER, 1);
        hw.write32(regs::A_ADDR, L2_BASE);
        hw.write32(regs::B_ADDR, L2_BASE);
        hw.write32(regs::C_ADDR, L2_BASE);
        hw.write32(regs::D_ADDR, L2_BASE + 0x100);
        hw.write32(regs::TRIGGER, 0);
        assert_eq!(hw.read32(regs::STATUS), STATUS_BUSY);
        assert_eq!(hw.read32(regs::RUNNING_JOB), 0);
        hw.wait_event(None).unwrap();
        assert_eq!(hw.read32(regs::STATUS), 0);
        assert_eq!(hw.completed_jobs(), 1);
    }

    #[test]
    fn wait_without_job_fails_instead_of_hanging() {
        let mut hw = SoftwareHwpe::new();
        assert!(matches!(hw.wait_event(None), Err(HwpeError::InvalidState { .. })));
        assert!(matches!(
            hw.wait_event(Some(Duration::from_millis(3))),
            Err(HwpeError::Timeout { duration_ms: 3, .. })
        ));
    }

    #[test]
    fn bus_fault_stays_busy_until_soft_clear() {
        let mut hw = SoftwareHwpe::new();
        hw.read32(regs::ACQUIRE);
        hw.write32(regs::NB_ITER, 1);
        hw.write32(regs::A_ADDR, 0x4000_0000);
        hw.write32(regs::TRIGGER, 0);

        assert!(matches!(hw.wait_event(None), Err(HwpeError::OutOfBounds { .. })));
        assert!(hw.is_running());
        assert_eq!(hw.read32(regs::STATUS), STATUS_BUSY);
        assert_eq!(hw.read32(regs::ACQUIRE), acquire::NO_SLOT);
        assert_eq!(hw.completed_jobs(), 0);

        hw.write32(regs::SOFT_CLEAR, 0);
        assert!(!hw.is_running());
        assert_eq!(hw.read32(regs::STATUS), 0);
        assert_eq!(hw.read32(regs::ACQUIRE), 1);
    }

    #[test]
    fn read_only_registers_ignore_writes() {
        let mut hw = SoftwareHwpe::new();
        hw.write32(regs::STATUS, 0xffff_ffff);
        assert_eq!(hw.peek(regs::STATUS), 0);
        assert_eq!(hw.write_log().len(), 1);
    }

    #[test]
    fn registers_hold_last_value() {
        let mut hw = SoftwareHwpe::new();
        hw.write32(regs::EVT_ENABLE, 0x3);
        hw.write32(regs::EVT_ENABLE, 0x3);
        assert_eq!(hw.read32(regs::EVT_ENABLE), 0x3);
        hw.write32(regs::EVT_ENABLE, 0x1);
        assert_eq!(hw.read32(regs::EVT_ENABLE), 0x1);
    }

    #[test]
    fn backend_type_is_software() {
        assert_eq!(SoftwareHwpe::new().backend_type(), BackendType::Software);
    }

    #[test]
    #[should_panic(expected = "outside the HWPE window")]
    fn offset_outside_window_panics() {
        SoftwareHwpe::new().read32(regs::ADDR_SPACE);
    }
}
