//! Job sequencing
//!
//! A job moves through four states and never back:
//!
//! ```text
//! Idle ──acquire──▶ JobSlot ──program──▶ ProgrammedJob ──trigger──▶ RunningJob ──wait──▶ CompletedJob
//! ```
//!
//! Each state borrows the [`Hwpe`] mutably, so nothing else can touch the
//! register window between acquire and completion, and TRIGGER cannot be
//! written before the bank is programmed.

use crate::backend::HwpeBackend;
use crate::error::{HwpeError, Result};
use crate::hal::Hwpe;
use crate::wait::{poll_until, CancelToken, PollConfig};
use hwpe_regs::{shift_simplemul_value, MicroProgram};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Operand addresses and iteration shape of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobParams {
    /// Stream A base address
    pub a_addr: u32,
    /// Stream B base address
    pub b_addr: u32,
    /// Stream C base address
    pub c_addr: u32,
    /// Stream D (output) base address
    pub d_addr: u32,
    /// Number of iterations
    pub nb_iter: u32,
    /// Elements per iteration, minus one
    pub len_iter: u32,
    /// Right shift applied to each product
    pub shift: u16,
    /// Element-wise multiply instead of scalar product
    pub simplemul: bool,
    /// A/B byte stride between iterations
    pub vectstride: u32,
    /// C/D byte stride between iterations; left untouched when `None`
    pub vectstride2: Option<u32>,
}

impl JobParams {
    /// Reject shapes the engine cannot run
    ///
    /// # Errors
    ///
    /// Returns error if `nb_iter` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.nb_iter == 0 {
            return Err(HwpeError::invalid_config("nb_iter must be at least 1"));
        }
        Ok(())
    }

    /// Number of output words the job produces
    pub const fn output_words(&self) -> usize {
        if self.simplemul {
            self.nb_iter as usize * (self.len_iter as usize + 1)
        } else {
            self.nb_iter as usize
        }
    }
}

impl<B: HwpeBackend> Hwpe<B> {
    /// Spin on ACQUIRE until a slot is granted
    ///
    /// Negative reads are never returned as handles.
    ///
    /// # Errors
    ///
    /// Returns error if `poll` times out or `cancel` fires first.
    pub fn acquire(&mut self, poll: &PollConfig, cancel: &CancelToken) -> Result<JobSlot<'_, B>> {
        let id = poll_until(poll, cancel, "job slot", || {
            let id = self.acquire_job();
            (id >= 0).then_some(id)
        })?;
        debug!("Acquired job slot {id}");
        Ok(JobSlot { hwpe: self, id })
    }
}

/// A held job slot whose registers may be programmed
#[derive(Debug)]
pub struct JobSlot<'a, B: HwpeBackend> {
    hwpe: &'a mut Hwpe<B>,
    id: i32,
}

impl<'a, B: HwpeBackend> JobSlot<'a, B> {
    /// Handle returned by ACQUIRE
    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Write the micro-program and every job parameter
    ///
    /// # Errors
    ///
    /// Returns error if `params` fails validation; nothing is written then.
    pub fn program(self, program: &MicroProgram, params: &JobParams) -> Result<ProgrammedJob<'a, B>> {
        params.validate()?;
        let hwpe = self.hwpe;

        hwpe.load_program(program);

        hwpe.a_addr_set(params.a_addr);
        hwpe.b_addr_set(params.b_addr);
        hwpe.c_addr_set(params.c_addr);
        hwpe.d_addr_set(params.d_addr);
        hwpe.nb_iter_set(params.nb_iter);
        hwpe.len_iter_set(params.len_iter);
        hwpe.vectstride_set(params.vectstride);
        if let Some(stride) = params.vectstride2 {
            hwpe.vectstride2_set(stride);
        }
        hwpe.shift_simplemul_set(shift_simplemul_value(params.shift, params.simplemul));

        debug!(
            "Job {}: programmed nb_iter={} len_iter={} shift={} simplemul={}",
            self.id, params.nb_iter, params.len_iter, params.shift, params.simplemul
        );
        Ok(ProgrammedJob { hwpe, id: self.id })
    }
}

/// A fully programmed job waiting for TRIGGER
#[derive(Debug)]
pub struct ProgrammedJob<'a, B: HwpeBackend> {
    hwpe: &'a mut Hwpe<B>,
    id: i32,
}

impl<'a, B: HwpeBackend> ProgrammedJob<'a, B> {
    /// Handle returned by ACQUIRE
    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Write TRIGGER
    pub fn trigger(self) -> RunningJob<'a, B> {
        self.hwpe.trigger_job();
        debug!("Job {}: triggered", self.id);
        RunningJob {
            hwpe: self.hwpe,
            id: self.id,
            started: Instant::now(),
        }
    }
}

/// A triggered job
#[derive(Debug)]
pub struct RunningJob<'a, B: HwpeBackend> {
    hwpe: &'a mut Hwpe<B>,
    id: i32,
    started: Instant,
}

impl<B: HwpeBackend> RunningJob<'_, B> {
    /// Handle returned by ACQUIRE
    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Block until the completion event
    ///
    /// # Errors
    ///
    /// Returns error if the wait times out or the backend cannot wait.
    pub fn wait(self, timeout: Option<Duration>) -> Result<CompletedJob> {
        self.hwpe.wait_event(timeout)?;
        let elapsed = self.started.elapsed();
        info!("Job {} complete in {elapsed:?}", self.id);
        Ok(CompletedJob {
            id: self.id,
            elapsed,
        })
    }
}

/// A job the accelerator has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedJob {
    /// Handle returned by ACQUIRE
    pub id: i32,
    /// Time from TRIGGER to completion event
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::software::SoftwareHwpe;
    use hwpe_regs::regs;

    fn params() -> JobParams {
        JobParams {
            a_addr: 0x1c00_0000,
            b_addr: 0x1c00_0200,
            c_addr: 0x1c00_0400,
            d_addr: 0x1c00_0410,
            nb_iter: 4,
            len_iter: 31,
            shift: 0,
            simplemul: false,
            vectstride: 128,
            vectstride2: None,
        }
    }

    #[test]
    fn trigger_is_the_last_write() {
        let mut hwpe = Hwpe::new(SoftwareHwpe::new());
        let slot = hwpe.acquire(&PollConfig::default(), &CancelToken::new()).unwrap();
        let job = slot.program(&MicroProgram::MAC_SCALAR, &params()).unwrap();
        let _running = job.trigger();

        let log = hwpe.backend().write_log();
        assert_eq!(log.last().map(|(o, _)| *o), Some(regs::TRIGGER));
        assert_eq!(log.iter().filter(|(o, _)| *o == regs::TRIGGER).count(), 1);
        // bytecode bank, 8 job registers, trigger
        assert_eq!(log.len(), 7 + 8 + 1);
    }

    #[test]
    fn vectstride2_written_only_when_set() {
        let mut hwpe = Hwpe::new(SoftwareHwpe::new());
        let slot = hwpe.acquire(&PollConfig::default(), &CancelToken::new()).unwrap();
        let p = JobParams { vectstride2: Some(8), ..params() };
        let _job = slot.program(&MicroProgram::MAC_SCALAR, &p).unwrap();
        assert_eq!(hwpe.backend().peek(regs::VECTSTRIDE2), 8);
        assert!(hwpe.backend().write_log().iter().any(|(o, _)| *o == regs::VECTSTRIDE2));
    }

    #[test]
    fn acquire_skips_negative_reads() {
        let mut hwpe = Hwpe::new(SoftwareHwpe::new().with_grant_latency(5));
        let slot = hwpe.acquire(&PollConfig::default(), &CancelToken::new()).unwrap();
        assert!(slot.id() >= 0);
        assert_eq!(hwpe.backend().acquire_reads(), 6);
    }

    #[test]
    fn acquire_times_out_when_slot_held() {
        let mut hwpe = Hwpe::new(SoftwareHwpe::new());
        assert!(hwpe.acquire_job() >= 0);
        let poll = PollConfig::with_timeout(Duration::from_millis(10));
        let err = hwpe.acquire(&poll, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, HwpeError::Timeout { .. }));
    }

    #[test]
    fn zero_iterations_rejected_before_any_write() {
        let mut hwpe = Hwpe::new(SoftwareHwpe::new());
        let slot = hwpe.acquire(&PollConfig::default(), &CancelToken::new()).unwrap();
        let p = JobParams { nb_iter: 0, ..params() };
        assert!(matches!(
            slot.program(&MicroProgram::MAC_SCALAR, &p),
            Err(HwpeError::InvalidConfig { .. })
        ));
        assert!(hwpe.backend().write_log().is_empty());
    }

    #[test]
    fn output_words_by_mode() {
        assert_eq!(params().output_words(), 4);
        let p = JobParams { simplemul: true, ..params() };
        assert_eq!(p.output_words(), 4 * 32);
    }
}
