//! Host-side driver and test bench for the HWPE multiply-accumulate accelerator.
//!
//! The accelerator is a memory-mapped peripheral: a control bank (TRIGGER,
//! ACQUIRE, STATUS, ...), a seven-word micro-program bank and a job-parameter
//! bank. A job is acquired, programmed, triggered and then awaited; the
//! engine streams A and B from data memory, accumulates with C and writes D.
//!
//! # Backend hierarchy
//!
//! ```text
//! Hardware:
//!   MmioHwpe      register and data windows mapped through /dev/mem
//!
//! Development / CI:
//!   SoftwareHwpe  virtual HWPE with simulated memory and datapath
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use hwpe_driver::{Hwpe, SoftwareHwpe, Stimuli, TestBench};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bench = TestBench::default();
//! let cfg = bench.config();
//! let stimuli = Stimuli::synthesize(0x5eed, &cfg.shape, &cfg.golden)?;
//!
//! let mut hwpe = Hwpe::new(SoftwareHwpe::new());
//! let report = bench.run(&mut hwpe, &stimuli)?;
//! println!("job {}: {} errors", report.job_id, report.error_count());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
pub mod bench;
mod error;
mod hal;
pub mod job;
pub mod mmio;
pub mod verify;
pub mod wait;

pub use backend::{BackendSelection, BackendType, HwpeBackend, Platform, SystemMemory};
pub use backends::{SimMemory, SoftwareHwpe};
pub use bench::{BenchConfig, BenchReport, BenchShape, BufferAddrs, Stimuli, TestBench, REFERENCE_GOLDEN};
pub use error::{HwpeError, Result};
pub use hal::Hwpe;
pub use job::{CompletedJob, JobParams, JobSlot, ProgrammedJob, RunningJob};
pub use mmio::{MmioConfig, MmioHwpe};
pub use verify::{verify_words, Mismatch, Verification};
pub use wait::{CancelToken, PollConfig};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        BenchConfig, CancelToken, Hwpe, HwpeBackend, HwpeError, JobParams, MmioConfig, MmioHwpe,
        Platform, PollConfig, Result, SoftwareHwpe, Stimuli, SystemMemory, TestBench,
    };
    pub use hwpe_regs::MicroProgram;
}
