//! Non-hardware backends
//!
//! - **Software**: virtual HWPE with a register file, job-slot state machine
//!   and a datapath model, for CI and local development
//! - **Memory**: sparse word-addressed regions standing in for L2
//!
//! The hardware backend lives in [`crate::mmio`].

pub mod engine;
pub mod memory;
pub mod software;

pub use memory::SimMemory;
pub use software::SoftwareHwpe;
