//! Register model for the HWPE multiply-accumulate accelerator.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the peripheral: register offsets, packed bitfields and the
//! layout of the micro-program consumed by the accelerator's sequencer.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Register offsets for the control and job-parameter banks |
//! | [`fields`] | Packing helpers for SHIFT/SIMPLEMUL and BYTECODE5/LOOPS0 |
//! | [`program`] | Micro-program (bytecode + loop bounds) layout |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fields;
pub mod program;
pub mod regs;

pub use fields::shift_simplemul_value;
pub use program::MicroProgram;
