//! Backend abstraction for the register file
//!
//! The HAL never touches hardware directly: every register access goes
//! through an [`HwpeBackend`], so the same sequencing code runs on a mapped
//! register window or on the software model.

use crate::error::{HwpeError, Result};
use std::fmt::Debug;
use std::time::Duration;

/// Access to the accelerator's register window
pub trait HwpeBackend: Debug {
    /// Read the 32-bit register at `offset` from the HWPE base.
    ///
    /// Takes `&mut self` because some reads (ACQUIRE) change engine state.
    fn read32(&mut self, offset: usize) -> u32;

    /// Write the 32-bit register at `offset` from the HWPE base.
    fn write32(&mut self, offset: usize, value: u32);

    /// Block until the accelerator signals job completion
    ///
    /// `None` waits without bound, like `wfi` on the reference platform.
    ///
    /// # Errors
    ///
    /// Returns error if the timeout expires or the backend cannot wait.
    fn wait_event(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// Gate or ungate the peripheral clock
    ///
    /// Platforms without clock gating keep the default no-op.
    fn set_clock_gate(&mut self, enabled: bool) {
        tracing::trace!("clock gate {} (no-op)", if enabled { "on" } else { "off" });
    }

    /// Get backend type for debugging
    fn backend_type(&self) -> BackendType;
}

/// Word access to the memory the accelerator streams from and into
pub trait SystemMemory: Debug {
    /// Read one 32-bit word at a bus address
    ///
    /// # Errors
    ///
    /// Returns error if the address lies outside every known window.
    fn read_word(&mut self, addr: u32) -> Result<u32>;

    /// Write one 32-bit word at a bus address
    ///
    /// # Errors
    ///
    /// Returns error if the address lies outside every known window.
    fn write_word(&mut self, addr: u32, value: u32) -> Result<()>;

    /// Write consecutive words starting at `addr`
    ///
    /// # Errors
    ///
    /// Returns error if any word falls outside a known window.
    fn write_words(&mut self, addr: u32, words: &[u32]) -> Result<()> {
        for (addr, &word) in word_addrs(addr, words.len())?.zip(words) {
            self.write_word(addr, word)?;
        }
        Ok(())
    }

    /// Read `out.len()` consecutive words starting at `addr`
    ///
    /// # Errors
    ///
    /// Returns error if any word falls outside a known window.
    fn read_words(&mut self, addr: u32, out: &mut [u32]) -> Result<()> {
        for (addr, slot) in word_addrs(addr, out.len())?.zip(out.iter_mut()) {
            *slot = self.read_word(addr)?;
        }
        Ok(())
    }
}

/// Register window plus data memory: everything a test bench needs
pub trait Platform: HwpeBackend + SystemMemory {}

impl<T: HwpeBackend + SystemMemory> Platform for T {}

fn word_addrs(addr: u32, count: usize) -> Result<impl Iterator<Item = u32>> {
    let len = count * 4;
    let end = u64::from(addr) + len as u64;
    if end > u64::from(u32::MAX) + 1 {
        return Err(HwpeError::out_of_bounds(u64::from(addr), len));
    }
    Ok((0..count).map(move |i| addr + (i as u32) * 4))
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Physical register window mapped through `/dev/mem`
    Mmio,

    /// Virtual HWPE, no hardware required
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mmio => write!(f, "MMIO"),
            Self::Software => write!(f, "Software (virtual HWPE)"),
        }
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelection {
    /// Map the real register window
    Mmio,

    /// Use the software model (CI, development)
    #[default]
    Software,
}

impl std::str::FromStr for BackendSelection {
    type Err = HwpeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mmio" | "hw" | "hardware" => Ok(Self::Mmio),
            "software" | "sw" => Ok(Self::Software),
            other => Err(HwpeError::invalid_config(format!(
                "unknown backend '{other}' (expected mmio or software)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_parses() {
        assert_eq!("sw".parse::<BackendSelection>().unwrap(), BackendSelection::Software);
        assert_eq!("MMIO".parse::<BackendSelection>().unwrap(), BackendSelection::Mmio);
        assert!("fpga".parse::<BackendSelection>().is_err());
    }

    #[test]
    fn word_range_cannot_wrap() {
        assert!(word_addrs(0xffff_fffc, 1).is_ok());
        assert!(word_addrs(0xffff_fffc, 2).is_err());
    }
}
