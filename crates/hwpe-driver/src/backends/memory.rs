//! Simulated bus memory for the software backend
//!
//! A handful of named word-addressed regions. Anything outside them is a bus
//! error and surfaces as [`HwpeError::OutOfBounds`].

use crate::backend::SystemMemory;
use crate::error::{HwpeError, Result};

#[derive(Debug, Clone)]
struct Region {
    name: &'static str,
    base: u32,
    words: Vec<u32>,
}

impl Region {
    fn index(&self, addr: u32) -> Option<usize> {
        let off = addr.checked_sub(self.base)?;
        let idx = (off / 4) as usize;
        (off % 4 == 0 && idx < self.words.len()).then_some(idx)
    }
}

/// Sparse memory built from named regions
#[derive(Debug, Clone, Default)]
pub struct SimMemory {
    regions: Vec<Region>,
}

impl SimMemory {
    /// Empty memory: every access faults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zero-filled region of `size` bytes at `base`
    ///
    /// # Errors
    ///
    /// Returns error if the region is misaligned, wraps the address space or
    /// overlaps an existing region.
    pub fn add_region(&mut self, name: &'static str, base: u32, size: usize) -> Result<()> {
        if base % 4 != 0 || size % 4 != 0 || size == 0 {
            return Err(HwpeError::invalid_config(format!(
                "region {name}: base {base:#x} / size {size:#x} must be non-zero multiples of 4"
            )));
        }
        let end = u64::from(base) + size as u64;
        if end > u64::from(u32::MAX) + 1 {
            return Err(HwpeError::invalid_config(format!(
                "region {name} wraps the 32-bit address space"
            )));
        }
        if let Some(other) = self.regions.iter().find(|r| {
            let r_end = u64::from(r.base) + r.words.len() as u64 * 4;
            u64::from(base) < r_end && u64::from(r.base) < end
        }) {
            return Err(HwpeError::invalid_config(format!(
                "region {name} overlaps {}",
                other.name
            )));
        }

        tracing::debug!("SimMemory: region {name} at {base:#010x}, {size} bytes");
        self.regions.push(Region {
            name,
            base,
            words: vec![0; size / 4],
        });
        Ok(())
    }

    /// Builder form of [`add_region`](Self::add_region)
    ///
    /// # Errors
    ///
    /// Same as `add_region`.
    pub fn with_region(mut self, name: &'static str, base: u32, size: usize) -> Result<Self> {
        self.add_region(name, base, size)?;
        Ok(self)
    }

    fn locate(&self, addr: u32) -> Option<(usize, usize)> {
        self.regions
            .iter()
            .enumerate()
            .find_map(|(r, region)| region.index(addr).map(|i| (r, i)))
    }
}

impl SystemMemory for SimMemory {
    fn read_word(&mut self, addr: u32) -> Result<u32> {
        let (r, i) = self
            .locate(addr)
            .ok_or_else(|| HwpeError::out_of_bounds(u64::from(addr), 4))?;
        Ok(self.regions[r].words[i])
    }

    fn write_word(&mut self, addr: u32, value: u32) -> Result<()> {
        let (r, i) = self
            .locate(addr)
            .ok_or_else(|| HwpeError::out_of_bounds(u64::from(addr), 4))?;
        self.regions[r].words[i] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> SimMemory {
        SimMemory::new()
            .with_region("l2", 0x1c00_0000, 0x100)
            .unwrap()
            .with_region("result", 0x8000_0000, 0x10)
            .unwrap()
    }

    #[test]
    fn reads_back_writes() {
        let mut m = mem();
        m.write_word(0x1c00_00fc, 0xdead_beef).unwrap();
        assert_eq!(m.read_word(0x1c00_00fc).unwrap(), 0xdead_beef);
        assert_eq!(m.read_word(0x1c00_0000).unwrap(), 0);
    }

    #[test]
    fn faults_outside_regions() {
        let mut m = mem();
        assert!(matches!(
            m.read_word(0x1c00_0100),
            Err(HwpeError::OutOfBounds { addr: 0x1c00_0100, len: 4 })
        ));
        assert!(m.write_word(0x1c00_0002, 1).is_err());
    }

    #[test]
    fn slice_helpers() {
        let mut m = mem();
        m.write_words(0x1c00_0010, &[1, 2, 3]).unwrap();
        let mut out = [0u32; 3];
        m.read_words(0x1c00_0010, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);
        assert!(m.write_words(0x1c00_00f8, &[1, 2, 3]).is_err());
    }

    #[test]
    fn overlapping_region_rejected() {
        let mut m = mem();
        assert!(m.add_region("dup", 0x1c00_0080, 0x100).is_err());
        assert!(m.add_region("odd", 0x1c00_1001, 0x10).is_err());
    }
}
