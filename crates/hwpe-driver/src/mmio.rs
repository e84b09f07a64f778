//! Memory-mapped I/O for the HWPE register window
//!
//! Maps physical windows through `/dev/mem` (or any mappable file standing in
//! for it) with `rustix`, and exposes bounds-checked volatile 32-bit access.
//! [`MmioHwpe`] combines the register window with the data windows the
//! accelerator streams from.

// MMIO registers are naturally aligned by hardware, so pointer casts are safe
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::cast_possible_truncation)]

use crate::backend::{BackendType, HwpeBackend, SystemMemory};
use crate::error::{HwpeError, Result};
use crate::wait::{poll_until, CancelToken, PollConfig};
use hwpe_regs::regs;
use rustix::fs::OFlags;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::time::Duration;

/// Default device exposing physical memory
pub const DEV_MEM: &str = "/dev/mem";

const PAGE_SIZE: u64 = 4096;

/// One mapped physical window
pub struct PhysRegion {
    /// Start of the mapping (page aligned)
    map: NonNull<u8>,
    /// Length of the mapping
    map_len: usize,
    /// Offset of `phys_base` inside the mapping
    delta: usize,
    /// Physical address the window starts at
    phys_base: u64,
    /// Usable size from `phys_base`
    size: usize,
    _file: File,
}

impl std::fmt::Debug for PhysRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysRegion")
            .field("map", &format_args!("{:p}", self.map))
            .field("phys_base", &format_args!("{:#x}", self.phys_base))
            .field("size", &format_args!("{:#x}", self.size))
            .finish_non_exhaustive()
    }
}

impl PhysRegion {
    /// Map `size` bytes of physical memory starting at `phys_base`
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The device file cannot be opened (missing, or no CAP_SYS_RAWIO)
    /// - `size` is zero
    /// - mmap fails
    pub fn map(dev: &Path, phys_base: u64, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(HwpeError::map_failed("window size is 0"));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlags::SYNC.bits() as i32)
            .open(dev)
            .map_err(|e| HwpeError::map_failed(format!("Cannot open {}: {e}", dev.display())))?;

        let page_base = phys_base & !(PAGE_SIZE - 1);
        let delta = (phys_base - page_base) as usize;
        let map_len = delta + size;

        tracing::debug!(
            "Mapping {:#x}+{size:#x} via {} (page {page_base:#x})",
            phys_base,
            dev.display()
        );

        // SAFETY: mmap of a device window.
        // Invariants: (1) file is open read/write and kept alive in the struct;
        // (2) map_len is non-zero; (3) offset is page aligned; (4) the result is
        // checked and unmapped exactly once in Drop.
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                page_base,
            )
        }
        .map_err(|e| HwpeError::map_failed(format!("mmap {phys_base:#x} failed: {e}")))?;

        let map = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| HwpeError::map_failed("mmap returned null"))?;

        tracing::info!("Mapped {phys_base:#x}+{size:#x} at {map:p}");

        Ok(Self {
            map,
            map_len,
            delta,
            phys_base,
            size,
            _file: file,
        })
    }

    fn check(&self, offset: usize) -> Result<()> {
        if offset % 4 != 0 || offset + 4 > self.size {
            return Err(HwpeError::out_of_bounds(self.phys_base + offset as u64, 4));
        }
        Ok(())
    }

    /// Read the word at `offset` bytes into the window
    ///
    /// # Errors
    ///
    /// Returns error if the word is misaligned or past the window.
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.check(offset)?;
        // SAFETY: volatile MMIO read. Invariants: (1) map valid for map_len bytes;
        // (2) delta + offset + 4 <= map_len (checked); (3) 4-byte aligned (checked,
        // and page_base is aligned).
        let value = unsafe {
            self.map
                .as_ptr()
                .add(self.delta + offset)
                .cast::<u32>()
                .read_volatile()
        };
        tracing::trace!("Read u32 @ {:#x} = {value:#x}", self.phys_base + offset as u64);
        Ok(value)
    }

    /// Write the word at `offset` bytes into the window
    ///
    /// # Errors
    ///
    /// Returns error if the word is misaligned or past the window.
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        self.check(offset)?;
        tracing::trace!("Write u32 @ {:#x} = {value:#x}", self.phys_base + offset as u64);
        // SAFETY: volatile MMIO write, same invariants as read_u32.
        unsafe {
            self.map
                .as_ptr()
                .add(self.delta + offset)
                .cast::<u32>()
                .write_volatile(value);
        }
        Ok(())
    }

    /// True if `[addr, addr + 4)` lies inside the window
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.phys_base && addr + 4 <= self.phys_base + self.size as u64
    }

    /// Physical base address
    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }

    /// Usable size in bytes
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl Drop for PhysRegion {
    fn drop(&mut self) {
        // SAFETY: map/map_len come from the successful mmap in map(); Drop runs once.
        unsafe {
            if let Err(e) = munmap(self.map.as_ptr().cast(), self.map_len) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
        tracing::debug!("Unmapped {:#x}", self.phys_base);
    }
}

// SAFETY: PhysRegion owns its mapping exclusively; writes need &mut self.
unsafe impl Send for PhysRegion {}

/// Where the accelerator and its memory live on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmioConfig {
    /// Device file exposing physical memory
    pub dev: PathBuf,
    /// Physical base of the HWPE register window
    pub hwpe_base: u64,
    /// Data windows `(base, size)` the streams and side channel live in
    pub windows: Vec<(u64, usize)>,
    /// Polling used for the completion wait
    pub completion_poll: PollConfig,
}

impl Default for MmioConfig {
    fn default() -> Self {
        Self {
            dev: PathBuf::from(DEV_MEM),
            hwpe_base: 0x1a10_c000,
            windows: Vec::new(),
            completion_poll: PollConfig::default().interval(Duration::from_micros(10)),
        }
    }
}

/// HWPE reached through mapped physical memory
#[derive(Debug)]
pub struct MmioHwpe {
    regs: PhysRegion,
    windows: Vec<PhysRegion>,
    completion_poll: PollConfig,
    cancel: CancelToken,
}

impl MmioHwpe {
    /// Map the register window and every data window
    ///
    /// # Errors
    ///
    /// Returns error if any window cannot be mapped.
    pub fn open(config: &MmioConfig) -> Result<Self> {
        tracing::info!(
            "Opening HWPE at {:#x} via {}",
            config.hwpe_base,
            config.dev.display()
        );
        let regs = PhysRegion::map(&config.dev, config.hwpe_base, regs::ADDR_SPACE)?;
        let windows = config
            .windows
            .iter()
            .map(|&(base, size)| PhysRegion::map(&config.dev, base, size))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            regs,
            windows,
            completion_poll: config.completion_poll,
            cancel: CancelToken::new(),
        })
    }

    /// Token that aborts an in-progress completion wait
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn window(&mut self, addr: u32) -> Result<(&mut PhysRegion, usize)> {
        let addr = u64::from(addr);
        self.windows
            .iter_mut()
            .find(|w| w.contains(addr))
            .map(|w| {
                let off = (addr - w.phys_base()) as usize;
                (w, off)
            })
            .ok_or_else(|| HwpeError::out_of_bounds(addr, 4))
    }
}

impl HwpeBackend for MmioHwpe {
    /// # Panics
    ///
    /// Panics if `offset` is outside the register window.
    fn read32(&mut self, offset: usize) -> u32 {
        match self.regs.read_u32(offset) {
            Ok(v) => v,
            Err(e) => panic!("HWPE register read: {e}"),
        }
    }

    /// # Panics
    ///
    /// Panics if `offset` is outside the register window.
    fn write32(&mut self, offset: usize, value: u32) {
        if let Err(e) = self.regs.write_u32(offset, value) {
            panic!("HWPE register write: {e}");
        }
    }

    /// Hosted Linux has no `wfi`; poll STATUS until the engine reports idle.
    ///
    /// The first poll can read zero if the engine has not yet raised its busy
    /// bit for a TRIGGER written just before. This backend assumes the
    /// peripheral reports busy by the time the trigger write is posted.
    fn wait_event(&mut self, timeout: Option<Duration>) -> Result<()> {
        let poll = PollConfig {
            timeout: timeout.or(self.completion_poll.timeout),
            ..self.completion_poll
        };
        let cancel = self.cancel.clone();
        poll_until(&poll, &cancel, "completion event", || {
            (self.read32(regs::STATUS) == 0).then_some(())
        })
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Mmio
    }
}

impl SystemMemory for MmioHwpe {
    fn read_word(&mut self, addr: u32) -> Result<u32> {
        let (w, off) = self.window(addr)?;
        w.read_u32(off)
    }

    fn write_word(&mut self, addr: u32, value: u32) -> Result<()> {
        let (w, off) = self.window(addr)?;
        w.write_u32(off, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_fails_gracefully() {
        let err = PhysRegion::map(Path::new("/nonexistent/mem"), 0x1a10_c000, regs::ADDR_SPACE)
            .unwrap_err();
        assert!(matches!(err, HwpeError::MapFailed { .. }));
    }

    #[test]
    fn zero_sized_window_rejected() {
        assert!(PhysRegion::map(Path::new(DEV_MEM), 0, 0).is_err());
    }

    #[test]
    fn file_backed_window_round_trips() {
        let path = std::env::temp_dir().join(format!("hwpe-mmio-{}", std::process::id()));
        std::fs::write(&path, vec![0u8; 2 * PAGE_SIZE as usize]).unwrap();

        {
            let mut region = PhysRegion::map(&path, 0x1010, 0x100).unwrap();
            region.write_u32(0x8, 0xcafe_f00d).unwrap();
            assert_eq!(region.read_u32(0x8).unwrap(), 0xcafe_f00d);
            assert!(region.read_u32(0x100).is_err());
            assert!(region.read_u32(0x2).is_err());
            assert!(region.contains(0x1010));
            assert!(!region.contains(0x1110));
        }

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0x1018..0x101c], &0xcafe_f00du32.to_ne_bytes());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn file_backed_hwpe_sees_status() {
        let path = std::env::temp_dir().join(format!("hwpe-mmio-hw-{}", std::process::id()));
        std::fs::write(&path, vec![0u8; 4 * PAGE_SIZE as usize]).unwrap();

        let config = MmioConfig {
            dev: path.clone(),
            hwpe_base: 0x1000,
            windows: vec![(0x2000, 0x100)],
            completion_poll: PollConfig::with_timeout(Duration::from_millis(50)),
        };
        let mut hw = MmioHwpe::open(&config).unwrap();
        hw.write32(regs::NB_ITER, 4);
        assert_eq!(hw.read32(regs::NB_ITER), 4);
        // STATUS reads zero in a plain file, so the completion wait returns at once
        hw.wait_event(None).unwrap();
        hw.write_word(0x2004, 7).unwrap();
        assert_eq!(hw.read_word(0x2004).unwrap(), 7);
        assert!(hw.read_word(0x3000).is_err());

        drop(hw);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    #[ignore] // Requires a mapped HWPE and root
    fn hardware_status_readable() {
        let mut hw = MmioHwpe::open(&MmioConfig::default()).expect("map HWPE");
        println!("STATUS = {:#x}", hw.read32(regs::STATUS));
    }
}
