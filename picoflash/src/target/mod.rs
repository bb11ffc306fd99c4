//! Target memory layout.
//!
//! Plain constants describing the RP2040 address space, plus a small
//! [`MemoryRegion`] helper used to validate ranges before any device traffic.

pub mod rp2040;

pub use rp2040::*;

use std::fmt;

/// A half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Human-readable region name.
    pub name: &'static str,
    /// First address of the region.
    pub start: u32,
    /// One past the last address of the region.
    pub end: u32,
}

impl MemoryRegion {
    /// Create a region.
    pub const fn new(name: &'static str, start: u32, end: u32) -> Self {
        Self { name, start, end }
    }

    /// Region size in bytes.
    pub const fn size(&self) -> u32 {
        self.end - self.start
    }

    /// Check whether a single address is inside the region.
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Check whether `[addr, addr + len)` lies entirely inside the region.
    pub fn contains_range(&self, addr: u32, len: u64) -> bool {
        self.contains(addr) && u64::from(addr) + len <= u64::from(self.end)
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [0x{:08X}..0x{:08X})", self.name, self.start, self.end)
    }
}

/// Find the region containing `addr`.
pub fn region_for(addr: u32) -> Option<&'static MemoryRegion> {
    MEMORY_MAP
        .iter()
        .find(|r| r.contains(addr))
}

/// Round `len` up to a whole number of flash sectors.
pub fn round_up_to_sector(len: u64) -> u64 {
    let sector = u64::from(FLASH_SECTOR_ERASE_SIZE);
    len.div_ceil(sector) * sector
}
