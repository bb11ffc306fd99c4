//! RP2040 memory map and bootloader identification.

use super::MemoryRegion;

/// Boot ROM start.
pub const ROM_START: u32 = 0x0000_0000;
/// Boot ROM end (exclusive).
pub const ROM_END: u32 = 0x0000_4000;

/// External flash (XIP window) start.
pub const FLASH_START: u32 = 0x1000_0000;
/// External flash (XIP window) end (exclusive).
pub const FLASH_END: u32 = 0x1100_0000;

/// XIP cache-as-SRAM start.
pub const XIP_SRAM_BASE: u32 = 0x1500_0000;
/// XIP cache-as-SRAM end (exclusive).
pub const XIP_SRAM_END: u32 = 0x1500_4000;

/// Striped SRAM start.
pub const SRAM_START: u32 = 0x2000_0000;
/// Striped SRAM end (exclusive). Also the default initial stack pointer.
pub const SRAM_END: u32 = 0x2004_2000;

/// Unstriped SRAM alias start.
pub const SRAM_UNSTRIPED_START: u32 = 0x2100_0000;
/// Unstriped SRAM alias end (exclusive).
pub const SRAM_UNSTRIPED_END: u32 = 0x2104_0000;

/// Flash program granularity.
pub const PAGE_SIZE: u32 = 256;

/// Flash erase granularity.
pub const FLASH_SECTOR_ERASE_SIZE: u32 = 4096;

/// USB vendor id of the BOOTSEL bootloader.
pub const PICOBOOT_VID: u16 = 0x2E8A;

/// USB product id of the BOOTSEL bootloader.
pub const PICOBOOT_PID: u16 = 0x0003;

/// Every addressable region the bootloader can touch.
pub const MEMORY_MAP: &[MemoryRegion] = &[
    MemoryRegion::new("ROM", ROM_START, ROM_END),
    MemoryRegion::new("FLASH", FLASH_START, FLASH_END),
    MemoryRegion::new("XIP_SRAM", XIP_SRAM_BASE, XIP_SRAM_END),
    MemoryRegion::new("SRAM", SRAM_START, SRAM_END),
    MemoryRegion::new("SRAM_UNSTRIPED", SRAM_UNSTRIPED_START, SRAM_UNSTRIPED_END),
];

/// The flash region.
pub const FLASH: MemoryRegion = MemoryRegion::new("FLASH", FLASH_START, FLASH_END);
