//! RP2040 flash programming sequence.
//!
//! [`FlashProgrammer`] drives the fixed PICOBOOT programming flow on top of a
//! [`CommandChannel`]:
//!
//! 1. `SET_EXCLUSIVE_ACCESS`
//! 2. `EXIT_XIP`
//! 3. per 4096-byte sector: `FLASH_ERASE`, then `WRITE` (optionally `READ` back)
//! 4. `REBOOT`
//! 5. close
//!
//! Each step runs only if the previous one succeeded. The first failure is
//! returned as [`Error::Aborted`] naming the step; nothing after it is sent,
//! including the close.
//!
//! ## Example
//!
//! ```rust,no_run
//! use picoflash::{FlashImage, FlashOptions, FlashProgrammer, RusbTransport};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FlashImage::from_file("firmware.bin")?;
//!     let transport = RusbTransport::find(None)?;
//!
//!     let mut programmer = FlashProgrammer::open(transport)?
//!         .with_options(FlashOptions::default().with_verify(true));
//!     programmer.flash(&image, &mut |current, total| {
//!         println!("{current}/{total}");
//!     })?;
//!
//!     Ok(())
//! }
//! ```

use {
    crate::{
        error::{Error, FlashStep, Result},
        image::FlashImage,
        protocol::{CommandChannel, ExclusiveMode},
        session::TransportSession,
        target::{FLASH, FLASH_SECTOR_ERASE_SIZE, FLASH_START, SRAM_END, region_for},
        transport::Transport,
    },
    log::{debug, info, warn},
    std::fmt,
};

/// Progress callback, called as `(current, total)` in bytes.
pub type ProgressFn<'a> = dyn FnMut(usize, usize) + 'a;

const SECTOR: usize = FLASH_SECTOR_ERASE_SIZE as usize;

/// How the image is pushed to flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashStrategy {
    /// Erase and write one sector at a time, reporting progress per sector.
    #[default]
    Chunked,
    /// One erase of the whole range, one write of the whole padded image.
    Bulk,
}

impl FlashStrategy {
    /// Parse a strategy name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "chunked" | "sector" => Some(Self::Chunked),
            "bulk" => Some(Self::Bulk),
            _ => None,
        }
    }
}

impl fmt::Display for FlashStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunked => write!(f, "chunked"),
            Self::Bulk => write!(f, "bulk"),
        }
    }
}

/// Parameters of the final `REBOOT` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootParams {
    /// Entry point; 0 boots normally from flash.
    pub pc: u32,
    /// Initial stack pointer.
    pub sp: u32,
    /// Delay before the reboot, in milliseconds.
    pub delay_ms: u32,
}

impl Default for RebootParams {
    fn default() -> Self {
        Self {
            pc: 0,
            sp: SRAM_END,
            delay_ms: 512,
        }
    }
}

/// Programming options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOptions {
    /// Flash address of the first image byte. Must be sector aligned.
    pub base_address: u32,
    /// Exclusivity requested before programming.
    pub exclusive: ExclusiveMode,
    /// Erase/write strategy.
    pub strategy: FlashStrategy,
    /// Byte used to pad the final partial sector.
    pub pad_byte: u8,
    /// Read every written range back and compare.
    pub verify: bool,
    /// Final reboot parameters.
    pub reboot: RebootParams,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            base_address: FLASH_START,
            exclusive: ExclusiveMode::Exclusive,
            strategy: FlashStrategy::Chunked,
            pad_byte: 0x00,
            verify: false,
            reboot: RebootParams::default(),
        }
    }
}

impl FlashOptions {
    /// Set the base address.
    #[must_use]
    pub fn with_base_address(mut self, base_address: u32) -> Self {
        self.base_address = base_address;
        self
    }

    /// Set the exclusivity mode.
    #[must_use]
    pub fn with_exclusive(mut self, exclusive: ExclusiveMode) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Set the strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: FlashStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the pad byte.
    #[must_use]
    pub fn with_pad_byte(mut self, pad_byte: u8) -> Self {
        self.pad_byte = pad_byte;
        self
    }

    /// Enable or disable read-back verification.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Set the reboot parameters.
    #[must_use]
    pub fn with_reboot(mut self, reboot: RebootParams) -> Self {
        self.reboot = reboot;
        self
    }
}

/// Caller-facing programmer for a bootloader session.
pub struct FlashProgrammer<T: Transport> {
    channel: CommandChannel<T>,
    options: FlashOptions,
}

impl<T: Transport> FlashProgrammer<T> {
    /// Create a programmer over an already opened channel.
    pub fn new(channel: CommandChannel<T>) -> Self {
        Self {
            channel,
            options: FlashOptions::default(),
        }
    }

    /// Open a session on `transport` and reset the bootloader interface.
    pub fn open(transport: T) -> Result<Self> {
        let mut session = TransportSession::new(transport);
        session.open()?;
        if let Err(e) = session.reset() {
            if let Err(close_err) = session.close() {
                warn!("Failed to close device after reset error: {close_err}");
            }
            return Err(e);
        }
        Ok(Self::new(CommandChannel::new(session)))
    }

    /// Replace the programming options.
    #[must_use]
    pub fn with_options(mut self, options: FlashOptions) -> Self {
        self.options = options;
        self
    }

    /// Current programming options.
    pub fn options(&self) -> &FlashOptions {
        &self.options
    }

    /// Borrow the command channel.
    pub fn channel(&self) -> &CommandChannel<T> {
        &self.channel
    }

    /// Mutably borrow the command channel.
    pub fn channel_mut(&mut self) -> &mut CommandChannel<T> {
        &mut self.channel
    }

    /// Consume the programmer and return the channel.
    pub fn into_channel(self) -> CommandChannel<T> {
        self.channel
    }

    /// Program `image` into flash, reboot the device and close the session.
    ///
    /// `progress` is called with `(bytes_done, image_len)` after every
    /// sector (chunked) or once after the single write (bulk).
    pub fn flash(&mut self, image: &FlashImage, progress: &mut ProgressFn<'_>) -> Result<()> {
        let options = self.options;
        self.validate_flash_range(image)?;

        info!(
            "Flashing {} bytes ({} sectors) at 0x{:08X}, {} strategy",
            image.len(),
            image.sector_count(),
            options.base_address,
            options.strategy
        );

        self.begin(options.exclusive)?;

        match options.strategy {
            FlashStrategy::Chunked => self.program_chunked(image, progress)?,
            FlashStrategy::Bulk => self.program_bulk(image, progress)?,
        }

        let reboot = options.reboot;
        self.step(FlashStep::Reboot, |ch| {
            ch.reboot(reboot.pc, reboot.sp, reboot.delay_ms)
        })?;
        self.step(FlashStep::Close, |ch| ch.session_mut().close())?;

        info!("Flash complete");
        Ok(())
    }

    /// Read `len` bytes at `addr`, then close the session.
    ///
    /// The range must lie inside a single region of the memory map.
    pub fn read_memory(
        &mut self,
        addr: u32,
        len: u32,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Vec<u8>> {
        let region = region_for(addr).ok_or_else(|| {
            Error::InvalidRange(format!("0x{addr:08X} is not in the memory map"))
        })?;
        if !region.contains_range(addr, u64::from(len)) {
            return Err(Error::InvalidRange(format!(
                "0x{addr:08X} + {len} bytes overruns {region}"
            )));
        }

        info!("Reading {len} bytes at 0x{addr:08X} from {}", region.name);
        self.begin(self.options.exclusive)?;

        let total = len as usize;
        let mut data = Vec::with_capacity(total);
        let mut offset = 0u32;
        while offset < len {
            let window = (len - offset).min(FLASH_SECTOR_ERASE_SIZE);
            let address = addr + offset;
            let chunk = self.step(FlashStep::Read { address }, |ch| ch.read(address, window))?;
            data.extend_from_slice(&chunk);
            offset += window;
            progress(offset as usize, total);
        }

        self.step(FlashStep::Close, |ch| ch.session_mut().close())?;
        Ok(data)
    }

    /// Reboot the device without programming, then close the session.
    pub fn reboot_only(&mut self, params: RebootParams) -> Result<()> {
        info!(
            "Rebooting (pc=0x{:08X}, sp=0x{:08X}, delay={}ms)",
            params.pc, params.sp, params.delay_ms
        );
        self.step(FlashStep::Reboot, |ch| {
            ch.reboot(params.pc, params.sp, params.delay_ms)
        })?;
        self.step(FlashStep::Close, |ch| ch.session_mut().close())
    }

    fn begin(&mut self, exclusive: ExclusiveMode) -> Result<()> {
        debug!("Requesting {exclusive} access");
        self.step(FlashStep::ExclusiveAccess, |ch| {
            ch.set_exclusive_access(exclusive)
        })?;
        self.step(FlashStep::ExitXip, CommandChannel::exit_xip)
    }

    // Sector offsets stay below the 16 MiB flash window after validation.
    #[allow(clippy::cast_possible_truncation)]
    fn program_chunked(&mut self, image: &FlashImage, progress: &mut ProgressFn<'_>) -> Result<()> {
        let base = self.options.base_address;
        let pad = self.options.pad_byte;
        let total = image.len();

        for index in 0..image.sector_count() {
            let Some(buf) = image.sector(index, pad) else {
                break;
            };
            let address = base + (index * SECTOR) as u32;

            debug!("Sector {index} @ 0x{address:08X}");
            self.step(FlashStep::Erase { index, address }, |ch| {
                ch.flash_erase(address, FLASH_SECTOR_ERASE_SIZE)
            })?;
            self.step(FlashStep::Write { index, address }, |ch| {
                ch.write(address, &buf)
            })?;
            if self.options.verify {
                self.verify_range(address, &buf)?;
            }

            progress(((index + 1) * SECTOR).min(total), total);
        }

        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn program_bulk(&mut self, image: &FlashImage, progress: &mut ProgressFn<'_>) -> Result<()> {
        if image.is_empty() {
            return Ok(());
        }

        let address = self.options.base_address;
        let buf = image.padded(self.options.pad_byte);
        let size = buf.len() as u32;

        debug!("Bulk erase of {size} bytes @ 0x{address:08X}");
        self.step(FlashStep::Erase { index: 0, address }, |ch| {
            ch.flash_erase(address, size)
        })?;
        self.step(FlashStep::Write { index: 0, address }, |ch| {
            ch.write(address, &buf)
        })?;
        if self.options.verify {
            self.verify_range(address, &buf)?;
        }

        progress(image.len(), image.len());
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn verify_range(&mut self, address: u32, expected: &[u8]) -> Result<()> {
        for (i, window) in expected.chunks(SECTOR).enumerate() {
            let start = address + (i * SECTOR) as u32;
            let actual = self.step(FlashStep::Read { address: start }, |ch| {
                ch.read(start, window.len() as u32)
            })?;

            if let Some(pos) = window.iter().zip(&actual).position(|(a, b)| a != b) {
                let mismatch = start + pos as u32;
                return Err(Error::Aborted {
                    step: FlashStep::Read { address: start },
                    source: Box::new(Error::VerifyMismatch { address: mismatch }),
                });
            }
        }
        debug!("Verified {} bytes @ 0x{address:08X}", expected.len());
        Ok(())
    }

    fn validate_flash_range(&self, image: &FlashImage) -> Result<()> {
        let base = self.options.base_address;
        if base % FLASH_SECTOR_ERASE_SIZE != 0 {
            return Err(Error::InvalidImage(format!(
                "base address 0x{base:08X} is not aligned to {FLASH_SECTOR_ERASE_SIZE} bytes"
            )));
        }
        if !FLASH.contains_range(base, image.padded_len() as u64) {
            return Err(Error::InvalidImage(format!(
                "{} bytes at 0x{base:08X} do not fit in {FLASH}",
                image.len()
            )));
        }
        Ok(())
    }

    fn step<R>(
        &mut self,
        step: FlashStep,
        op: impl FnOnce(&mut CommandChannel<T>) -> Result<R>,
    ) -> Result<R> {
        op(&mut self.channel).map_err(|source| {
            debug!("{step} failed: {source}");
            Error::Aborted {
                step,
                source: Box::new(source),
            }
        })
    }
}
