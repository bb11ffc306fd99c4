//! # picoflash
//!
//! A library for flashing RP2040 chips through the PICOBOOT USB interface
//! exposed by the boot ROM in BOOTSEL mode.
//!
//! This crate provides the core functionality for talking to the bootloader,
//! including:
//!
//! - 32-byte PICOBOOT command framing
//! - Data and status phase handshakes over the bulk endpoints
//! - Sector-wise erase/write sequencing with progress reporting
//! - Read-back verification and memory dumps
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `rusb` crate
//!
//! ## Features
//!
//! - `native` (default): libusb transport and device discovery
//!
//! ## Example
//!
//! ```rust,no_run
//! use picoflash::{FlashImage, FlashProgrammer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FlashImage::from_file("firmware.bin")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let transport = picoflash::RusbTransport::find(None)?;
//!         let mut programmer = FlashProgrammer::open(transport)?;
//!
//!         programmer.flash(&image, &mut |current, total| {
//!             println!("Flashed {current}/{total} bytes");
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod flasher;
pub mod image;
pub mod protocol;
pub mod session;
pub mod target;
pub mod transport;

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use {device::find_usb_device, transport::RusbTransport};
pub use {
    device::{DetectedDevice, DeviceId, detect_devices, format_device_list},
    error::{Error, FlashStep, ProtocolError, Result, TransportError},
    flasher::{FlashOptions, FlashProgrammer, FlashStrategy, RebootParams},
    image::FlashImage,
    protocol::{CommandChannel, CommandFrame, CommandId, DataPhase, ExclusiveMode},
    session::TransportSession,
    transport::Transport,
};
