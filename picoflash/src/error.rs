//! Error types for picoflash.

use std::{fmt, io};
use thiserror::Error;

use crate::protocol::CommandId;

/// Result type for picoflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for picoflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (image files, output files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// USB transport failure. The device state is unknown afterwards.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device answered in a way the protocol does not allow.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No device in BOOTSEL mode was found.
    #[error("Device not found or not in BOOTSEL mode")]
    DeviceNotFound,

    /// Image does not fit the requested flash range.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Address range outside the device memory map.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Data read back from flash differs from what was written.
    #[error("Verification failed at 0x{address:08X}")]
    VerifyMismatch {
        /// Address of the first differing byte.
        address: u32,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A step of a programming sequence failed; nothing after it was sent.
    #[error("{step} failed, sequence aborted")]
    Aborted {
        /// The step that failed.
        step: FlashStep,
        /// The underlying failure.
        source: Box<Error>,
    },
}

impl Error {
    /// Strip any [`Error::Aborted`] wrappers and return the root failure.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Aborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check whether the root failure came from the USB transport.
    pub fn is_transport(&self) -> bool {
        matches!(self.root_cause(), Self::Transport(_))
    }
}

/// Failures of the underlying USB transfer layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The device went away.
    #[error("device disconnected")]
    Disconnected,

    /// The endpoint answered with a STALL.
    #[error("endpoint stalled")]
    Stalled,

    /// The OS refused access to the device.
    #[error("permission denied")]
    PermissionDenied,

    /// The transfer did not complete within the provider's timeout.
    #[error("transfer timed out")]
    Timeout,

    /// The device or interface is held by someone else.
    #[error("device or interface busy")]
    Busy,

    /// An operation was attempted before `open` or after `close`.
    #[error("device is not open")]
    NotOpen,

    /// A bulk OUT transfer moved fewer bytes than requested.
    #[error("short write on endpoint 0x{endpoint:02X}: {written} of {expected} bytes")]
    ShortWrite {
        /// Endpoint address.
        endpoint: u8,
        /// Bytes requested.
        expected: usize,
        /// Bytes actually written.
        written: usize,
    },

    /// Any other error reported by the USB library.
    #[error("USB error: {0}")]
    Usb(String),
}

/// Violations of the PICOBOOT framing or handshake rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The bootloader interface is not vendor specific.
    #[error("unexpected class 0x{class:02X} on interface {interface}")]
    UnexpectedInterfaceClass {
        /// Interface index that was inspected.
        interface: u8,
        /// Class code found on its first alternate setting.
        class: u8,
    },

    /// The configuration has no interface at the expected index.
    #[error("interface {0} not present")]
    MissingInterface(u8),

    /// The bootloader interface does not expose the OUT/IN bulk pair.
    #[error("interface {interface} does not expose a bulk OUT/IN endpoint pair")]
    MissingEndpoints {
        /// Interface index that was inspected.
        interface: u8,
    },

    /// A frame did not start with the PICOBOOT magic.
    #[error("bad frame magic 0x{0:08X}")]
    InvalidMagic(u32),

    /// A frame buffer had the wrong size.
    #[error("frame must be 32 bytes, got {0}")]
    FrameLength(usize),

    /// Inline arguments exceed the 16 bytes a frame can carry.
    #[error("inline payload of {0} bytes exceeds 16")]
    InlinePayloadTooLarge(usize),

    /// Reserved frame bits were not zero.
    #[error("reserved frame field is 0x{0:04X}, expected zero")]
    ReservedNotZero(u16),

    /// Data phase longer than the 32-bit transfer length field can express.
    #[error("data phase of {0} bytes does not fit the transfer length field")]
    TransferTooLarge(usize),

    /// Command id outside the PICOBOOT command table.
    #[error("unknown command id 0x{0:02X}")]
    UnknownCommand(u8),

    /// Data phase direction does not match the command id's direction bit.
    #[error("{command} does not accept an {requested} data phase")]
    DirectionMismatch {
        /// Command being sent.
        command: CommandId,
        /// Direction the caller asked for.
        requested: Direction,
    },

    /// An IN data phase returned fewer bytes than announced.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes announced in the frame.
        expected: usize,
        /// Bytes actually received.
        actual: usize,
    },

    /// The status phase returned more than one byte.
    #[error("malformed status response of {0} bytes")]
    MalformedStatus(usize),
}

/// Transfer direction, seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    Out,
    /// Device to host.
    In,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Out => write!(f, "OUT"),
            Self::In => write!(f, "IN"),
        }
    }
}

/// One step of a programming sequence, used to report where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStep {
    /// Requesting exclusive access.
    ExclusiveAccess,
    /// Leaving execute-in-place mode.
    ExitXip,
    /// Erasing one chunk.
    Erase {
        /// Chunk index.
        index: usize,
        /// Chunk start address.
        address: u32,
    },
    /// Writing one chunk.
    Write {
        /// Chunk index.
        index: usize,
        /// Chunk start address.
        address: u32,
    },
    /// Reading a range back for verification or dumping.
    Read {
        /// Range start address.
        address: u32,
    },
    /// Rebooting the device.
    Reboot,
    /// Releasing the device.
    Close,
}

impl fmt::Display for FlashStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExclusiveAccess => write!(f, "exclusive access"),
            Self::ExitXip => write!(f, "exit XIP"),
            Self::Erase { index, address } => write!(f, "erase of chunk {index} @ 0x{address:08X}"),
            Self::Write { index, address } => write!(f, "write of chunk {index} @ 0x{address:08X}"),
            Self::Read { address } => write!(f, "read @ 0x{address:08X}"),
            Self::Reboot => write!(f, "reboot"),
            Self::Close => write!(f, "close"),
        }
    }
}
